//! Configuration types for the DDNS update server
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limit and lockout settings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Record provisioning policy
    #[serde(default)]
    pub records: RecordPolicy,

    /// Deadline for a single DNS backend call (in seconds)
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,

    /// How long a zone listing is cached (in seconds)
    #[serde(default = "default_zone_cache_ttl_secs")]
    pub zone_cache_ttl_secs: u64,
}

impl ServerConfig {
    /// Create a new configuration with defaults around `provider`
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            store: StoreConfig::default(),
            limits: LimitsConfig::default(),
            records: RecordPolicy::default(),
            backend_timeout_secs: default_backend_timeout_secs(),
            zone_cache_ttl_secs: default_zone_cache_ttl_secs(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.store.validate()?;
        self.limits.validate()?;
        self.records.validate()?;

        if self.backend_timeout_secs == 0 {
            return Err(crate::Error::config("Backend timeout must be > 0"));
        }

        Ok(())
    }

    /// Backend call deadline as a `Duration`
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(ProviderConfig::default())
    }
}

/// DNS provider configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Account ID (optional, narrows zone listing)
        account_id: Option<String>,
        /// Log mutations instead of performing them
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Cloudflare {
                account_id,
                dry_run,
                ..
            } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"<redacted>")
                .field("account_id", account_id)
                .field("dry_run", dry_run)
                .finish(),
            ProviderConfig::Custom { factory, .. } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", &"<redacted>")
                .finish(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Cloudflare {
            api_token: String::new(),
            account_id: None,
            dry_run: false,
        }
    }
}

/// Record store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let StoreConfig::File { path } = self {
            if path.is_empty() {
                return Err(crate::Error::config("Store file path cannot be empty"));
            }
        }
        Ok(())
    }
}

/// What identifies a client for failed-authentication lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockoutScope {
    /// The request source address
    #[default]
    SourceAddress,
    /// The targeted hostname
    Hostname,
    /// The pair (hostname, source address)
    HostnameAndSource,
}

impl LockoutScope {
    /// Build the limiter key for a request
    pub fn key(self, hostname: &str, source_address: &str) -> String {
        match self {
            LockoutScope::SourceAddress => format!("auth:{}", source_address),
            LockoutScope::Hostname => format!("auth:{}", hostname),
            LockoutScope::HostnameAndSource => format!("auth:{}|{}", hostname, source_address),
        }
    }
}

impl std::str::FromStr for LockoutScope {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source_address" | "source" | "ip" => Ok(LockoutScope::SourceAddress),
            "hostname" => Ok(LockoutScope::Hostname),
            "hostname_and_source" => Ok(LockoutScope::HostnameAndSource),
            other => Err(crate::Error::config(format!(
                "Unknown lockout scope: {} (expected source_address, hostname or hostname_and_source)",
                other
            ))),
        }
    }
}

/// Rate limit and lockout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests allowed per hostname per window
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,

    /// Fixed window length (in seconds)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Consecutive failures that trigger a lockout
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Lockout duration (in seconds)
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,

    /// Key used for failed-authentication tracking
    #[serde(default)]
    pub lockout_scope: LockoutScope,

    /// Counters untouched for this long are discarded (in seconds)
    #[serde(default = "default_counter_idle_secs")]
    pub counter_idle_secs: u64,
}

impl LimitsConfig {
    /// Validate the limits
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_requests_per_window == 0 {
            return Err(crate::Error::config("max_requests_per_window must be > 0"));
        }
        if self.window_secs == 0 {
            return Err(crate::Error::config("window_secs must be > 0"));
        }
        if self.max_failed_attempts == 0 {
            return Err(crate::Error::config("max_failed_attempts must be > 0"));
        }
        if self.lockout_secs == 0 {
            return Err(crate::Error::config("lockout_secs must be > 0"));
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: default_max_requests_per_window(),
            window_secs: default_window_secs(),
            max_failed_attempts: default_max_failed_attempts(),
            lockout_secs: default_lockout_secs(),
            lockout_scope: LockoutScope::default(),
            counter_idle_secs: default_counter_idle_secs(),
        }
    }
}

/// Record provisioning policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPolicy {
    /// Smallest TTL a record may carry
    #[serde(default = "default_min_ttl")]
    pub min_ttl: u32,

    /// Largest TTL a record may carry
    #[serde(default = "default_max_ttl")]
    pub max_ttl: u32,

    /// TTL used when none is given
    #[serde(default = "default_min_ttl")]
    pub default_ttl: u32,

    /// Days an update event is kept
    #[serde(default = "default_history_retention_days")]
    pub history_retention_days: u32,

    /// Events returned by a history query without an explicit limit
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,
}

impl RecordPolicy {
    /// Validate the policy
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.min_ttl == 0 || self.min_ttl > self.max_ttl {
            return Err(crate::Error::config("TTL bounds must satisfy 0 < min_ttl <= max_ttl"));
        }
        if !(self.min_ttl..=self.max_ttl).contains(&self.default_ttl) {
            return Err(crate::Error::config("default_ttl must lie within the TTL bounds"));
        }
        if self.history_retention_days == 0 {
            return Err(crate::Error::config("history_retention_days must be > 0"));
        }
        Ok(())
    }

    /// Check a TTL against the bounds
    pub fn check_ttl(&self, ttl: u32) -> Result<(), crate::Error> {
        if ttl < self.min_ttl || ttl > self.max_ttl {
            return Err(crate::Error::invalid_input(format!(
                "TTL {} outside allowed range {}..={}",
                ttl, self.min_ttl, self.max_ttl
            )));
        }
        Ok(())
    }

    /// How long an update event is kept
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.history_retention_days))
    }
}

impl Default for RecordPolicy {
    fn default() -> Self {
        Self {
            min_ttl: default_min_ttl(),
            max_ttl: default_max_ttl(),
            default_ttl: default_min_ttl(),
            history_retention_days: default_history_retention_days(),
            default_history_limit: default_history_limit(),
        }
    }
}

fn default_backend_timeout_secs() -> u64 {
    10
}

fn default_zone_cache_ttl_secs() -> u64 {
    300
}

fn default_max_requests_per_window() -> u32 {
    60
}

fn default_window_secs() -> u64 {
    3600
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_lockout_secs() -> u64 {
    900
}

fn default_counter_idle_secs() -> u64 {
    3600
}

fn default_min_ttl() -> u32 {
    60
}

fn default_max_ttl() -> u32 {
    86400
}

fn default_history_retention_days() -> u32 {
    30
}

fn default_history_limit() -> usize {
    50
}
