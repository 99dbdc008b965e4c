// Daemon configuration
//
// All configuration comes from `DDNS_*` environment variables. Values are
// read into a flat `Config`, validated, then converted into the library's
// `ServerConfig`.

use anyhow::{Context, Result};
use ddns_core::config::{LockoutScope, ProviderConfig, ServerConfig, StoreConfig};
use std::env;
use std::net::SocketAddr;
use tracing::Level;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Application configuration
pub struct Config {
    pub listen_addr: SocketAddr,
    pub provider_type: String,
    pub provider_api_token: String,
    pub provider_account_id: Option<String>,
    pub dry_run: bool,
    pub store_type: String,
    pub store_path: Option<String>,
    pub rate_limit_per_hour: u32,
    pub lockout_scope: String,
    pub trust_forwarded_for: bool,
    pub admin_username: String,
    pub admin_password: String,
    pub backend_timeout_secs: u64,
    pub log_level: String,
}

// Custom Debug implementation that hides secrets
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("provider_type", &self.provider_type)
            .field("provider_api_token", &"<REDACTED>")
            .field("provider_account_id", &self.provider_account_id)
            .field("dry_run", &self.dry_run)
            .field("store_type", &self.store_type)
            .field("store_path", &self.store_path)
            .field("rate_limit_per_hour", &self.rate_limit_per_hour)
            .field("lockout_scope", &self.lockout_scope)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"<REDACTED>")
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string());

        Ok(Self {
            listen_addr: var("DDNS_LISTEN_ADDR")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
                .parse()
                .context("DDNS_LISTEN_ADDR must be an address like 0.0.0.0:8080")?,
            provider_type: var("DDNS_PROVIDER_TYPE").unwrap_or_else(|| "cloudflare".to_string()),
            provider_api_token: var("DDNS_PROVIDER_API_TOKEN").unwrap_or_default(),
            provider_account_id: var("DDNS_PROVIDER_ACCOUNT_ID").filter(|s| !s.is_empty()),
            dry_run: var("DDNS_MODE")
                .unwrap_or_default()
                .eq_ignore_ascii_case("dry-run"),
            store_type: var("DDNS_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            store_path: var("DDNS_STORE_PATH"),
            rate_limit_per_hour: parse_or(var("DDNS_RATE_LIMIT_PER_HOUR"), 60)
                .context("DDNS_RATE_LIMIT_PER_HOUR must be a number")?,
            lockout_scope: var("DDNS_LOCKOUT_SCOPE")
                .unwrap_or_else(|| "source_address".to_string()),
            trust_forwarded_for: parse_bool(var("DDNS_TRUST_FORWARDED_FOR"), false)
                .context("DDNS_TRUST_FORWARDED_FOR must be true or false")?,
            admin_username: var("DDNS_ADMIN_USERNAME").unwrap_or_default(),
            // Passwords are taken verbatim
            admin_password: lookup("DDNS_ADMIN_PASSWORD").unwrap_or_default(),
            backend_timeout_secs: parse_or(var("DDNS_BACKEND_TIMEOUT_SECS"), 10)
                .context("DDNS_BACKEND_TIMEOUT_SECS must be a number")?,
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// This performs validation including:
    /// - Required field presence
    /// - Placeholder and too-short API tokens
    /// - Numeric range validation
    /// - Type enumeration validation
    pub fn validate(&self) -> Result<()> {
        if self.provider_api_token.is_empty() {
            anyhow::bail!(
                "DDNS_PROVIDER_API_TOKEN is required. \
                Set it via: export DDNS_PROVIDER_API_TOKEN=your_token"
            );
        }

        // Cloudflare API tokens are typically 40 characters
        if self.provider_api_token.len() < 20 {
            anyhow::bail!(
                "DDNS_PROVIDER_API_TOKEN appears too short ({} chars). \
                Cloudflare tokens are typically 40 characters. \
                Verify your token is correct.",
                self.provider_api_token.len()
            );
        }

        let token_lower = self.provider_api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower.contains("example")
        {
            anyhow::bail!(
                "DDNS_PROVIDER_API_TOKEN appears to be a placeholder. \
                Use an actual API token from your DNS provider."
            );
        }

        match self.provider_type.as_str() {
            "cloudflare" => {}
            _ => anyhow::bail!(
                "DDNS_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: cloudflare",
                self.provider_type
            ),
        }

        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "DDNS_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        if self.store_type == "file" {
            match self.store_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "DDNS_STORE_PATH is required when DDNS_STORE_TYPE=file. \
                    Set it via: export DDNS_STORE_PATH=/var/lib/ddns/records.json"
                ),
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "DDNS_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            }
        }

        if !(1..=10_000).contains(&self.rate_limit_per_hour) {
            anyhow::bail!(
                "DDNS_RATE_LIMIT_PER_HOUR must be between 1 and 10000. Got: {}",
                self.rate_limit_per_hour
            );
        }

        self.lockout_scope
            .parse::<LockoutScope>()
            .map_err(|e| anyhow::anyhow!("DDNS_LOCKOUT_SCOPE: {}", e))?;

        if self.admin_username.is_empty() {
            anyhow::bail!("DDNS_ADMIN_USERNAME is required");
        }

        if self.admin_password.len() < 8 {
            anyhow::bail!("DDNS_ADMIN_PASSWORD is required and must be at least 8 characters");
        }

        if !(1..=120).contains(&self.backend_timeout_secs) {
            anyhow::bail!(
                "DDNS_BACKEND_TIMEOUT_SECS must be between 1 and 120 seconds. Got: {}",
                self.backend_timeout_secs
            );
        }

        self.log_level()?;

        Ok(())
    }

    /// Tracing level for `DDNS_LOG_LEVEL`
    pub fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Build the library configuration
    pub fn server_config(&self) -> Result<ServerConfig> {
        let provider = ProviderConfig::Cloudflare {
            api_token: self.provider_api_token.clone(),
            account_id: self.provider_account_id.clone(),
            dry_run: self.dry_run,
        };

        let mut config = ServerConfig::new(provider);
        config.store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::File {
                path: self.store_path.clone().unwrap_or_default(),
            },
        };
        config.limits.max_requests_per_window = self.rate_limit_per_hour;
        config.limits.window_secs = 3600;
        config.limits.lockout_scope = self
            .lockout_scope
            .parse()
            .map_err(|e| anyhow::anyhow!("DDNS_LOCKOUT_SCOPE: {}", e))?;
        config.backend_timeout_secs = self.backend_timeout_secs;

        config.validate()?;
        Ok(config)
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) if !v.is_empty() => Ok(v.parse()?),
        _ => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("unrecognized boolean '{}'", other),
    }
}
