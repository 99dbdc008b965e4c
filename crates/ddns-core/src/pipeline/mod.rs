//! Update decision pipeline
//!
//! The UpdatePipeline turns one DynDNS2 update request into exactly one
//! [`UpdateOutcome`]. On a real address change it issues exactly one DNS
//! upsert and one record update; every other path leaves DNS untouched.
//!
//! ## Architecture
//!
//! ```text
//!   UpdateRequest
//!        │
//!        ▼
//! ┌──────────────┐  rate / lockout   ┌──────────────┐
//! │UpdatePipeline│──────────────────▶│ AbuseLimiter │
//! └──────────────┘                   └──────────────┘
//!        │
//!        ├──── lookup / commit / audit ────▶ RecordStore
//!        │
//!        └──── delete old type / upsert ───▶ DnsBackend
//! ```
//!
//! ## Decision Flow
//!
//! 1. Rate check per hostname (fail-open)
//! 2. Lookup; unknown or disabled hostnames answer `nohost`
//! 3. Lockout check (fail-open), then credential verification
//! 4. Candidate = claimed address, or the source address when none is claimed
//! 5. Claimed address must match the source address
//! 6. Candidate must parse as IPv4/IPv6
//! 7. Same as the bound address: `nochg`
//! 8. Family switch: best-effort delete of the old record type
//! 9. Upsert under a deadline; failure or timeout answers `911` and leaves
//!    the record untouched
//! 10. Conditional commit; a failed commit is logged and still answers
//!     `good`
//!
//! Audit events are best-effort: an append failure is logged and never
//! changes the outcome.

use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{LimitsConfig, ServerConfig};
use crate::credential::CredentialHasher;
use crate::error::{Error, Result};
use crate::hostname;
use crate::traits::{
    AbuseLimiter, DnsBackend, ManagedRecord, RecordStore, RecordType, UpdateEvent, UpdateStatus,
};

/// One inbound update request, already extracted from the transport
#[derive(Clone)]
pub struct UpdateRequest {
    /// Hostname to update, as supplied
    pub hostname: String,
    /// `myip` parameter, if supplied
    pub claimed_address: Option<String>,
    /// Source address of the request as derived by the transport
    pub source_address: String,
    /// Per-hostname token from the Basic auth password slot
    pub credential: String,
    /// Client descriptor (user agent)
    pub client: String,
}

impl fmt::Debug for UpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateRequest")
            .field("hostname", &self.hostname)
            .field("claimed_address", &self.claimed_address)
            .field("source_address", &self.source_address)
            .field("credential", &"<redacted>")
            .field("client", &self.client)
            .finish()
    }
}

impl UpdateRequest {
    /// The address the request asks for: the claimed one, or the source
    /// address when none (or an empty one) was claimed
    pub fn candidate(&self) -> &str {
        match self.claimed_address.as_deref() {
            Some(claimed) if !claimed.is_empty() => claimed,
            _ => &self.source_address,
        }
    }

    /// Whether a non-empty claimed address differs from the source address
    ///
    /// Compared as addresses when both parse, as strings otherwise.
    pub fn claims_foreign_address(&self) -> bool {
        let Some(claimed) = self.claimed_address.as_deref().filter(|c| !c.is_empty()) else {
            return false;
        };

        match (claimed.parse::<IpAddr>(), self.source_address.parse::<IpAddr>()) {
            (Ok(claimed), Ok(source)) => claimed.to_canonical() != source.to_canonical(),
            _ => claimed != self.source_address,
        }
    }
}

/// Result of processing an update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Address published
    Good(IpAddr),
    /// Address already current
    NoChange(IpAddr),
    /// Unknown or disabled hostname
    NoHost,
    /// Credential did not verify
    BadAuth,
    /// Rate limited, locked out, or spoofed address
    Abuse,
    /// Candidate address did not parse
    Invalid,
    /// Backend failure or timeout
    ServerError,
}

impl UpdateOutcome {
    /// Short tag used in logs
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Good(_) => "good",
            Self::NoChange(_) => "nochg",
            Self::NoHost => "nohost",
            Self::BadAuth => "badauth",
            Self::Abuse => "abuse",
            Self::Invalid => "invalid",
            Self::ServerError => "server_error",
        }
    }
}

/// DynDNS2 response line
impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good(addr) => write!(f, "good {}", addr),
            Self::NoChange(addr) => write!(f, "nochg {}", addr),
            Self::NoHost => f.write_str("nohost"),
            Self::BadAuth => f.write_str("badauth"),
            Self::Abuse => f.write_str("abuse"),
            Self::Invalid | Self::ServerError => f.write_str("911"),
        }
    }
}

/// The rate limit window an update was counted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in this window
    pub remaining: u32,
    /// Start of the next window
    pub resets_at: DateTime<Utc>,
}

/// An outcome together with the rate window it was counted in
///
/// `rate_limit` is `None` when the request never reached the limiter (no
/// hostname) or the limiter was unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedUpdate {
    pub outcome: UpdateOutcome,
    pub rate_limit: Option<RateLimitWindow>,
}

/// The update decision pipeline
///
/// Holds no per-request state; one instance serves all requests
/// concurrently.
pub struct UpdatePipeline {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn DnsBackend>,
    limiter: Arc<dyn AbuseLimiter>,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
    limits: LimitsConfig,
    retention: chrono::Duration,
    backend_timeout: std::time::Duration,
}

impl UpdatePipeline {
    /// Create a pipeline over its collaborators
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn DnsBackend>,
        limiter: Arc<dyn AbuseLimiter>,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            store,
            backend,
            limiter,
            hasher,
            clock,
            limits: config.limits.clone(),
            retention: config.records.retention(),
            backend_timeout: config.backend_timeout(),
        }
    }

    /// Process one update request
    pub async fn process(&self, request: &UpdateRequest) -> UpdateOutcome {
        self.process_detailed(request).await.outcome
    }

    /// Process one update request, also reporting its rate limit window
    pub async fn process_detailed(&self, request: &UpdateRequest) -> ProcessedUpdate {
        let hostname = hostname::normalize(&request.hostname);

        let (outcome, rate_limit) = if hostname.is_empty() {
            (UpdateOutcome::NoHost, None)
        } else {
            // 1. Rate check
            let (allowed, rate_limit) = self.count_request(&hostname).await;
            let outcome = if allowed {
                self.decide(&hostname, request).await
            } else {
                UpdateOutcome::Abuse
            };
            (outcome, rate_limit)
        };

        info!(
            hostname = %hostname,
            source = %request.source_address,
            outcome = outcome.tag(),
            "Update request processed"
        );
        ProcessedUpdate {
            outcome,
            rate_limit,
        }
    }

    /// Count the request against the hostname's window
    ///
    /// Fails open: an unavailable limiter allows the request.
    async fn count_request(&self, hostname: &str) -> (bool, Option<RateLimitWindow>) {
        let limit = self.limits.max_requests_per_window;
        let window = match self.limiter.increment(&format!("rate:{}", hostname)).await {
            Ok(window) => window,
            Err(e) => {
                warn!("Rate limiter unavailable, allowing request: {}", e);
                return (true, None);
            }
        };

        if window.count > limit {
            warn!(
                "Rate limit exceeded for {} ({} requests, resets at {})",
                hostname, window.count, window.resets_at
            );
        }

        let rate_limit = RateLimitWindow {
            limit,
            remaining: limit.saturating_sub(window.count),
            resets_at: window.resets_at,
        };
        (window.count <= limit, Some(rate_limit))
    }

    async fn decide(&self, hostname: &str, request: &UpdateRequest) -> UpdateOutcome {
        // 2. Lookup
        let record = match self.store.get_record(hostname).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Unknown hostname {}", hostname);
                return UpdateOutcome::NoHost;
            }
            Err(e) => {
                error!("Record lookup failed for {}: {}", hostname, e);
                return UpdateOutcome::ServerError;
            }
        };

        // 3. Disabled records look exactly like unknown ones
        if !record.enabled {
            debug!("Record {} is disabled", hostname);
            return UpdateOutcome::NoHost;
        }

        // 4. Authenticate
        let lockout_key = self
            .limits
            .lockout_scope
            .key(hostname, &request.source_address);

        match self.limiter.is_locked_out(&lockout_key).await {
            Ok(status) if status.locked => {
                warn!(
                    "Rejecting update for {} from locked-out key {} (until {:?})",
                    hostname, lockout_key, status.locked_until
                );
                self.audit(&record, request, UpdateStatus::Locked).await;
                return UpdateOutcome::Abuse;
            }
            Ok(_) => {}
            Err(e) => warn!("Lockout check unavailable, allowing request: {}", e),
        }

        if !self
            .hasher
            .verify(&request.credential, &record.credential_hash)
            .await
        {
            warn!("Bad credential for {} from {}", hostname, request.source_address);
            self.audit(&record, request, UpdateStatus::BadAuth).await;
            match self.limiter.record_auth_failure(&lockout_key).await {
                Ok(status) if status.locked => {
                    warn!("Key {} locked out until {:?}", lockout_key, status.locked_until)
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to record auth failure: {}", e),
            }
            return UpdateOutcome::BadAuth;
        }

        if let Err(e) = self.limiter.record_auth_success(&lockout_key).await {
            warn!("Failed to record auth success: {}", e);
        }

        // 5. Anti-spoofing
        if request.claims_foreign_address() {
            warn!(
                "Claimed address {:?} for {} does not match source {}",
                request.claimed_address, hostname, request.source_address
            );
            self.audit(&record, request, UpdateStatus::IpMismatch).await;
            return UpdateOutcome::Abuse;
        }

        // 6. Format validation
        let address = match request.candidate().parse::<IpAddr>() {
            Ok(addr) => addr.to_canonical(),
            Err(_) => {
                debug!("Invalid address {:?} for {}", request.candidate(), hostname);
                self.audit(&record, request, UpdateStatus::InvalidIp).await;
                return UpdateOutcome::Invalid;
            }
        };

        // 7. Idempotence
        if record.current_address == Some(address) {
            debug!("Record {} already has address {}", hostname, address);
            self.audit(&record, request, UpdateStatus::NoChange).await;
            return UpdateOutcome::NoChange(address);
        }

        // 8. Mutate
        let record_type = RecordType::from_addr(&address);
        if let Some(previous) = record.current_address {
            let previous_type = RecordType::from_addr(&previous);
            if previous_type != record_type {
                self.remove_stale_type(&record, previous_type).await;
            }
        }

        if let Err(e) = self.publish(&record, record_type, address).await {
            error!("Failed to publish {} -> {}: {}", hostname, address, e);
            self.audit(&record, request, UpdateStatus::BackendError).await;
            return UpdateOutcome::ServerError;
        }

        // 9. Commit
        let now = self.clock.now();
        let expected = record.last_updated;
        let mut updated = record.clone();
        updated.current_address = Some(address);
        updated.last_updated = now;

        if let Err(e) = self.store.update_record(updated, Some(expected)).await {
            error!(
                "DNS for {} now points at {} but the record could not be saved: {}",
                hostname, address, e
            );
            self.audit(&record, request, UpdateStatus::StoreError).await;
            return UpdateOutcome::Good(address);
        }

        info!(
            "Updated {} -> {} (previous: {:?})",
            hostname, address, record.current_address
        );

        // 10. Log
        self.audit(&record, request, UpdateStatus::Good).await;
        UpdateOutcome::Good(address)
    }

    /// Best-effort removal of the record of the other address family
    async fn remove_stale_type(&self, record: &ManagedRecord, record_type: RecordType) {
        let delete = self
            .backend
            .delete(&record.zone_id, &record.hostname, record_type);

        match tokio::time::timeout(self.backend_timeout, delete).await {
            Ok(Ok(())) => debug!("Removed {} record for {}", record_type, record.hostname),
            Ok(Err(e)) => warn!(
                "Failed to remove {} record for {}: {}",
                record_type, record.hostname, e
            ),
            Err(_) => warn!(
                "Timed out removing {} record for {}",
                record_type, record.hostname
            ),
        }
    }

    async fn publish(
        &self,
        record: &ManagedRecord,
        record_type: RecordType,
        address: IpAddr,
    ) -> Result<()> {
        let value = address.to_string();
        let upsert = self.backend.upsert(
            &record.zone_id,
            &record.hostname,
            record_type,
            &value,
            record.ttl,
        );

        tokio::time::timeout(self.backend_timeout, upsert)
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "{} did not answer within {:?}; outcome unknown",
                    self.backend.provider_name(),
                    self.backend_timeout
                ))
            })?
    }

    async fn audit(&self, record: &ManagedRecord, request: &UpdateRequest, status: UpdateStatus) {
        let timestamp = self.clock.now();
        let event = UpdateEvent {
            hostname: record.hostname.clone(),
            previous_address: record.current_address,
            new_address: Some(request.candidate().to_string()),
            source_address: request.source_address.clone(),
            client: request.client.clone(),
            status,
            timestamp,
            expires_at: self.expiry(timestamp),
        };

        if let Err(e) = self.store.append_event(event).await {
            warn!(
                "Failed to append {} event for {}: {}",
                status, record.hostname, e
            );
        }
    }

    fn expiry(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from + self.retention
    }
}
