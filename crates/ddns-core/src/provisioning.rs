//! Administrative record lifecycle
//!
//! The RecordManager owns the existence of managed records: it creates them
//! (minting the one-time plaintext token), rotates tokens, edits TTL and the
//! enabled flag, lists them, reads their history, and deletes them along
//! with their published DNS record.
//!
//! The update pipeline never creates or deletes records; this module never
//! touches `current_address`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{RecordPolicy, ServerConfig};
use crate::credential::CredentialHasher;
use crate::error::{Error, Result};
use crate::hostname;
use crate::traits::{DnsBackend, ManagedRecord, RecordStore, RecordType, UpdateEvent, Zone};
use crate::zone_cache::ZoneCache;

/// A record together with its freshly minted plaintext token
///
/// The token exists only in this value; the store keeps its hash.
#[derive(Clone)]
pub struct ProvisionedRecord {
    /// The stored record
    pub record: ManagedRecord,
    /// Plaintext token, shown to the operator once
    pub token: String,
}

impl fmt::Debug for ProvisionedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionedRecord")
            .field("record", &self.record)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Editable record settings; `None` leaves a field unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordChanges {
    /// New TTL
    pub ttl: Option<u32>,
    /// Enable or disable
    pub enabled: Option<bool>,
}

/// Administrative operations on managed records
pub struct RecordManager {
    store: Arc<dyn RecordStore>,
    backend: Arc<dyn DnsBackend>,
    zones: Arc<ZoneCache>,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
    policy: RecordPolicy,
    backend_timeout: Duration,
}

impl RecordManager {
    /// Create a manager over its collaborators
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn DnsBackend>,
        zones: Arc<ZoneCache>,
        hasher: CredentialHasher,
        clock: Arc<dyn Clock>,
        config: &ServerConfig,
    ) -> Self {
        Self {
            store,
            backend,
            zones,
            hasher,
            clock,
            policy: config.records.clone(),
            backend_timeout: config.backend_timeout(),
        }
    }

    /// Zones the backend can manage (cached)
    pub async fn zones(&self) -> Result<Vec<Zone>> {
        self.within_deadline("zone listing", self.zones.zones(self.backend.as_ref()))
            .await
    }

    /// Provision a new hostname in `zone_id`
    ///
    /// `ttl` defaults to the policy's default TTL.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: bad hostname, TTL out of range, hostname outside
    ///   the zone
    /// - `NotFound`: unknown zone
    /// - `AlreadyExists`: hostname already managed
    pub async fn create(
        &self,
        hostname: &str,
        zone_id: &str,
        ttl: Option<u32>,
    ) -> Result<ProvisionedRecord> {
        let hostname = hostname::normalize(hostname);
        hostname::validate(&hostname)?;

        let ttl = ttl.unwrap_or(self.policy.default_ttl);
        self.policy.check_ttl(ttl)?;

        let zone = self
            .within_deadline("zone listing", self.zones.find(self.backend.as_ref(), zone_id))
            .await?;
        if !hostname::is_within_zone(&hostname, &zone.name) {
            return Err(Error::invalid_input(format!(
                "{} is not within zone {}",
                hostname, zone.name
            )));
        }

        if self.store.get_record(&hostname).await?.is_some() {
            return Err(Error::already_exists(hostname));
        }

        let token = CredentialHasher::generate_token();
        let credential_hash = self.hasher.hash(&token).await?;
        let now = self.clock.now();

        let record = ManagedRecord {
            hostname: hostname.clone(),
            zone_id: zone.id,
            zone_name: zone.name,
            ttl,
            credential_hash,
            current_address: None,
            enabled: true,
            created_at: now,
            last_updated: now,
        };

        self.store.create_record(record.clone()).await?;
        info!("Provisioned {} in zone {} (ttl {})", hostname, record.zone_name, ttl);

        Ok(ProvisionedRecord { record, token })
    }

    /// Replace a hostname's token; the old one stops working immediately
    pub async fn regenerate_token(&self, hostname: &str) -> Result<ProvisionedRecord> {
        let record = self.require(hostname).await?;

        let token = CredentialHasher::generate_token();
        let mut updated = record.clone();
        updated.credential_hash = self.hasher.hash(&token).await?;
        updated.last_updated = self.clock.now();

        self.store
            .update_record(updated.clone(), Some(record.last_updated))
            .await?;
        info!("Regenerated token for {}", updated.hostname);

        Ok(ProvisionedRecord {
            record: updated,
            token,
        })
    }

    /// Change TTL and/or the enabled flag
    pub async fn update(&self, hostname: &str, changes: RecordChanges) -> Result<ManagedRecord> {
        let record = self.require(hostname).await?;

        let mut updated = record.clone();
        if let Some(ttl) = changes.ttl {
            self.policy.check_ttl(ttl)?;
            updated.ttl = ttl;
        }
        if let Some(enabled) = changes.enabled {
            updated.enabled = enabled;
        }
        updated.last_updated = self.clock.now();

        self.store
            .update_record(updated.clone(), Some(record.last_updated))
            .await?;
        info!(
            "Updated settings for {} (ttl {}, enabled {})",
            updated.hostname, updated.ttl, updated.enabled
        );

        Ok(updated)
    }

    /// Delete a record, removing its published DNS record first
    ///
    /// DNS removal is best-effort: a failure is logged and the record is
    /// deleted anyway.
    pub async fn delete(&self, hostname: &str) -> Result<()> {
        let record = self.require(hostname).await?;

        if let Some(address) = record.current_address {
            let record_type = RecordType::from_addr(&address);
            let delete = self
                .backend
                .delete(&record.zone_id, &record.hostname, record_type);

            match self.within_deadline("record removal", delete).await {
                Ok(()) => info!("Removed {} record for {}", record_type, record.hostname),
                Err(e) => warn!(
                    "Failed to remove {} record for {}: {}",
                    record_type, record.hostname, e
                ),
            }
        }

        self.store.delete_record(&record.hostname).await?;
        info!("Deleted record {}", record.hostname);
        Ok(())
    }

    /// All managed records
    pub async fn list(&self) -> Result<Vec<ManagedRecord>> {
        self.store.list_records().await
    }

    /// One managed record
    pub async fn get(&self, hostname: &str) -> Result<ManagedRecord> {
        self.require(hostname).await
    }

    /// Update history, most recent first
    ///
    /// `limit` defaults to the policy's default history limit.
    pub async fn history(&self, hostname: &str, limit: Option<usize>) -> Result<Vec<UpdateEvent>> {
        let record = self.require(hostname).await?;
        let limit = limit.unwrap_or(self.policy.default_history_limit);
        self.store.query_events(&record.hostname, limit).await
    }

    /// Run a backend call under the configured deadline
    async fn within_deadline<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.backend_timeout, call)
            .await
            .map_err(|_| {
                Error::timeout(format!(
                    "{} on {} exceeded {:?}",
                    what,
                    self.backend.provider_name(),
                    self.backend_timeout
                ))
            })?
    }

    async fn require(&self, hostname: &str) -> Result<ManagedRecord> {
        let hostname = hostname::normalize(hostname);
        self.store
            .get_record(&hostname)
            .await?
            .ok_or_else(|| Error::not_found(hostname))
    }
}
