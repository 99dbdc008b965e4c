// # Record Store Trait
//
// Defines the interface for persistent storage of managed hostnames and
// their update history.
//
// ## Purpose
//
// The record store is the server's memory:
// - Which hostnames exist, in which zone, with which TTL
// - The hashed credential for each hostname
// - The last address successfully published
// - An append-only log of update attempts, pruned by age
//
// ## Implementations
//
// - In-memory: `MemoryRecordStore` (tests, single-process demos)
// - File-based: `FileRecordStore` (JSON snapshot with atomic writes)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A hostname under management
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedRecord {
    /// Fully qualified hostname, lowercase, no trailing dot
    pub hostname: String,
    /// Provider zone identifier
    pub zone_id: String,
    /// Zone apex the hostname belongs to
    pub zone_name: String,
    /// TTL used when publishing
    pub ttl: u32,
    /// PHC-format hash of the per-hostname token
    pub credential_hash: String,
    /// Address last published at the backend, if any
    pub current_address: Option<IpAddr>,
    /// Disabled records behave as if they do not exist
    pub enabled: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last write to this record; doubles as the version for
    /// conditional updates
    pub last_updated: DateTime<Utc>,
}

impl fmt::Debug for ManagedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedRecord")
            .field("hostname", &self.hostname)
            .field("zone_id", &self.zone_id)
            .field("zone_name", &self.zone_name)
            .field("ttl", &self.ttl)
            .field("credential_hash", &"<redacted>")
            .field("current_address", &self.current_address)
            .field("enabled", &self.enabled)
            .field("created_at", &self.created_at)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// Outcome recorded for an update attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Address published
    Good,
    /// Address already current
    #[serde(rename = "nochg")]
    NoChange,
    /// Credential did not verify
    BadAuth,
    /// Rejected because the lockout key was locked
    Locked,
    /// Claimed address differed from the source address
    IpMismatch,
    /// Candidate address did not parse
    InvalidIp,
    /// Backend failed or timed out
    BackendError,
    /// Backend succeeded but the local commit failed
    StoreError,
}

impl UpdateStatus {
    /// Snake-case label, matching the serialized form
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::NoChange => "nochg",
            Self::BadAuth => "bad_auth",
            Self::Locked => "locked",
            Self::IpMismatch => "ip_mismatch",
            Self::InvalidIp => "invalid_ip",
            Self::BackendError => "backend_error",
            Self::StoreError => "store_error",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a hostname's update history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Hostname the attempt targeted
    pub hostname: String,
    /// Address held before the attempt
    pub previous_address: Option<IpAddr>,
    /// Address the attempt asked for, verbatim (may not parse)
    pub new_address: Option<String>,
    /// Address of the client as seen by the server
    pub source_address: String,
    /// Client descriptor (user agent)
    pub client: String,
    /// What happened
    pub status: UpdateStatus,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// When the event may be discarded
    pub expires_at: DateTime<Utc>,
}

impl UpdateEvent {
    /// Whether the event has outlived its retention
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Trait for record store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Consistency
///
/// `update_record` is a conditional write: when `expected_last_updated` is
/// `Some`, the stored record's `last_updated` must still equal it or the
/// write fails with [`Error::Conflict`](crate::Error::Conflict). Two
/// concurrent updates of the same hostname therefore cannot silently
/// overwrite each other.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a record by hostname
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: The hostname is managed
    /// - `Ok(None)`: Unknown hostname
    /// - `Err(Error)`: The store could not be read
    async fn get_record(&self, hostname: &str) -> Result<Option<ManagedRecord>, crate::Error>;

    /// Insert a new record
    ///
    /// Fails with `AlreadyExists` if the hostname is already managed.
    async fn create_record(&self, record: ManagedRecord) -> Result<(), crate::Error>;

    /// Replace an existing record
    ///
    /// Fails with `NotFound` if the hostname is not managed and with
    /// `Conflict` if `expected_last_updated` no longer matches.
    async fn update_record(
        &self,
        record: ManagedRecord,
        expected_last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), crate::Error>;

    /// Remove a record
    ///
    /// Its history stays until the events expire. Fails with `NotFound` if
    /// the hostname is not managed.
    async fn delete_record(&self, hostname: &str) -> Result<(), crate::Error>;

    /// All managed records, ordered by hostname
    async fn list_records(&self) -> Result<Vec<ManagedRecord>, crate::Error>;

    /// Append an event to the hostname's history
    ///
    /// Expired events may be discarded as a side effect.
    async fn append_event(&self, event: UpdateEvent) -> Result<(), crate::Error>;

    /// Most recent events first, at most `limit`, expired events excluded
    async fn query_events(
        &self,
        hostname: &str,
        limit: usize,
    ) -> Result<Vec<UpdateEvent>, crate::Error>;

    /// Flush any pending writes to persistent storage
    ///
    /// Called during graceful shutdown.
    async fn flush(&self) -> Result<(), crate::Error>;
}
