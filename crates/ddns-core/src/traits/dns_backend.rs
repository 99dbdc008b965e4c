// # DNS Backend Trait
//
// Defines the interface for publishing address records at the authoritative
// DNS provider.
//
// ## Implementations
//
// - Cloudflare: `ddns-provider-cloudflare` crate
// - Test doubles: `crates/ddns-core/tests/common`
//
// ## Usage
//
// ```rust,ignore
// use ddns_core::{DnsBackend, RecordType};
//
// async fn publish(backend: &dyn DnsBackend) -> ddns_core::Result<()> {
//     backend
//         .upsert("zone-123", "home.example.com", RecordType::A, "203.0.113.5", 60)
//         .await
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Address record type managed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    #[serde(rename = "A")]
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Record type matching the family of `addr`
    pub fn from_addr(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::A,
            IpAddr::V6(_) => Self::Aaaa,
        }
    }

    /// The record type of the other address family
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::Aaaa,
            Self::Aaaa => Self::A,
        }
    }

    /// Wire name of the record type ("A" or "AAAA")
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A zone visible to the backend credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Provider-specific zone identifier
    pub id: String,
    /// Zone apex, lowercase without trailing dot
    pub name: String,
    /// Number of records in the zone, when the provider reports it
    pub record_count: Option<u64>,
    /// Whether the zone is private (not publicly resolvable)
    pub private: bool,
}

/// Trait for DNS backend implementations
///
/// The backend is the only component that talks to the authoritative DNS
/// provider. It knows nothing about credentials, limits or the local record
/// store; the update pipeline decides *whether* to call it.
///
/// # Thread Safety
///
/// Implementations are shared behind an `Arc` across request tasks and must
/// be safe to call concurrently.
///
/// # Contract
///
/// - `upsert` must be idempotent: repeating the same call leaves exactly one
///   record of that name and type holding `value`.
/// - `delete` of a record that does not exist is a success.
/// - No retries or backoff inside the backend. The caller applies a deadline
///   and decides what a failure means.
/// - Names are passed lowercase without a trailing dot; zone names returned
///   from `list_zones` follow the same normalization.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    /// Create or replace the single record of `record_type` at `name`
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Provider zone identifier the name lives in
    /// - `name`: Fully qualified record name (e.g. "home.example.com")
    /// - `record_type`: A or AAAA
    /// - `value`: Textual address to publish
    /// - `ttl`: Time-to-live in seconds
    async fn upsert(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<(), crate::Error>;

    /// Remove the record of `record_type` at `name`, if present
    async fn delete(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<(), crate::Error>;

    /// List the zones these credentials can manage
    async fn list_zones(&self) -> Result<Vec<Zone>, crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS backends from configuration
pub trait DnsBackendFactory: Send + Sync {
    /// Create a DnsBackend instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsBackend>, crate::Error>;
}
