//! Short-lived cache of the zones visible to the DNS backend
//!
//! Listing zones is a paginated remote call, and the administrative surface
//! asks for it on every record creation. The cache is an ordinary value
//! owned by whoever constructs it; there is no global instance.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::traits::{DnsBackend, Zone};

#[derive(Debug)]
struct CachedZones {
    fetched_at: DateTime<Utc>,
    zones: Vec<Zone>,
}

/// Zone listing cache with an explicit TTL
#[derive(Debug)]
pub struct ZoneCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedZones>>,
}

impl ZoneCache {
    /// Create an empty cache
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Zones from the cache, refreshed from `backend` once the TTL has passed
    ///
    /// Concurrent callers that find the cache stale wait for a single refresh.
    /// A failed refresh leaves the previous listing in place and returns the
    /// error.
    pub async fn zones(&self, backend: &dyn DnsBackend) -> Result<Vec<Zone>> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();

        if let Some(entry) = cached.as_ref() {
            if now - entry.fetched_at < self.ttl {
                return Ok(entry.zones.clone());
            }
        }

        let zones = backend.list_zones().await?;
        tracing::debug!(
            provider = backend.provider_name(),
            count = zones.len(),
            "Zone listing refreshed"
        );
        *cached = Some(CachedZones {
            fetched_at: now,
            zones: zones.clone(),
        });
        Ok(zones)
    }

    /// Look up a single zone by its identifier
    pub async fn find(&self, backend: &dyn DnsBackend, zone_id: &str) -> Result<Zone> {
        self.zones(backend)
            .await?
            .into_iter()
            .find(|zone| zone.id == zone_id)
            .ok_or_else(|| Error::not_found(format!("zone {}", zone_id)))
    }

    /// Drop the cached listing so the next call refreshes
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
