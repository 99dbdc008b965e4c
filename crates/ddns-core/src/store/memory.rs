// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Crash Behavior
//
// - All records and history are lost on restart
// - Credentials must be re-provisioned after a restart
//
// ## When to Use
//
// - Tests
// - Short-lived demos where provisioning at startup is acceptable

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{EventLog, RecordTable};
use crate::Error;
use crate::clock::{Clock, SystemClock};
use crate::traits::{ManagedRecord, RecordStore, UpdateEvent};

/// In-memory record store
///
/// Records and events sit behind separate locks, so audit appends never
/// block record reads. Clones share the same state.
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::store::MemoryRecordStore;
/// use ddns_core::traits::RecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     assert!(store.get_record("home.example.com").await?.is_none());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<RecordTable>>,
    events: Arc<RwLock<EventLog>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRecordStore {
    /// Create a new empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty store; `clock` decides which events have expired
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(RwLock::new(RecordTable::default())),
            events: Arc::new(RwLock::new(EventLog::default())),
            clock,
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_record(&self, hostname: &str) -> Result<Option<ManagedRecord>, Error> {
        Ok(self.records.read().await.get(hostname))
    }

    async fn create_record(&self, record: ManagedRecord) -> Result<(), Error> {
        self.records.write().await.create(record)
    }

    async fn update_record(
        &self,
        record: ManagedRecord,
        expected_last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        self.records.write().await.update(record, expected_last_updated)
    }

    async fn delete_record(&self, hostname: &str) -> Result<(), Error> {
        self.records.write().await.delete(hostname)
    }

    async fn list_records(&self) -> Result<Vec<ManagedRecord>, Error> {
        Ok(self.records.read().await.list())
    }

    async fn append_event(&self, event: UpdateEvent) -> Result<(), Error> {
        self.events.write().await.append(event);
        Ok(())
    }

    async fn query_events(&self, hostname: &str, limit: usize) -> Result<Vec<UpdateEvent>, Error> {
        let now = self.clock.now();
        Ok(self.events.read().await.query(hostname, limit, now))
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }
}
