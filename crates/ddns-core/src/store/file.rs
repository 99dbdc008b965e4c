// # File Record Store
//
// File-based implementation of RecordStore with crash recovery.
//
// ## Layout
//
// - `<path>`: the records document, rewritten on every record mutation
// - `<path stem>.events.jsonl`: the audit log, one JSON event per line
//
// Audit appends write a single line and never touch the records document.
// The log is rewritten only when a sweep drops expired events, or on load
// when it held expired events or a torn trailing line.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good records document
// - Recovery: Falls back to backup if corruption detected
// - Unreadable event lines are skipped and dropped at the next rewrite
//
// ## Consistency
//
// Every record mutation is applied to a copy of the table, the copy is
// written to disk, and only then does it replace the in-memory table. A
// failed write leaves both memory and disk at the previous state.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "home.example.com": {
//       "hostname": "home.example.com",
//       "zone_id": "023e105f4ecef8ad9ca31a8372d0c353",
//       "zone_name": "example.com",
//       "ttl": 60,
//       "credential_hash": "$argon2id$v=19$...",
//       "current_address": "203.0.113.5",
//       "enabled": true,
//       "created_at": "2025-01-09T12:00:00Z",
//       "last_updated": "2025-01-09T12:05:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::{EventLog, RecordTable};
use crate::Error;
use crate::clock::{Clock, SystemClock};
use crate::traits::{ManagedRecord, RecordStore, UpdateEvent};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based record store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::store::FileRecordStore;
/// use ddns_core::traits::RecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileRecordStore::new("/var/lib/ddns/records.json").await?;
///     let records = store.list_records().await?;
///     println!("{} managed hostnames", records.len());
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    events_path: PathBuf,
    table: RwLock<RecordTable>,
    events: Mutex<EventFile>,
    clock: Arc<dyn Clock>,
}

/// The in-memory event log and the handle appends go through
#[derive(Debug)]
struct EventFile {
    log: EventLog,
    writer: Option<fs::File>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(flatten)]
    table: RecordTable,
}

impl FileRecordStore {
    /// Create or load a file record store on the system clock
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If corruption is detected, try to load from backup
    /// 4. If both fail, start with an empty store
    /// 5. Load the event log, dropping expired events
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::with_clock(path, Arc::new(SystemClock)).await
    }

    /// Create or load a file record store; `clock` decides which events
    /// have expired
    pub async fn with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let table = Self::load_with_recovery(&path).await?;

        let events_path = Self::events_path(&path);
        let (log, stale) = Self::load_events(&events_path, clock.now()).await?;
        if stale {
            Self::write_events(&events_path, &log).await?;
        }

        Ok(Self {
            path,
            events_path,
            table: RwLock::new(table),
            events: Mutex::new(EventFile { log, writer: None }),
            clock,
        })
    }

    /// Load the table from file, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<RecordTable, Error> {
        let err = match Self::load(path).await {
            Ok(table) => {
                tracing::debug!("Loaded record store: {} records", table.records.len());
                return Ok(table);
            }
            Err(e) => e,
        };

        // Only a parse failure counts as corruption
        if !matches!(err, Error::Json(_)) {
            return Err(err);
        }

        tracing::warn!(
            "Store file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty store.");
            return Ok(RecordTable::default());
        }

        match Self::load(&backup_path).await {
            Ok(table) => {
                tracing::info!("Recovered store from backup: {} records", table.records.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore store file from backup: {}", restore_err);
                }
                Ok(table)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also unreadable: {}. Starting with empty store.",
                    backup_err
                );
                Ok(RecordTable::default())
            }
        }
    }

    async fn load(path: &Path) -> Result<RecordTable, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(RecordTable::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.table)
    }

    /// Load the event log, sweeping what expired as of `now`
    ///
    /// Returns the log and whether the file should be rewritten.
    async fn load_events(path: &Path, now: DateTime<Utc>) -> Result<(EventLog, bool), Error> {
        let mut log = EventLog::default();
        if !path.exists() {
            return Ok((log, false));
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read event log {}: {}", path.display(), e))
        })?;

        let mut skipped = 0;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<UpdateEvent>(line) {
                Ok(event) => log.push(event),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping unreadable event in {}: {}", path.display(), e);
                }
            }
        }

        let removed = log.sweep(now);
        tracing::debug!(
            "Loaded event log: {} events, {} expired, {} unreadable",
            log.iter().count(),
            removed,
            skipped
        );
        Ok((log, removed > 0 || skipped > 0))
    }

    /// Write a table to disk atomically
    async fn persist(&self, table: &RecordTable) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            table: table.clone(),
        })
        .map_err(|e| Error::store(format!("Failed to serialize store: {}", e)))?;

        let temp_path = Self::temp_path(&self.path);
        Self::write_temp(&temp_path, json.as_bytes()).await?;

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        Self::rename(&temp_path, &self.path).await?;
        tracing::trace!("Record store written to {}", self.path.display());
        Ok(())
    }

    /// Replace the event log file with the retained events
    async fn write_events(path: &Path, log: &EventLog) -> Result<(), Error> {
        let mut content = Vec::new();
        for event in log.iter() {
            serde_json::to_writer(&mut content, event)
                .map_err(|e| Error::store(format!("Failed to serialize event: {}", e)))?;
            content.push(b'\n');
        }

        let temp_path = Self::temp_path(path);
        Self::write_temp(&temp_path, &content).await?;
        Self::rename(&temp_path, path).await?;
        tracing::debug!("Event log compacted to {} bytes", content.len());
        Ok(())
    }

    /// Append one event as a single line
    ///
    /// The handle is dropped after a failed write and reopened next time.
    async fn write_event_line(&self, events: &mut EventFile, event: &UpdateEvent) -> Result<(), Error> {
        let mut line = serde_json::to_vec(event)
            .map_err(|e| Error::store(format!("Failed to serialize event: {}", e)))?;
        line.push(b'\n');

        let mut writer = match events.writer.take() {
            Some(writer) => writer,
            None => fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.events_path)
                .await
                .map_err(|e| {
                    Error::store(format!(
                        "Failed to open event log {}: {}",
                        self.events_path.display(),
                        e
                    ))
                })?,
        };

        writer.write_all(&line).await.map_err(|e| {
            Error::store(format!(
                "Failed to append to event log {}: {}",
                self.events_path.display(),
                e
            ))
        })?;
        writer.flush().await.map_err(|e| {
            Error::store(format!(
                "Failed to append to event log {}: {}",
                self.events_path.display(),
                e
            ))
        })?;

        events.writer = Some(writer);
        Ok(())
    }

    async fn write_temp(temp_path: &Path, bytes: &[u8]) -> Result<(), Error> {
        let mut file = fs::File::create(temp_path).await.map_err(|e| {
            Error::store(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        file.write_all(bytes).await.map_err(|e| {
            Error::store(format!(
                "Failed to write temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        file.sync_all().await.map_err(|e| {
            Error::store(format!(
                "Failed to sync temp file {}: {}",
                temp_path.display(),
                e
            ))
        })
    }

    async fn rename(from: &Path, to: &Path) -> Result<(), Error> {
        fs::rename(from, to).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })
    }

    /// Apply `change` to a copy of the table, persist it, then commit it
    ///
    /// The write lock is held throughout, so file writes never interleave.
    async fn mutate<F>(&self, change: F) -> Result<(), Error>
    where
        F: FnOnce(&mut RecordTable) -> Result<(), Error> + Send,
    {
        let mut guard = self.table.write().await;
        let mut next = guard.clone();
        change(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        path.with_extension("tmp")
    }

    fn events_path(path: &Path) -> PathBuf {
        path.with_extension("events.jsonl")
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get_record(&self, hostname: &str) -> Result<Option<ManagedRecord>, Error> {
        Ok(self.table.read().await.get(hostname))
    }

    async fn create_record(&self, record: ManagedRecord) -> Result<(), Error> {
        self.mutate(|table| table.create(record)).await
    }

    async fn update_record(
        &self,
        record: ManagedRecord,
        expected_last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        self.mutate(|table| table.update(record, expected_last_updated))
            .await
    }

    async fn delete_record(&self, hostname: &str) -> Result<(), Error> {
        self.mutate(|table| table.delete(hostname)).await
    }

    async fn list_records(&self) -> Result<Vec<ManagedRecord>, Error> {
        Ok(self.table.read().await.list())
    }

    async fn append_event(&self, event: UpdateEvent) -> Result<(), Error> {
        let mut events = self.events.lock().await;
        let now = event.timestamp;

        if events.log.sweep_due(now) && events.log.sweep(now) > 0 {
            events.log.push(event);
            // The open handle still points at the replaced file
            events.writer = None;
            return Self::write_events(&self.events_path, &events.log).await;
        }

        self.write_event_line(&mut events, &event).await?;
        events.log.push(event);
        Ok(())
    }

    async fn query_events(&self, hostname: &str, limit: usize) -> Result<Vec<UpdateEvent>, Error> {
        let now = self.clock.now();
        Ok(self.events.lock().await.log.query(hostname, limit, now))
    }

    async fn flush(&self) -> Result<(), Error> {
        {
            let guard = self.table.write().await;
            self.persist(&guard).await?;
        }

        let mut events = self.events.lock().await;
        if let Some(writer) = events.writer.as_mut() {
            writer.sync_all().await.map_err(|e| {
                Error::store(format!(
                    "Failed to sync event log {}: {}",
                    self.events_path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
