// # Record Store Implementations
//
// This module provides implementations of the RecordStore trait for
// different persistence strategies. Both share two building blocks:
//
// - `RecordTable`: the records, enforcing unique hostnames and conditional
//   updates
// - `EventLog`: per-hostname audit logs, newest-first queries, and periodic
//   sweeps of expired events across every hostname
//
// Events outlive their record: deleting a record leaves its history to
// expire on its own.

pub mod file;
pub mod memory;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::Error;
use crate::traits::{ManagedRecord, UpdateEvent};

/// How long appends go between sweeps of expired events
const SWEEP_INTERVAL_MINUTES: i64 = 60;

/// Managed records, keyed by hostname
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RecordTable {
    pub(crate) records: BTreeMap<String, ManagedRecord>,
}

impl RecordTable {
    pub(crate) fn get(&self, hostname: &str) -> Option<ManagedRecord> {
        self.records.get(hostname).cloned()
    }

    pub(crate) fn create(&mut self, record: ManagedRecord) -> Result<(), Error> {
        if self.records.contains_key(&record.hostname) {
            return Err(Error::already_exists(record.hostname));
        }
        self.records.insert(record.hostname.clone(), record);
        Ok(())
    }

    pub(crate) fn update(
        &mut self,
        record: ManagedRecord,
        expected_last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let current = self
            .records
            .get_mut(&record.hostname)
            .ok_or_else(|| Error::not_found(record.hostname.clone()))?;

        if let Some(expected) = expected_last_updated {
            if current.last_updated != expected {
                return Err(Error::conflict(format!(
                    "{} was modified concurrently",
                    record.hostname
                )));
            }
        }

        *current = record;
        Ok(())
    }

    pub(crate) fn delete(&mut self, hostname: &str) -> Result<(), Error> {
        if self.records.remove(hostname).is_none() {
            return Err(Error::not_found(hostname));
        }
        Ok(())
    }

    pub(crate) fn list(&self) -> Vec<ManagedRecord> {
        self.records.values().cloned().collect()
    }
}

/// Audit events keyed by hostname
///
/// Each log is kept oldest-first so appends are cheap; queries walk it
/// backwards.
#[derive(Debug, Default)]
pub(crate) struct EventLog {
    by_hostname: HashMap<String, Vec<UpdateEvent>>,
    next_sweep: Option<DateTime<Utc>>,
}

impl EventLog {
    /// Whether an append at `now` should sweep first
    pub(crate) fn sweep_due(&self, now: DateTime<Utc>) -> bool {
        self.next_sweep.is_none_or(|at| now >= at)
    }

    /// Drop expired events for every hostname; returns how many went
    pub(crate) fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.by_hostname.retain(|_, log| {
            let before = log.len();
            log.retain(|e| !e.is_expired(now));
            removed += before - log.len();
            !log.is_empty()
        });
        self.next_sweep = Some(now + Duration::minutes(SWEEP_INTERVAL_MINUTES));
        removed
    }

    pub(crate) fn push(&mut self, event: UpdateEvent) {
        self.by_hostname
            .entry(event.hostname.clone())
            .or_default()
            .push(event);
    }

    /// Push, sweeping first when one is due
    pub(crate) fn append(&mut self, event: UpdateEvent) {
        if self.sweep_due(event.timestamp) {
            self.sweep(event.timestamp);
        }
        self.push(event);
    }

    pub(crate) fn query(&self, hostname: &str, limit: usize, now: DateTime<Utc>) -> Vec<UpdateEvent> {
        let Some(log) = self.by_hostname.get(hostname) else {
            return Vec::new();
        };

        let mut events: Vec<UpdateEvent> = log
            .iter()
            .rev()
            .filter(|e| !e.is_expired(now))
            .cloned()
            .collect();
        // Stable sort: later appends stay first among equal timestamps
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        events
    }

    /// Every retained event, oldest-first within each hostname
    pub(crate) fn iter(&self) -> impl Iterator<Item = &UpdateEvent> {
        self.by_hostname.values().flatten()
    }

    /// Number of hostnames with retained events
    #[cfg(test)]
    pub(crate) fn hostnames(&self) -> usize {
        self.by_hostname.len()
    }
}
