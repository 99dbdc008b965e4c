//! Core traits for the DDNS update server
//!
//! This module defines the abstract interfaces the update pipeline consumes.
//!
//! - [`RecordStore`]: Managed records and the append-only update log
//! - [`DnsBackend`]: Authoritative DNS provider (upsert/delete/list zones)
//! - [`AbuseLimiter`]: Fixed-window counters and failed-auth lockout

pub mod dns_backend;
pub mod limiter;
pub mod record_store;

pub use dns_backend::{DnsBackend, DnsBackendFactory, RecordType, Zone};
pub use limiter::{AbuseLimiter, LockoutStatus, WindowCount};
pub use record_store::{ManagedRecord, RecordStore, UpdateEvent, UpdateStatus};
