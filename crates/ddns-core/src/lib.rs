// # ddns-core
//
// Core library for the DynDNS2-compatible dynamic DNS update server.
//
// ## Architecture Overview
//
// - **UpdatePipeline**: Decides the outcome of one update request and
//   performs the DNS mutation on a real change
// - **AbuseLimiter**: Trait for fixed-window rate counting and
//   failed-authentication lockout
// - **RecordStore**: Trait for managed records and their update history
// - **DnsBackend**: Trait for publishing A/AAAA records at a DNS provider
// - **RecordManager**: Administrative record lifecycle (create, rotate
//   token, edit, delete, history)
// - **SessionManager**: Operator login for the management surface
// - **ProviderRegistry**: Plugin-based registry for DNS backends
//
// ## Design Principles
//
// 1. **Outcomes are values**: `badauth`, `abuse` and friends are returned,
//    not raised
// 2. **Injected collaborators**: stores, backends, limiters and clocks are
//    passed in, never global
// 3. **Local state follows DNS**: a record's address changes only after the
//    backend confirmed the write
// 4. **Best-effort auditing**: history writes never change an outcome

pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod hostname;
pub mod limiter;
pub mod pipeline;
pub mod provisioning;
pub mod registry;
pub mod session;
pub mod store;
pub mod traits;
pub mod zone_cache;

// Re-export core types for convenience
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{LimitsConfig, LockoutScope, ProviderConfig, RecordPolicy, ServerConfig, StoreConfig};
pub use credential::CredentialHasher;
pub use error::{Error, Result};
pub use limiter::MemoryLimiter;
pub use pipeline::{
    ProcessedUpdate, RateLimitWindow, UpdateOutcome, UpdatePipeline, UpdateRequest,
};
pub use provisioning::{ProvisionedRecord, RecordChanges, RecordManager};
pub use registry::ProviderRegistry;
pub use session::{Session, SessionManager};
pub use store::{FileRecordStore, MemoryRecordStore};
pub use traits::{
    AbuseLimiter, DnsBackend, DnsBackendFactory, LockoutStatus, ManagedRecord, RecordStore,
    RecordType, UpdateEvent, UpdateStatus, WindowCount, Zone,
};
pub use zone_cache::ZoneCache;
