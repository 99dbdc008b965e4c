//! Test doubles and common utilities for pipeline contract tests
//!
//! The doubles record every call they receive so tests can assert on the
//! exact DNS traffic a request produced, and can be told to fail or hang.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ddns_core::config::{ProviderConfig, ServerConfig};
use ddns_core::error::{Error, Result};
use ddns_core::traits::{
    AbuseLimiter, DnsBackend, LockoutStatus, ManagedRecord, RecordStore, RecordType, UpdateEvent,
    WindowCount, Zone,
};
use ddns_core::{
    Clock, CredentialHasher, FakeClock, MemoryLimiter, MemoryRecordStore, UpdatePipeline,
    UpdateRequest,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const ZONE_ID: &str = "zone-123";
pub const ZONE_NAME: &str = "example.com";
pub const HOSTNAME: &str = "home.example.com";
pub const TOKEN: &str = "correct-token";

/// A DNS call observed by the recording backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Upsert {
        zone_id: String,
        name: String,
        record_type: RecordType,
        value: String,
        ttl: u32,
    },
    Delete {
        zone_id: String,
        name: String,
        record_type: RecordType,
    },
}

/// How the recording backend answers mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Succeed,
    Fail,
    Hang,
}

/// A DnsBackend that records calls and can fail or hang on demand
#[derive(Clone)]
pub struct RecordingBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    upsert_mode: Arc<Mutex<BackendMode>>,
    delete_mode: Arc<Mutex<BackendMode>>,
    zones_mode: Arc<Mutex<BackendMode>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            upsert_mode: Arc::new(Mutex::new(BackendMode::Succeed)),
            delete_mode: Arc::new(Mutex::new(BackendMode::Succeed)),
            zones_mode: Arc::new(Mutex::new(BackendMode::Succeed)),
        }
    }

    pub fn set_upsert_mode(&self, mode: BackendMode) {
        *self.upsert_mode.lock().unwrap() = mode;
    }

    pub fn set_delete_mode(&self, mode: BackendMode) {
        *self.delete_mode.lock().unwrap() = mode;
    }

    pub fn set_zones_mode(&self, mode: BackendMode) {
        *self.zones_mode.lock().unwrap() = mode;
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<BackendCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, BackendCall::Upsert { .. }))
            .collect()
    }

    async fn answer(mode: BackendMode) -> Result<()> {
        match mode {
            BackendMode::Succeed => Ok(()),
            BackendMode::Fail => Err(Error::provider("recording", "simulated provider failure")),
            BackendMode::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DnsBackend for RecordingBackend {
    async fn upsert(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(BackendCall::Upsert {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type,
            value: value.to_string(),
            ttl,
        });
        let mode = *self.upsert_mode.lock().unwrap();
        Self::answer(mode).await
    }

    async fn delete(&self, zone_id: &str, name: &str, record_type: RecordType) -> Result<()> {
        self.calls.lock().unwrap().push(BackendCall::Delete {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
            record_type,
        });
        let mode = *self.delete_mode.lock().unwrap();
        Self::answer(mode).await
    }

    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let mode = *self.zones_mode.lock().unwrap();
        Self::answer(mode).await?;
        Ok(vec![Zone {
            id: ZONE_ID.to_string(),
            name: ZONE_NAME.to_string(),
            record_count: Some(2),
            private: false,
        }])
    }

    fn provider_name(&self) -> &'static str {
        "recording"
    }
}

/// An AbuseLimiter whose every call fails
pub struct BrokenLimiter;

#[async_trait]
impl AbuseLimiter for BrokenLimiter {
    async fn increment(&self, _key: &str) -> Result<WindowCount> {
        Err(Error::store("limiter table unavailable"))
    }

    async fn is_locked_out(&self, _key: &str) -> Result<LockoutStatus> {
        Err(Error::store("limiter table unavailable"))
    }

    async fn record_auth_failure(&self, _key: &str) -> Result<LockoutStatus> {
        Err(Error::store("limiter table unavailable"))
    }

    async fn record_auth_success(&self, _key: &str) -> Result<()> {
        Err(Error::store("limiter table unavailable"))
    }
}

/// A RecordStore wrapper whose writes can be made to fail
#[derive(Clone)]
pub struct FlakyStore {
    inner: MemoryRecordStore,
    fail_updates: Arc<AtomicBool>,
    fail_appends: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: MemoryRecordStore) -> Self {
        Self {
            inner,
            fail_updates: Arc::new(AtomicBool::new(false)),
            fail_appends: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get_record(&self, hostname: &str) -> Result<Option<ManagedRecord>> {
        self.inner.get_record(hostname).await
    }

    async fn create_record(&self, record: ManagedRecord) -> Result<()> {
        self.inner.create_record(record).await
    }

    async fn update_record(
        &self,
        record: ManagedRecord,
        expected_last_updated: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(Error::store("simulated write failure"));
        }
        self.inner.update_record(record, expected_last_updated).await
    }

    async fn delete_record(&self, hostname: &str) -> Result<()> {
        self.inner.delete_record(hostname).await
    }

    async fn list_records(&self) -> Result<Vec<ManagedRecord>> {
        self.inner.list_records().await
    }

    async fn append_event(&self, event: UpdateEvent) -> Result<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Error::store("simulated append failure"));
        }
        self.inner.append_event(event).await
    }

    async fn query_events(&self, hostname: &str, limit: usize) -> Result<Vec<UpdateEvent>> {
        self.inner.query_events(hostname, limit).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// Cheap Argon2 parameters so tests do not spend seconds hashing
pub fn cheap_hasher() -> CredentialHasher {
    CredentialHasher::with_cost(8, 1, 1).unwrap()
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::new(ProviderConfig::Cloudflare {
        api_token: "test-token".to_string(),
        account_id: None,
        dry_run: false,
    });
    config.backend_timeout_secs = 1;
    config
}

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-09T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// A pipeline wired to test doubles
pub struct Harness {
    pub clock: FakeClock,
    pub store: FlakyStore,
    pub backend: RecordingBackend,
    pub pipeline: UpdatePipeline,
    pub config: ServerConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let clock = FakeClock::new(start_time());
        let limiter = Arc::new(MemoryLimiter::new(&config.limits, Arc::new(clock.clone())));
        Self::with_limiter(config, clock, limiter)
    }

    pub fn with_limiter(
        config: ServerConfig,
        clock: FakeClock,
        limiter: Arc<dyn AbuseLimiter>,
    ) -> Self {
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = FlakyStore::new(MemoryRecordStore::with_clock(shared_clock.clone()));
        let backend = RecordingBackend::new();

        let pipeline = UpdatePipeline::new(
            Arc::new(store.clone()),
            Arc::new(backend.clone()),
            limiter,
            cheap_hasher(),
            shared_clock,
            &config,
        );

        Self {
            clock,
            store,
            backend,
            pipeline,
            config,
        }
    }

    /// Insert an enabled record for `hostname` whose token is [`TOKEN`]
    pub async fn provision(&self, hostname: &str, address: Option<&str>) {
        let now = self.clock.now();
        let record = ManagedRecord {
            hostname: hostname.to_string(),
            zone_id: ZONE_ID.to_string(),
            zone_name: ZONE_NAME.to_string(),
            ttl: 60,
            credential_hash: cheap_hasher().hash(TOKEN).await.unwrap(),
            current_address: address.map(|a| a.parse().unwrap()),
            enabled: true,
            created_at: now,
            last_updated: now,
        };
        self.store.create_record(record).await.unwrap();
    }

    pub async fn record(&self, hostname: &str) -> ManagedRecord {
        self.store.get_record(hostname).await.unwrap().unwrap()
    }

    pub async fn bound_address(&self, hostname: &str) -> Option<IpAddr> {
        self.record(hostname).await.current_address
    }

    pub async fn events(&self, hostname: &str) -> Vec<UpdateEvent> {
        self.store.query_events(hostname, 100).await.unwrap()
    }
}

/// An update request for [`HOSTNAME`]
pub fn request(myip: Option<&str>, source: &str, token: &str) -> UpdateRequest {
    UpdateRequest {
        hostname: HOSTNAME.to_string(),
        claimed_address: myip.map(str::to_string),
        source_address: source.to_string(),
        credential: token.to_string(),
        client: "test-router/1.0".to_string(),
    }
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}
