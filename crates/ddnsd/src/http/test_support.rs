//! Shared fixtures for handler tests

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ddns_core::config::{ProviderConfig, ServerConfig};
use ddns_core::{
    Clock, CredentialHasher, DnsBackend, FakeClock, MemoryLimiter, MemoryRecordStore,
    RecordManager, RecordType, Result, SessionManager, UpdatePipeline, Zone, ZoneCache,
};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use super::{AppState, router};

pub const ZONE_ID: &str = "zone-123";
pub const HOSTNAME: &str = "home.example.com";
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "correct horse battery";

/// Backend that accepts everything and counts upserts
#[derive(Default)]
pub struct CountingBackend {
    upserts: AtomicUsize,
}

impl CountingBackend {
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsBackend for CountingBackend {
    async fn upsert(
        &self,
        _zone_id: &str,
        _name: &str,
        _record_type: RecordType,
        _value: &str,
        _ttl: u32,
    ) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, _zone_id: &str, _name: &str, _record_type: RecordType) -> Result<()> {
        Ok(())
    }

    async fn list_zones(&self) -> Result<Vec<Zone>> {
        Ok(vec![Zone {
            id: ZONE_ID.to_string(),
            name: "example.com".to_string(),
            record_count: None,
            private: false,
        }])
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

/// A fully wired application over in-memory collaborators
pub struct TestApp {
    pub state: AppState,
    pub backend: Arc<CountingBackend>,
}

impl TestApp {
    pub async fn new() -> Self {
        let config = ServerConfig::new(ProviderConfig::Cloudflare {
            api_token: "test-token".to_string(),
            account_id: None,
            dry_run: false,
        });
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::default());
        let hasher = CredentialHasher::with_cost(8, 1, 1).unwrap();
        let store = Arc::new(MemoryRecordStore::with_clock(clock.clone()));
        let backend = Arc::new(CountingBackend::default());
        let limiter = Arc::new(MemoryLimiter::new(&config.limits, clock.clone()));
        let zones = Arc::new(ZoneCache::new(Duration::from_secs(300), clock.clone()));

        let pipeline = UpdatePipeline::new(
            store.clone(),
            backend.clone(),
            limiter.clone(),
            hasher.clone(),
            clock.clone(),
            &config,
        );
        let records = RecordManager::new(
            store,
            backend.clone(),
            zones,
            hasher.clone(),
            clock.clone(),
            &config,
        );
        let sessions = SessionManager::new(ADMIN_USER, ADMIN_PASSWORD, hasher, limiter, clock)
            .await
            .unwrap();

        Self {
            state: AppState {
                pipeline: Arc::new(pipeline),
                records: Arc::new(records),
                sessions: Arc::new(sessions),
                trust_forwarded_for: true,
            },
            backend,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Provision `hostname` in the test zone and return its token
    pub async fn provision(&self, hostname: &str) -> String {
        self.state
            .records
            .create(hostname, ZONE_ID, None)
            .await
            .unwrap()
            .token
    }

    /// Log in and return the `Cookie` header value
    pub async fn login(&self) -> String {
        let response = self
            .router()
            .oneshot(login_request(ADMIN_USER, ADMIN_PASSWORD))
            .await
            .unwrap();
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Send an update for [`HOSTNAME`] from `source` and return the body
    pub async fn update(&self, token: &str, source: &str) -> String {
        let auth = format!("Basic {}", STANDARD.encode(format!("router:{}", token)));
        let response = self
            .router()
            .oneshot(
                Request::get(format!("/nic/update?hostname={}", HOSTNAME))
                    .header("authorization", auth)
                    .header("x-forwarded-for", source)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        text_body(response).await
    }
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    let body = serde_json::json!({ "username": username, "password": password });
    Request::post("/login")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
