// HTTP transport
//
// Routes:
// - `GET /nic/update`: DynDNS2 update endpoint (Basic auth, plain text)
// - `GET /ip`: echo of the caller's source address
// - `GET /health`: liveness check
// - `POST /login`, `POST /logout`: operator session
// - `/api/*`: session-guarded JSON record management

mod admin;
mod client_addr;
mod error;
mod session;
mod update;

#[cfg(test)]
mod test_support;

use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use ddns_core::{RecordManager, SessionManager, UpdatePipeline};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use client_addr::ClientAddr;
pub use error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Update decision pipeline
    pub pipeline: Arc<UpdatePipeline>,
    /// Administrative record lifecycle
    pub records: Arc<RecordManager>,
    /// Operator sessions
    pub sessions: Arc<SessionManager>,
    /// Take the source address from `X-Forwarded-For` when present
    pub trust_forwarded_for: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/zones", get(admin::list_zones))
        .route(
            "/records",
            get(admin::list_records).post(admin::create_record),
        )
        .route(
            "/records/{hostname}",
            get(admin::get_record)
                .patch(admin::update_record)
                .delete(admin::delete_record),
        )
        .route("/records/{hostname}/token", post(admin::regenerate_token))
        .route("/records/{hostname}/history", get(admin::record_history))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_session,
        ));

    Router::new()
        .route("/nic/update", get(update::nic_update))
        .route("/ip", get(update::echo_ip))
        .route("/health", get(health_check))
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
