//! Record management API handlers
//!
//! Session-guarded JSON endpoints over [`RecordManager`]. Credential hashes
//! never leave the server; a plaintext token appears only in the response to
//! creation or regeneration.
//!
//! [`RecordManager`]: ddns_core::RecordManager

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use ddns_core::{ManagedRecord, RecordChanges, Session, UpdateEvent, Zone};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::info;

use super::{ApiError, AppState};

/// A managed record as exposed by the API
#[derive(Debug, Serialize)]
pub struct RecordView {
    pub hostname: String,
    pub zone_id: String,
    pub zone_name: String,
    pub ttl: u32,
    pub current_address: Option<IpAddr>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<ManagedRecord> for RecordView {
    fn from(record: ManagedRecord) -> Self {
        Self {
            hostname: record.hostname,
            zone_id: record.zone_id,
            zone_name: record.zone_name,
            ttl: record.ttl,
            current_address: record.current_address,
            enabled: record.enabled,
            created_at: record.created_at,
            last_updated: record.last_updated,
        }
    }
}

/// Request to provision a hostname
#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub hostname: String,
    pub zone_id: String,
    #[serde(default)]
    pub ttl: Option<u32>,
}

/// Request to edit a record
#[derive(Debug, Deserialize)]
pub struct UpdateRecordRequest {
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// A record together with its freshly minted token
#[derive(Serialize)]
pub struct TokenResponse {
    pub record: RecordView,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /api/zones`
pub async fn list_zones(State(state): State<AppState>) -> Result<Json<Vec<Zone>>, ApiError> {
    Ok(Json(state.records.zones().await?))
}

/// `GET /api/records`
pub async fn list_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecordView>>, ApiError> {
    let records = state.records.list().await?;
    Ok(Json(records.into_iter().map(RecordView::from).collect()))
}

/// `POST /api/records`
pub async fn create_record(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    let provisioned = state
        .records
        .create(&body.hostname, &body.zone_id, body.ttl)
        .await?;

    info!(
        operator = %session.username,
        hostname = %provisioned.record.hostname,
        "Record created"
    );

    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            record: provisioned.record.into(),
            token: provisioned.token,
        }),
    ))
}

/// `GET /api/records/{hostname}`
pub async fn get_record(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
) -> Result<Json<RecordView>, ApiError> {
    Ok(Json(state.records.get(&hostname).await?.into()))
}

/// `PATCH /api/records/{hostname}`
pub async fn update_record(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(hostname): Path<String>,
    Json(body): Json<UpdateRecordRequest>,
) -> Result<Json<RecordView>, ApiError> {
    let record = state
        .records
        .update(
            &hostname,
            RecordChanges {
                ttl: body.ttl,
                enabled: body.enabled,
            },
        )
        .await?;

    info!(
        operator = %session.username,
        hostname = %record.hostname,
        ttl = record.ttl,
        enabled = record.enabled,
        "Record updated"
    );
    Ok(Json(record.into()))
}

/// `DELETE /api/records/{hostname}`
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(hostname): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.records.delete(&hostname).await?;
    info!(operator = %session.username, hostname = %hostname, "Record deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/records/{hostname}/token`
pub async fn regenerate_token(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(hostname): Path<String>,
) -> Result<Json<TokenResponse>, ApiError> {
    let provisioned = state.records.regenerate_token(&hostname).await?;
    info!(
        operator = %session.username,
        hostname = %provisioned.record.hostname,
        "Token regenerated"
    );

    Ok(Json(TokenResponse {
        record: provisioned.record.into(),
        token: provisioned.token,
    }))
}

/// `GET /api/records/{hostname}/history?limit=`
pub async fn record_history(
    State(state): State<AppState>,
    Path(hostname): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<UpdateEvent>>, ApiError> {
    Ok(Json(state.records.history(&hostname, params.limit).await?))
}

#[cfg(test)]
mod tests {
    use crate::http::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn api(method: &str, uri: &str, cookie: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("cookie", cookie);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_zones_listed() {
        let app = TestApp::new().await;
        let cookie = app.login().await;

        let response = app
            .router()
            .oneshot(api("GET", "/api/zones", &cookie, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], ZONE_ID);
        assert_eq!(body[0]["name"], "example.com");
    }

    #[tokio::test]
    async fn test_record_lifecycle() {
        let app = TestApp::new().await;
        let cookie = app.login().await;

        // Create
        let response = app
            .router()
            .oneshot(api(
                "POST",
                "/api/records",
                &cookie,
                Some(json!({ "hostname": "Home.Example.com", "zone_id": ZONE_ID, "ttl": 120 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["record"]["hostname"], HOSTNAME);
        assert_eq!(created["record"]["ttl"], 120);
        assert!(created["record"].get("credential_hash").is_none());
        let token = created["token"].as_str().unwrap().to_string();
        assert_eq!(token.len(), 43);

        // The token works on the update endpoint
        assert_eq!(app.update(&token, "203.0.113.5").await, "good 203.0.113.5");

        // Duplicate
        let response = app
            .router()
            .oneshot(api(
                "POST",
                "/api/records",
                &cookie,
                Some(json!({ "hostname": HOSTNAME, "zone_id": ZONE_ID })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        // List and get never expose the hash
        let response = app
            .router()
            .oneshot(api("GET", "/api/records", &cookie, None))
            .await
            .unwrap();
        let listed = json_body(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["current_address"], "203.0.113.5");
        assert!(!listed.to_string().contains("argon2"));

        // History
        let response = app
            .router()
            .oneshot(api(
                "GET",
                &format!("/api/records/{}/history?limit=5", HOSTNAME),
                &cookie,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let history = json_body(response).await;
        assert_eq!(history[0]["status"], "good");

        // Patch
        let response = app
            .router()
            .oneshot(api(
                "PATCH",
                &format!("/api/records/{}", HOSTNAME),
                &cookie,
                Some(json!({ "enabled": false })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["enabled"], false);
        assert_eq!(app.update(&token, "203.0.113.5").await, "nohost");

        // Delete
        let response = app
            .router()
            .oneshot(api("DELETE", &format!("/api/records/{}", HOSTNAME), &cookie, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .router()
            .oneshot(api("GET", &format!("/api/records/{}", HOSTNAME), &cookie, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_token_regeneration() {
        let app = TestApp::new().await;
        let cookie = app.login().await;
        let old_token = app.provision(HOSTNAME).await;

        let response = app
            .router()
            .oneshot(api(
                "POST",
                &format!("/api/records/{}/token", HOSTNAME),
                &cookie,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let new_token = json_body(response).await["token"]
            .as_str()
            .unwrap()
            .to_string();

        assert_eq!(app.update(&old_token, "203.0.113.5").await, "badauth");
        assert_eq!(app.update(&new_token, "203.0.113.5").await, "good 203.0.113.5");
    }

    #[tokio::test]
    async fn test_invalid_creation_is_400() {
        let app = TestApp::new().await;
        let cookie = app.login().await;

        let response = app
            .router()
            .oneshot(api(
                "POST",
                "/api/records",
                &cookie,
                Some(json!({ "hostname": "home.example.org", "zone_id": ZONE_ID })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["details"].as_str().unwrap().contains("example.com"));
    }
}
