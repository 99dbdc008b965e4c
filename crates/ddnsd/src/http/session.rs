//! Operator login, logout and the session guard for `/api`

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use ddns_core::session::SESSION_LIFETIME_HOURS;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApiError, AppState, ClientAddr};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "ddns_session";

/// Login request body
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response body
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    ClientAddr(client_addr): ClientAddr,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .login(&body.username, &body.password, &client_addr)
        .await?;

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE,
        session.id,
        SESSION_LIFETIME_HOURS * 3600
    );

    let mut response = Json(LoginResponse {
        username: session.username,
        expires_at: session.expires_at,
    })
    .into_response();
    set_cookie(&mut response, &cookie)?;
    Ok(response)
}

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(id) = session_cookie(&headers) {
        state.sessions.logout(&id).await;
    }

    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        SESSION_COOKIE
    );
    let mut response = StatusCode::NO_CONTENT.into_response();
    set_cookie(&mut response, &cookie)?;
    Ok(response)
}

/// Reject requests without a live session; the session is attached to the
/// request extensions for handlers
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(id) = session_cookie(request.headers()) else {
        debug!("API request without session cookie");
        return Err(ApiError::Unauthorized("login required".to_string()));
    };

    let Some(session) = state.sessions.validate(&id).await else {
        warn!("API request with unknown or expired session");
        return Err(ApiError::Unauthorized("session expired".to_string()));
    };

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

fn set_cookie(response: &mut Response, cookie: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(())
}

/// Value of the session cookie, if present and non-empty
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
