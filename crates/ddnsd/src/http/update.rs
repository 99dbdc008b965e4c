//! DynDNS2 update endpoint
//!
//! `GET /nic/update?hostname=<fqdn>&myip=<address>` with
//! `Authorization: Basic base64(<any>:<token>)`. The answer is one line of
//! plain text. Status: 401 for `badauth`, 429 for `abuse`, 200 otherwise.
//!
//! Requests counted against a hostname's rate window carry
//! `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
//! (unix seconds).

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ddns_core::{RateLimitWindow, UpdateOutcome, UpdateRequest};
use serde::Deserialize;
use tracing::debug;

use super::{AppState, ClientAddr};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Query parameters of an update request
#[derive(Debug, Deserialize)]
pub struct UpdateParams {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub myip: Option<String>,
}

/// Handle a DynDNS2 update
pub async fn nic_update(
    State(state): State<AppState>,
    ClientAddr(source_address): ClientAddr,
    headers: HeaderMap,
    Query(params): Query<UpdateParams>,
) -> Response {
    let Some(credential) = basic_auth_password(&headers) else {
        debug!("Update from {} without usable credentials", source_address);
        return challenge();
    };

    let client = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let request = UpdateRequest {
        hostname: params.hostname.unwrap_or_default(),
        claimed_address: params.myip,
        source_address,
        credential,
        client,
    };

    let processed = state.pipeline.process_detailed(&request).await;
    let mut response = match processed.outcome {
        UpdateOutcome::BadAuth => challenge(),
        outcome => plain(status_for(&outcome), outcome.to_string()),
    };
    if let Some(window) = processed.rate_limit {
        set_rate_limit_headers(&mut response, &window);
    }
    response
}

/// Echo the caller's source address
pub async fn echo_ip(ClientAddr(source_address): ClientAddr) -> Response {
    plain(StatusCode::OK, source_address)
}

fn status_for(outcome: &UpdateOutcome) -> StatusCode {
    match outcome {
        UpdateOutcome::BadAuth => StatusCode::UNAUTHORIZED,
        UpdateOutcome::Abuse => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::OK,
    }
}

fn plain(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

fn challenge() -> Response {
    let mut response = plain(StatusCode::UNAUTHORIZED, UpdateOutcome::BadAuth.to_string());
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"ddns\""),
    );
    response
}

fn set_rate_limit_headers(response: &mut Response, window: &RateLimitWindow) {
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(window.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(window.remaining));
    headers.insert(
        "x-ratelimit-reset",
        HeaderValue::from(window.resets_at.timestamp()),
    );
}

/// Password slot of a Basic `Authorization` header; the username is ignored
fn basic_auth_password(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_, password) = decoded.split_once(':')?;

    if password.is_empty() {
        return None;
    }
    Some(password.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
    }

    fn update_request(query: &str, source: &str, auth: Option<String>) -> Request<Body> {
        let mut builder = Request::get(format!("/nic/update?{}", query))
            .header("x-forwarded-for", source)
            .header("user-agent", "router/2.1");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_basic_auth_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&basic("ignored", "s3cret:with:colons")).unwrap(),
        );
        assert_eq!(
            basic_auth_password(&headers).as_deref(),
            Some("s3cret:with:colons")
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(basic_auth_password(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic !!!not-base64"),
        );
        assert_eq!(basic_auth_password(&headers), None);

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&basic("user", "")).unwrap(),
        );
        assert_eq!(basic_auth_password(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_auth_is_challenged() {
        let app = TestApp::new().await;

        let response = app
            .router()
            .oneshot(update_request("hostname=home.example.com", "203.0.113.5", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(text_body(response).await, "badauth");
    }

    #[tokio::test]
    async fn test_good_then_nochg() {
        let app = TestApp::new().await;
        let token = app.provision(HOSTNAME).await;

        let first = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com",
                "203.0.113.5",
                Some(basic("user", &token)),
            ))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(
            first.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(text_body(first).await, "good 203.0.113.5");

        let second = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com&myip=203.0.113.5",
                "203.0.113.5",
                Some(basic("user", &token)),
            ))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(text_body(second).await, "nochg 203.0.113.5");
        assert_eq!(app.backend.upserts(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_headers_count_down() {
        let app = TestApp::new().await;
        let token = app.provision(HOSTNAME).await;

        let mut seen = Vec::new();
        for _ in 0..2 {
            let response = app
                .router()
                .oneshot(update_request(
                    "hostname=home.example.com",
                    "203.0.113.5",
                    Some(basic("user", &token)),
                ))
                .await
                .unwrap();
            let header = |name: &str| -> i64 {
                response.headers()[name].to_str().unwrap().parse().unwrap()
            };
            seen.push((
                header("x-ratelimit-limit"),
                header("x-ratelimit-remaining"),
                header("x-ratelimit-reset"),
            ));
        }

        let (limit, first_remaining, reset) = seen[0];
        assert_eq!(first_remaining, limit - 1);
        assert_eq!(seen[1], (limit, limit - 2, reset));

        // Bad credentials are counted too
        let response = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com",
                "203.0.113.5",
                Some(basic("user", "wrong-token")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (limit - 3).to_string().as_str()
        );

        // Unauthenticated requests never reach the limiter
        let response = app
            .router()
            .oneshot(update_request("hostname=home.example.com", "203.0.113.5", None))
            .await
            .unwrap();
        assert!(!response.headers().contains_key("x-ratelimit-remaining"));
    }

    #[tokio::test]
    async fn test_untrusted_forwarded_for_cannot_dodge_lockout() {
        let mut app = TestApp::new().await;
        app.state.trust_forwarded_for = false;
        let token = app.provision(HOSTNAME).await;

        for i in 0..5 {
            let response = app
                .router()
                .oneshot(update_request(
                    "hostname=home.example.com",
                    &format!("198.51.100.{}", i),
                    Some(basic("user", "wrong-token")),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com",
                "198.51.100.99",
                Some(basic("user", &token)),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(text_body(response).await, "abuse");
    }

    #[tokio::test]
    async fn test_bad_token_is_401() {
        let app = TestApp::new().await;
        app.provision(HOSTNAME).await;

        let response = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com",
                "203.0.113.5",
                Some(basic("user", "wrong")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(text_body(response).await, "badauth");
    }

    #[tokio::test]
    async fn test_spoofed_myip_is_429() {
        let app = TestApp::new().await;
        let token = app.provision(HOSTNAME).await;

        let response = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com&myip=198.51.100.1",
                "203.0.113.5",
                Some(basic("user", &token)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(text_body(response).await, "abuse");
        assert_eq!(app.backend.upserts(), 0);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_hostname_are_nohost() {
        let app = TestApp::new().await;

        for query in ["hostname=nobody.example.com", "myip=203.0.113.5"] {
            let response = app
                .router()
                .oneshot(update_request(
                    query,
                    "203.0.113.5",
                    Some(basic("user", "whatever")),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(text_body(response).await, "nohost");
        }
    }

    #[tokio::test]
    async fn test_invalid_address_is_911() {
        let app = TestApp::new().await;
        let token = app.provision(HOSTNAME).await;

        let response = app
            .router()
            .oneshot(update_request(
                "hostname=home.example.com&myip=not-an-ip",
                "not-an-ip",
                Some(basic("user", &token)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text_body(response).await, "911");
    }

    #[tokio::test]
    async fn test_echo_ip() {
        let app = TestApp::new().await;

        let response = app
            .router()
            .oneshot(
                Request::get("/ip")
                    .header("x-forwarded-for", "::ffff:203.0.113.5, 10.0.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text_body(response).await, "203.0.113.5");
    }
}
