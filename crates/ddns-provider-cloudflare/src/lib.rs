// # Cloudflare DNS Backend
//
// This crate publishes address records through the Cloudflare API v4.
//
// ## Behavior
//
// - One logical operation per call: `upsert` looks the record up and then
//   either replaces it (PUT) or creates it (POST)
// - Full error propagation; no retries or backoff (the update pipeline owns
//   deadlines and decides what a failure means)
// - HTTP timeout configured (30 seconds)
// - Status codes mapped to specific messages (401/403, 404, 409, 429, 5xx)
// - Dry-run mode: lookups are performed, mutations are only logged
// - A and AAAA records, never proxied
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - Backend construction fails if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?page=..&per_page=..`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Update DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ddns_core::config::ProviderConfig;
use ddns_core::traits::{DnsBackend, DnsBackendFactory, RecordType, Zone};
use ddns_core::{Error, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Zones requested per page when listing
const ZONES_PER_PAGE: u32 = 50;

const PROVIDER: &str = "cloudflare";

/// Cloudflare DNS backend
///
/// Stateless apart from the HTTP client; safe to share across request
/// tasks.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the backend will:
/// - Perform all GET requests (zone listing, record lookup)
/// - Log the intended POST/PUT/DELETE
/// - **NOT** actually modify DNS records
pub struct CloudflareBackend {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Account ID restricting zone listings (optional)
    account_id: Option<String>,

    /// API base URL, overridable for tests
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform lookups but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareBackend")
            .field("api_token", &"<REDACTED>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareBackend {
    /// Create a new Cloudflare backend
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the token is empty or the HTTP client
    /// cannot be built.
    pub fn new(
        api_token: impl Into<String>,
        account_id: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            account_id: account_id.filter(|id| !id.is_empty()),
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            dry_run,
        })
    }

    /// Point the backend at a different API root (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether mutations are only logged
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Send a request and return the parsed `result` envelope
    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> Result<Value> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("{} on Cloudflare: {}", action, e))
                } else {
                    Error::provider(PROVIDER, format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, action, &error_text));
        }

        let body: Value = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("Failed to parse response: {}", e))
        })?;

        if body["success"].as_bool() == Some(false) {
            return Err(Error::provider(
                PROVIDER,
                format!("{} rejected: {}", action, body["errors"]),
            ));
        }

        Ok(body)
    }

    /// Find the ID of the record of `record_type` at `name`, if any
    async fn find_record_id(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Option<String>> {
        let url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);
        let request = self
            .client
            .get(&url)
            .query(&[("name", name), ("type", record_type.as_str())]);

        let body = self.send(request, "Record lookup").await?;
        let records = body["result"].as_array().ok_or_else(|| {
            Error::provider(PROVIDER, "Invalid response format: result is not an array")
        })?;

        match records.first() {
            None => Ok(None),
            Some(record) => {
                let id = record["id"].as_str().ok_or_else(|| {
                    Error::provider(PROVIDER, "Invalid response format: record.id is not a string")
                })?;
                tracing::debug!("Found {} record ID for {}: {}", record_type, name, id);
                Ok(Some(id.to_string()))
            }
        }
    }
}

/// Map a non-success HTTP status to an error
fn status_error(status: StatusCode, action: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::provider(
            PROVIDER,
            format!(
                "Authentication failed: Invalid API token or insufficient permissions. Status: {}",
                status
            ),
        ),
        404 => Error::not_found(format!("{} failed: {}", action, status)),
        409 => Error::provider(
            PROVIDER,
            format!("Conflict: Record is being updated by another process. Status: {}", status),
        ),
        429 => Error::provider(
            PROVIDER,
            format!("Rate limit exceeded. Please retry later. Status: {}", status),
        ),
        500..=599 => Error::provider(
            PROVIDER,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", action, status, body)),
    }
}

#[async_trait]
impl DnsBackend for CloudflareBackend {
    /// Create or replace a DNS record
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?name=home.example.com&type=A
    ///
    /// # Record exists (skipped in dry-run mode)
    /// PUT /zones/:zone_id/dns_records/:record_id
    ///
    /// # Record missing (skipped in dry-run mode)
    /// POST /zones/:zone_id/dns_records
    ///
    /// { "type": "A", "name": "...", "content": "1.2.3.4", "ttl": 60, "proxied": false }
    /// ```
    async fn upsert(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
        value: &str,
        ttl: u32,
    ) -> Result<()> {
        tracing::info!(
            "Publishing Cloudflare DNS record: {} -> {} ({}) [mode: {}]",
            name,
            value,
            record_type,
            if self.dry_run { "DRY-RUN" } else { "LIVE" }
        );

        let payload = serde_json::json!({
            "type": record_type.as_str(),
            "name": name,
            "content": value,
            "ttl": ttl,
            "proxied": false,
        });

        let existing = self.find_record_id(zone_id, name, record_type).await?;
        let records_url = format!("{}/zones/{}/dns_records", self.base_url, zone_id);

        match existing {
            Some(record_id) => {
                let url = format!("{}/{}", records_url, record_id);
                if self.dry_run {
                    tracing::info!("[DRY-RUN] Would send PUT request to {} with payload: {}", url, payload);
                    return Ok(());
                }
                self.send(self.client.put(&url).json(&payload), "Record update")
                    .await?;
            }
            None => {
                if self.dry_run {
                    tracing::info!(
                        "[DRY-RUN] Would send POST request to {} with payload: {}",
                        records_url,
                        payload
                    );
                    return Ok(());
                }
                self.send(self.client.post(&records_url).json(&payload), "Record creation")
                    .await?;
            }
        }

        tracing::info!("DNS record published: {} -> {}", name, value);
        Ok(())
    }

    async fn delete(&self, zone_id: &str, name: &str, record_type: RecordType) -> Result<()> {
        let Some(record_id) = self.find_record_id(zone_id, name, record_type).await? else {
            tracing::debug!("No {} record at {}; nothing to delete", record_type, name);
            return Ok(());
        };

        let url = format!("{}/zones/{}/dns_records/{}", self.base_url, zone_id, record_id);
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", url);
            return Ok(());
        }

        match self.send(self.client.delete(&url), "Record deletion").await {
            Ok(_) | Err(Error::NotFound(_)) => {
                tracing::info!("DNS record deleted: {} ({})", name, record_type);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn list_zones(&self) -> Result<Vec<Zone>> {
        let url = format!("{}/zones", self.base_url);
        let mut zones = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query = vec![
                ("page", page.to_string()),
                ("per_page", ZONES_PER_PAGE.to_string()),
            ];
            if let Some(account_id) = &self.account_id {
                query.push(("account.id", account_id.clone()));
            }

            let body = self
                .send(self.client.get(&url).query(&query), "Zone listing")
                .await?;
            let results = body["result"].as_array().ok_or_else(|| {
                Error::provider(PROVIDER, "Invalid response format: result is not an array")
            })?;

            for zone in results {
                zones.push(parse_zone(zone)?);
            }

            let total_pages = body["result_info"]["total_pages"].as_u64().unwrap_or(1);
            if results.is_empty() || u64::from(page) >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} Cloudflare zones", zones.len());
        Ok(zones)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

fn parse_zone(zone: &Value) -> Result<Zone> {
    let id = zone["id"]
        .as_str()
        .ok_or_else(|| Error::provider(PROVIDER, "Invalid response format: zone.id is not a string"))?;
    let name = zone["name"].as_str().ok_or_else(|| {
        Error::provider(PROVIDER, "Invalid response format: zone.name is not a string")
    })?;

    Ok(Zone {
        id: id.to_string(),
        name: name.trim_end_matches('.').to_ascii_lowercase(),
        record_count: zone["meta"]["record_count"].as_u64(),
        // Cloudflare only serves public zones through this API
        private: false,
    })
}

/// Factory for creating Cloudflare backends
pub struct CloudflareFactory;

impl DnsBackendFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsBackend>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                account_id,
                dry_run,
            } => {
                if *dry_run {
                    tracing::warn!(
                        "Cloudflare backend running in DRY-RUN mode - no changes will be made"
                    );
                }
                Ok(Box::new(CloudflareBackend::new(
                    api_token.clone(),
                    account_id.clone(),
                    *dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare backend")),
        }
    }
}

/// Register the Cloudflare backend with a registry
///
/// # Example
///
/// ```rust
/// use ddns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ddns_provider_cloudflare::register(&registry);
/// assert!(registry.has_backend("cloudflare"));
/// ```
pub fn register(registry: &ddns_core::ProviderRegistry) {
    registry.register_backend(PROVIDER, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creation() {
        let factory = CloudflareFactory;

        let config = ProviderConfig::Cloudflare {
            api_token: "test_token".to_string(),
            account_id: None,
            dry_run: false,
        };

        let backend = factory.create(&config).unwrap();
        assert_eq!(backend.provider_name(), "cloudflare");
    }

    #[test]
    fn test_factory_missing_token() {
        let factory = CloudflareFactory;

        let config = ProviderConfig::Cloudflare {
            api_token: "".to_string(),
            account_id: None,
            dry_run: false,
        };

        assert!(matches!(factory.create(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_factory_rejects_other_provider_config() {
        let config = ProviderConfig::Custom {
            factory: "route53".to_string(),
            config: serde_json::json!({}),
        };

        assert!(CloudflareFactory.create(&config).is_err());
    }

    #[test]
    fn test_dry_run_flag() {
        let dry = CloudflareBackend::new("token", None, true).unwrap();
        let live = CloudflareBackend::new("token", None, false).unwrap();

        assert!(dry.is_dry_run());
        assert!(!live.is_dry_run());
    }

    #[test]
    fn test_empty_account_id_is_ignored() {
        let backend = CloudflareBackend::new("token", Some(String::new()), false).unwrap();
        assert_eq!(backend.account_id, None);
    }

    #[test]
    fn test_api_token_not_exposed_in_debug() {
        let backend = CloudflareBackend::new("secret_token_12345", None, false).unwrap();

        let debug_str = format!("{:?}", backend);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareBackend"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = CloudflareBackend::new("token", None, false)
            .unwrap()
            .with_base_url("http://127.0.0.1:8080/client/v4/");
        assert_eq!(backend.base_url, "http://127.0.0.1:8080/client/v4");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "Record lookup", ""),
            Error::NotFound(_)
        ));

        let auth = status_error(StatusCode::FORBIDDEN, "Record update", "");
        assert!(auth.to_string().contains("Authentication failed"));

        let throttled = status_error(StatusCode::TOO_MANY_REQUESTS, "Record update", "");
        assert!(throttled.to_string().contains("Rate limit"));

        let server = status_error(StatusCode::BAD_GATEWAY, "Record update", "upstream");
        assert!(server.to_string().contains("transient"));
        assert!(server.is_backend());
    }

    #[test]
    fn test_parse_zone_normalizes_name() {
        let zone = parse_zone(&serde_json::json!({
            "id": "abc",
            "name": "Example.COM.",
            "meta": { "record_count": 12 }
        }))
        .unwrap();

        assert_eq!(zone.name, "example.com");
        assert_eq!(zone.record_count, Some(12));
        assert!(!zone.private);
    }
}
