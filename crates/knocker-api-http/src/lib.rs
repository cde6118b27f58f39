// # Whitelist API Client
//
// HTTP implementation of `ApiClient` for the knocker whitelist API.
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (API Client)
//
// **Allowed Capabilities**:
// - ✅ Perform HTTP/HTTPS calls to the configured API only
// - ✅ Parse API responses
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads (violates shutdown determinism)
// - ❌ Implement retry logic (a failed knock is retried on the next tick)
// - ❌ Track leases or cadence (owned by KnockOrchestrator)
//
// ## Security Requirements
//
// - API key NEVER appears in logs or Debug output
// - API key is only sent on knock requests
//
// ## API Reference
//
// - Health: GET `/health` -> 200
// - Knock: POST `/knock` with `X-Api-Key` and `{"ip_address"?, "ttl"?}`
//   -> 200 `{"whitelisted_entry", "expires_at", "expires_in_seconds"}`

use async_trait::async_trait;
use knocker_core::traits::{ApiClient, KnockRequest, KnockResponse};
use knocker_core::{Error, Result};
use std::time::Duration;
use tracing::debug;

/// Default HTTP timeout for API requests
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the API key
const API_KEY_HEADER: &str = "X-Api-Key";

/// Whitelist API client
///
/// # Trust Level: Untrusted
///
/// Stateless and single-shot: one HTTP request per call.
pub struct HttpApiClient {
    /// Base URL without trailing slash
    base_url: String,

    /// API key
    /// ⚠️ NEVER log this value
    api_key: String,

    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl HttpApiClient {
    /// Create a client with the default timeout
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the key is empty
    /// - `Error::Http` if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(Error::config("API key cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    /// # API Call
    ///
    /// ```http
    /// GET /health
    /// ```
    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint("/health"))
            .send()
            .await
            .map_err(|e| Error::http(format!("Health request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::health_check(format!(
                "API returned status {}",
                status.as_u16()
            )));
        }

        debug!("API at {} is healthy", self.base_url);
        Ok(())
    }

    /// # API Call
    ///
    /// ```http
    /// POST /knock
    /// X-Api-Key: <key>
    /// Content-Type: application/json
    ///
    /// {"ip_address": "203.0.113.7", "ttl": 600}
    /// ```
    async fn knock(&self, ip: Option<&str>, ttl_seconds: i64) -> Result<KnockResponse> {
        let body = KnockRequest::new(ip, ttl_seconds);

        let response = self
            .client
            .post(self.endpoint("/knock"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::http(format!("Knock request failed: {}", e)))?;

        let status = response.status();
        // The body of an error response is not echoed: proxies answer with
        // whole HTML pages, and the error text ends up in event entries.
        if status != reqwest::StatusCode::OK {
            return Err(match status.as_u16() {
                401 | 403 => Error::api(format!(
                    "Authentication failed: invalid API key. Status: {}",
                    status.as_u16()
                )),
                code => Error::api(format!("knock failed with status {}", code)),
            });
        }

        let knock: KnockResponse = response
            .json()
            .await
            .map_err(|e| Error::api(format!("Invalid knock response: {}", e)))?;

        debug!(
            "Knock accepted for {} ({}s)",
            knock.whitelisted_entry, knock.expires_in_seconds
        );
        Ok(knock)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
