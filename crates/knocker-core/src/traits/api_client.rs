// # Whitelist API Client Trait
//
// Defines the interface for talking to the remote access-control API.
//
// ## Implementations
//
// - HTTP/JSON: `knocker-api-http` crate
//
// ## Wire Contract
//
// ```http
// GET  {api_url}/health                 -> 200 OK
// POST {api_url}/knock                  (X-Api-Key: <key>)
//      {"ip_address": "1.2.3.4", "ttl": 600}
//   <- {"whitelisted_entry": "1.2.3.4", "expires_at": 1700000600, "expires_in_seconds": 600}
// ```
//
// Both request fields are optional: an absent `ip_address` lets the API infer
// the caller from the connection, an absent `ttl` selects the server default.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Successful knock response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnockResponse {
    /// The address (or CIDR entry) the API whitelisted
    #[serde(default)]
    pub whitelisted_entry: String,
    /// Unix timestamp at which the grant lapses (0 = unknown)
    #[serde(default)]
    pub expires_at: i64,
    /// Granted TTL in seconds (0 = unknown)
    #[serde(default)]
    pub expires_in_seconds: i64,
}

/// Knock request body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnockRequest {
    /// Address to whitelist; omitted to let the API infer it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Requested TTL; omitted to use the server default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

impl KnockRequest {
    /// Build a request body, dropping empty IPs and non-positive TTLs
    pub fn new(ip: Option<&str>, ttl_seconds: i64) -> Self {
        Self {
            ip_address: ip.filter(|ip| !ip.is_empty()).map(str::to_string),
            ttl: (ttl_seconds > 0).then_some(ttl_seconds),
        }
    }
}

/// Trait for whitelist API client implementations
///
/// # Trust Level: Untrusted
///
/// Clients are single-shot: one HTTP request per call, bounded by a request
/// timeout, no retries and no background tasks. A failed knock is simply
/// retried by the orchestrator on its next tick.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Verify the API endpoint is reachable and healthy
    async fn health_check(&self) -> Result<(), crate::Error>;

    /// Ask the API to whitelist an address
    ///
    /// # Parameters
    ///
    /// - `ip`: Address to whitelist, `None` to let the API infer it
    /// - `ttl_seconds`: Requested TTL, `<= 0` for the server default
    async fn knock(&self, ip: Option<&str>, ttl_seconds: i64)
    -> Result<KnockResponse, crate::Error>;

    /// Base URL of the API (used as error context)
    fn base_url(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_optional_fields() {
        let body = serde_json::to_value(KnockRequest::new(None, 0)).unwrap();
        assert_eq!(body, serde_json::json!({}));

        let body = serde_json::to_value(KnockRequest::new(Some(""), -5)).unwrap();
        assert_eq!(body, serde_json::json!({}));
    }

    #[test]
    fn test_request_includes_ip_and_ttl() {
        let body = serde_json::to_value(KnockRequest::new(Some("1.2.3.4"), 600)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"ip_address": "1.2.3.4", "ttl": 600})
        );
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let response: KnockResponse =
            serde_json::from_str(r#"{"whitelisted_entry": "10.0.0.1"}"#).unwrap();
        assert_eq!(response.whitelisted_entry, "10.0.0.1");
        assert_eq!(response.expires_at, 0);
        assert_eq!(response.expires_in_seconds, 0);
    }
}
