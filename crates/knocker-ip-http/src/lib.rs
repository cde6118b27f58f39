// # HTTP IP Resolver
//
// This crate provides a plain-text HTTP implementation of `IpResolver`.
//
// ## Purpose
//
// Change-detection mode asks an external "what is my IP" service for the
// host's public address every check interval. Any endpoint that answers
// `GET` with the bare address in the body works (api.ipify.org,
// ifconfig.me/ip, icanhazip.com).
//
// ## Architecture
//
// One request per call, no caching and no background polling: the
// orchestrator owns the schedule and the comparison with the last address.

use knocker_core::traits::IpResolver;
use knocker_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Default HTTP timeout for lookups
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based public IP resolver
#[derive(Debug, Clone)]
pub struct HttpIpResolver {
    client: reqwest::Client,
}

impl HttpIpResolver {
    /// Create a resolver with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a resolver with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

/// Longest slice of an unparseable body quoted in an error
const MAX_QUOTED_BODY: usize = 64;

/// Validate a resolver response body
fn parse_ip(body: &str) -> Result<String> {
    let ip_text = body.trim();
    if ip_text.is_empty() {
        return Err(Error::ip_lookup("empty response"));
    }

    let ip: IpAddr = ip_text
        .parse()
        .map_err(|_| Error::ip_lookup(format!("Invalid IP address: {}", quote(ip_text))))?;

    Ok(ip.to_string())
}

fn quote(text: &str) -> String {
    match text.char_indices().nth(MAX_QUOTED_BODY) {
        Some((cut, _)) => format!("{}... ({} bytes)", &text[..cut], text.len()),
        None => text.to_string(),
    }
}

#[async_trait::async_trait]
impl IpResolver for HttpIpResolver {
    async fn public_ip(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::ip_lookup(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ip_lookup(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::ip_lookup(format!("Failed to read response: {}", e)))?;

        let ip = parse_ip(&body)?;
        tracing::debug!("Resolved public IP {} via {}", ip, url);
        Ok(ip)
    }
}
