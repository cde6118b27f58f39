// # Public IP Resolver Trait
//
// Defines the interface for discovering this host's public address through
// an external "what is my IP" endpoint.
//
// ## Implementations
//
// - Plain-text HTTP: `knocker-ip-http` crate
//
// ## Usage
//
// ```rust,ignore
// use knocker_core::IpResolver;
//
// let resolver = /* IpResolver implementation */;
// let ip = resolver.public_ip("https://api.ipify.org").await?;
// ```

use async_trait::async_trait;

/// Trait for public IP resolver implementations
///
/// # Trust Level: Semi-Trusted
///
/// Resolvers perform a single lookup per call and hold no state. Deciding
/// whether the address changed, and what to do about it, belongs to the
/// orchestrator.
#[async_trait]
pub trait IpResolver: Send + Sync {
    /// Resolve the current public IP using the given endpoint
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The address, trimmed of surrounding whitespace
    /// - `Err(Error)`: If the lookup failed or returned nothing usable
    async fn public_ip(&self, url: &str) -> Result<String, crate::Error>;
}
