//! Manifest discovery.
//!
//! Probes `https://{domain}/ia.json`, then `https://{domain}/.well-known/ia.json`.
//! Only a bare 404 at the first location moves on to the second; any other
//! error status, transport failure or oversized body ends discovery. Nothing
//! here retries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{ClientConfig, MAX_MANIFEST_BYTES};
use crate::error::{DiscoveryError, IaJsonResult};
use crate::manifest::Manifest;
use crate::transport::{HttpMethod, HttpRequest, Transport, TransportError};

/// Locations probed, in order.
pub const DISCOVERY_PATHS: [&str; 2] = ["/ia.json", "/.well-known/ia.json"];

/// Reduce user input (`https://Shop.example/path?x=1`) to a bare host.
pub fn normalize_domain(input: &str) -> Result<String, DiscoveryError> {
    let trimmed = input.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if host.is_empty() {
        return Err(DiscoveryError::InvalidDomain {
            input: input.to_string(),
        });
    }
    Ok(host)
}

/// Candidate manifest URLs for a normalized domain.
pub fn discovery_urls(domain: &str) -> [String; 2] {
    DISCOVERY_PATHS.map(|path| format!("https://{}{}", domain, path))
}

/// Fetches and validates manifests.
#[derive(Debug, Clone)]
pub struct Discoverer {
    transport: Arc<dyn Transport>,
    timeout: Duration,
    max_bytes: usize,
}

impl Discoverer {
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            timeout: config.discovery_timeout(),
            max_bytes: config.manifest_limit(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, limit: usize) -> Self {
        self.max_bytes = limit.min(MAX_MANIFEST_BYTES);
        self
    }

    /// Discover the manifest for `domain`.
    pub async fn discover(&self, domain: &str) -> IaJsonResult<Manifest> {
        let domain = normalize_domain(domain)?;
        let urls = discovery_urls(&domain);
        let mut attempted = Vec::with_capacity(urls.len());

        for (idx, url) in urls.iter().enumerate() {
            attempted.push(url.clone());
            let is_fallback = idx > 0;
            debug!(url = %url, fallback = is_fallback, "probing for ia.json");

            let request = HttpRequest::new(HttpMethod::Get, url, self.timeout)
                .header("Accept", "application/json")
                .max_body_bytes(self.max_bytes);

            let response = match self.transport.send(request).await {
                Ok(response) => response,
                Err(TransportError::BodyTooLarge { limit, .. }) => {
                    return Err(DiscoveryError::FileTooLarge {
                        url: url.clone(),
                        limit,
                    }
                    .into());
                }
                Err(e) => return Err(e.into()),
            };

            if response.status == 404 {
                debug!(url = %url, "ia.json not found at location");
                continue;
            }

            if !response.is_success() {
                if is_fallback {
                    debug!(url = %url, status = response.status, "fallback location failed");
                    break;
                }
                return Err(DiscoveryError::Http {
                    url: url.clone(),
                    status: response.status,
                }
                .into());
            }

            if response.body.len() > self.max_bytes {
                return Err(DiscoveryError::FileTooLarge {
                    url: url.clone(),
                    limit: self.max_bytes,
                }
                .into());
            }

            let manifest = Manifest::from_slice(&response.body, url)?;
            info!(
                domain = %domain,
                url = %url,
                site = %manifest.site.name,
                version = %manifest.version,
                "discovered ia.json"
            );
            return Ok(manifest);
        }

        Err(DiscoveryError::NotFound { domain, attempted }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("shop.example").unwrap(), "shop.example");
        assert_eq!(
            normalize_domain("https://Shop.Example/products?q=1").unwrap(),
            "shop.example"
        );
        assert_eq!(normalize_domain("shop.example.").unwrap(), "shop.example");
        assert_eq!(
            normalize_domain("  http://shop.example:8443#frag ").unwrap(),
            "shop.example:8443"
        );
    }

    #[test]
    fn test_normalize_domain_rejects_empty() {
        for input in ["", "   ", "https://", "https:///ia.json", "."] {
            assert!(
                matches!(
                    normalize_domain(input),
                    Err(DiscoveryError::InvalidDomain { .. })
                ),
                "expected InvalidDomain for {input:?}"
            );
        }
    }

    #[test]
    fn test_discovery_urls_order() {
        let urls = discovery_urls("shop.example");
        assert_eq!(urls[0], "https://shop.example/ia.json");
        assert_eq!(urls[1], "https://shop.example/.well-known/ia.json");
    }
}
