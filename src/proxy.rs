//! Proxy lookup for profiles that reference a proxy by id.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::{ProxyConfig, ProxyType};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy not found: {0}")]
    NotFound(String),

    #[error("proxy {id} is invalid: {reason}")]
    Invalid { id: String, reason: String },

    /// Failure inside a resolver backend.
    #[error("proxy lookup failed: {0}")]
    Backend(String),
}

/// Turns a proxy id into the `--proxy-server` URL handed to the browser.
#[async_trait]
pub trait ProxyResolver: Send + Sync {
    async fn resolve_proxy_url(&self, proxy_id: &str) -> Result<String, ProxyError>;
}

/// Resolver backed by a fixed table of [`ProxyConfig`]s.
#[derive(Debug, Default)]
pub struct StaticProxyResolver {
    proxies: RwLock<HashMap<String, ProxyConfig>>,
}

impl StaticProxyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proxy(self, id: impl Into<String>, proxy: ProxyConfig) -> Self {
        self.insert(id, proxy);
        self
    }

    pub fn insert(&self, id: impl Into<String>, proxy: ProxyConfig) {
        self.proxies.write().insert(id.into(), proxy);
    }

    pub fn remove(&self, id: &str) -> Option<ProxyConfig> {
        self.proxies.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.proxies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.read().is_empty()
    }

    /// Adds every proxy of a newline-separated list and returns their new ids.
    ///
    /// Blank lines and `#` comments are skipped, as are lines
    /// [`ProxyConfig::parse_line`] rejects.
    pub fn import_text(&self, text: &str, default_type: ProxyType) -> Vec<String> {
        let mut ids = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match ProxyConfig::parse_line(line, default_type) {
                Ok(proxy) => {
                    let id = Uuid::new_v4().to_string();
                    self.insert(id.clone(), proxy);
                    ids.push(id);
                }
                Err(e) => debug!(line = number + 1, error = %e, "Skipping proxy line"),
            }
        }
        ids
    }
}

#[async_trait]
impl ProxyResolver for StaticProxyResolver {
    async fn resolve_proxy_url(&self, proxy_id: &str) -> Result<String, ProxyError> {
        let proxy = self
            .proxies
            .read()
            .get(proxy_id)
            .cloned()
            .ok_or_else(|| ProxyError::NotFound(proxy_id.to_string()))?;

        proxy.validate().map_err(|e| ProxyError::Invalid {
            id: proxy_id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(proxy.to_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolves_configured_proxy() {
        let resolver = StaticProxyResolver::new().with_proxy(
            "p1",
            ProxyConfig::new("10.0.0.1", 1080).with_type(ProxyType::Socks5),
        );
        assert_eq!(
            resolver.resolve_proxy_url("p1").await.unwrap(),
            "socks5://10.0.0.1:1080"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_proxies_fail() {
        let resolver = StaticProxyResolver::new().with_proxy("bad", ProxyConfig::new("", 8080));

        assert!(matches!(
            resolver.resolve_proxy_url("missing").await,
            Err(ProxyError::NotFound(_))
        ));
        assert!(matches!(
            resolver.resolve_proxy_url("bad").await,
            Err(ProxyError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_text() {
        let resolver = StaticProxyResolver::new();
        let text = "\
# office exits
socks5://u:p@10.0.0.1:1080

10.0.0.2:8080
10.0.0.3:8080:alice:pw
not a proxy
10.0.0.4:0
";
        let ids = resolver.import_text(text, ProxyType::Https);

        assert_eq!(ids.len(), 3);
        assert_eq!(resolver.len(), 3);
        assert_eq!(
            resolver.resolve_proxy_url(&ids[0]).await.unwrap(),
            "socks5://u:p@10.0.0.1:1080"
        );
        assert_eq!(
            resolver.resolve_proxy_url(&ids[1]).await.unwrap(),
            "https://10.0.0.2:8080"
        );
        assert_eq!(
            resolver.resolve_proxy_url(&ids[2]).await.unwrap(),
            "https://alice:pw@10.0.0.3:8080"
        );
    }

    #[test]
    fn test_import_nothing_usable() {
        let resolver = StaticProxyResolver::new();
        assert!(resolver.import_text("# only comments\n\n   \n", ProxyType::Http).is_empty());
        assert!(resolver.is_empty());
    }
}
