//! Feeds the pool fetches raw proxies from.

use crate::error::{Error, Result};
use crate::proxy::{Protocol, RawProxy};
use crate::utils;

use async_trait::async_trait;
use log::debug;

/// Something that yields candidate proxies on demand.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Download the current list.
    async fn fetch(&self) -> Result<Vec<RawProxy>>;
}

/// A proxy list at a URL or a local file path.
///
/// The body may be a JSON list (proxifly/proxyscrape style) or plain text
/// with one address per line.
#[derive(Debug, Clone)]
pub struct UrlSource {
    location: String,
    default_protocol: Protocol,
    client: reqwest::Client,
}

impl UrlSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            default_protocol: Protocol::Http,
            client: reqwest::Client::new(),
        }
    }

    /// Protocol assumed for bare `host:port` entries.
    pub fn with_default_protocol(mut self, protocol: Protocol) -> Self {
        self.default_protocol = protocol;
        self
    }

    async fn read(&self) -> Result<String> {
        if self.location.starts_with("http") {
            let response = self
                .client
                .get(&self.location)
                .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
                .send()
                .await?
                .error_for_status()?;
            Ok(response.text().await?)
        } else {
            Ok(tokio::fs::read_to_string(&self.location).await?)
        }
    }
}

#[async_trait]
impl ProxySource for UrlSource {
    fn name(&self) -> &str {
        &self.location
    }

    async fn fetch(&self) -> Result<Vec<RawProxy>> {
        let content = self.read().await.map_err(|e| Error::Source {
            name: self.location.clone(),
            message: e.to_string(),
        })?;
        let proxies = utils::parse_proxy_feed(&content, self.default_protocol);
        debug!("Parsed {} proxies from {}", proxies.len(), self.location);
        Ok(proxies)
    }
}

/// A fixed list, handy for seeding a pool with known proxies.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    proxies: Vec<RawProxy>,
}

impl StaticSource {
    pub fn new(proxies: Vec<RawProxy>) -> Self {
        Self { proxies }
    }
}

#[async_trait]
impl ProxySource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<RawProxy>> {
        Ok(self.proxies.clone())
    }
}
