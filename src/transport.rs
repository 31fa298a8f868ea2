//! Transport used to probe a proxy.

use crate::error::ProbeError;
use crate::proxy::ProxyAddress;

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// What came back from one probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code of the response.
    pub status: u16,
    /// Origin address echoed by the check endpoint, if it reported one.
    pub origin: Option<String>,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request through a proxy.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// GET `target` through `proxy`, giving up after `timeout`.
    async fn probe(
        &self,
        target: &str,
        proxy: &ProxyAddress,
        timeout: Duration,
    ) -> Result<ProbeResponse, ProbeError>;
}

#[derive(Deserialize)]
struct OriginEcho {
    origin: String,
}

/// Probes through a reqwest client built per candidate.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport;

impl ReqwestTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeTransport for ReqwestTransport {
    async fn probe(
        &self,
        target: &str,
        proxy: &ProxyAddress,
        timeout: Duration,
    ) -> Result<ProbeResponse, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .proxy(proxy.to_reqwest_proxy()?)
            .build()?;

        let response = client.get(target).send().await?;
        let status = response.status().as_u16();
        let origin = response
            .json::<OriginEcho>()
            .await
            .ok()
            .map(|echo| echo.origin);

        Ok(ProbeResponse { status, origin })
    }
}
