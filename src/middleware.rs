//! Middleware implementation for reqwest.

use crate::config::ProxyPoolConfig;
use crate::pool::ProxyPool;

use anyhow::anyhow;
use async_trait::async_trait;
use log::{info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;

/// Middleware that sends each request through a proxy from the pool and
/// reports the outcome back to it.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy pool.
    pool: Arc<ProxyPool>,
}

impl ProxyPoolMiddleware {
    /// Create a new proxy pool middleware with the given configuration.
    /// This loads saved proxies and fetches more if the pool starts too small.
    pub async fn new(config: ProxyPoolConfig) -> Result<Self> {
        let pool = ProxyPool::new(config)
            .await
            .map_err(|e| Error::Middleware(anyhow!(e)))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Arc<ProxyPool>) -> Self {
        let stats = pool.get_stats();
        info!(
            "Proxy pool middleware ready with {} proxies ({} proven)",
            stats.total, stats.proven
        );
        if stats.total == 0 {
            warn!("No proxies available in pool");
        }
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let max_retries = self.pool.config.retry_count;
        let mut retry_count = 0;

        loop {
            let proxy = match self.pool.get_proxy().await {
                Ok(proxy) => proxy,
                Err(e) => {
                    let stats = self.pool.get_stats();
                    warn!("No proxy available. Total: {}, Proven: {}", stats.total, stats.proven);
                    return Err(Error::Middleware(anyhow!(e)));
                }
            };

            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                        .to_string()
                ))
            })?;

            let key = proxy.key();
            info!("Using proxy: {} (attempt {})", key, retry_count + 1);

            let client = match proxy.address.to_reqwest_proxy().and_then(|p| {
                reqwest::Client::builder()
                    .proxy(p)
                    .timeout(self.pool.config.check_timeout)
                    .build()
            }) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Failed to build client with proxy {}: {}", key, e);
                    self.pool.feedback_for(&key, false);
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(e));
                    }
                    continue;
                }
            };

            match client.execute(proxied_request).await {
                Ok(response) if !response.status().is_server_error() => {
                    self.pool.feedback_for(&key, true);
                    return Ok(response);
                }
                Ok(response) => {
                    warn!(
                        "Proxy {} returned {} (attempt {})",
                        key,
                        response.status(),
                        retry_count + 1
                    );
                    self.pool.feedback_for(&key, false);
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Ok(response);
                    }
                }
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        key,
                        retry_count + 1,
                        err
                    );
                    self.pool.feedback_for(&key, false);
                    retry_count += 1;
                    if retry_count > max_retries {
                        return Err(Error::Reqwest(err));
                    }
                }
            }
        }
    }
}
