//! Bounded-concurrency reachability checks for candidate proxies.

use crate::proxy::{Protocol, ProxyRecord};
use crate::transport::ProbeTransport;

use futures::stream::{self, StreamExt};
use log::{debug, info};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Probes candidates once each and keeps the ones that answered.
#[derive(Clone)]
pub struct Validator {
    transport: Arc<dyn ProbeTransport>,
    check_url: String,
    timeout: Duration,
    verify_origin: bool,
    probe_protocols: HashSet<Protocol>,
}

impl Validator {
    /// Probe `check_url` through each candidate, allowing `timeout` per probe.
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        check_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            check_url: check_url.into(),
            timeout,
            verify_origin: false,
            probe_protocols: [Protocol::Http, Protocol::Https, Protocol::Socks5]
                .into_iter()
                .collect(),
        }
    }

    /// Also require the echoed origin to be the proxy's own host.
    pub fn verify_origin(mut self, verify: bool) -> Self {
        self.verify_origin = verify;
        self
    }

    /// Protocols the transport can probe; others are treated as invalid.
    pub fn probe_protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.probe_protocols = protocols.into_iter().collect();
        self
    }

    /// Return the candidates that passed their probe, in no particular order.
    ///
    /// No more than `concurrency_limit` probes run at once. With a `cap`,
    /// probes that have not started yet are skipped once `cap` candidates
    /// are confirmed; probes already in flight still count.
    pub async fn validate(
        &self,
        mut candidates: Vec<ProxyRecord>,
        concurrency_limit: usize,
        cap: Option<usize>,
    ) -> Vec<ProxyRecord> {
        let total = candidates.len();
        if total == 0 {
            return Vec::new();
        }
        candidates.shuffle(&mut rand::rng());

        info!(
            "Validating {} proxies with up to {} concurrent probes",
            total, concurrency_limit
        );
        let start = Instant::now();
        let confirmed = AtomicUsize::new(0);

        let valid: Vec<ProxyRecord> = stream::iter(candidates)
            .map(|candidate| {
                let confirmed = &confirmed;
                async move {
                    if cap.is_some_and(|cap| confirmed.load(Ordering::SeqCst) >= cap) {
                        return None;
                    }
                    if self.check(&candidate).await {
                        confirmed.fetch_add(1, Ordering::SeqCst);
                        Some(candidate)
                    } else {
                        None
                    }
                }
            })
            .buffer_unordered(concurrency_limit.max(1))
            .filter_map(|result| async move { result })
            .collect()
            .await;

        info!(
            "Validation completed: {}/{} valid in {:.1}s",
            valid.len(),
            total,
            start.elapsed().as_secs_f64()
        );
        valid
    }

    async fn check(&self, candidate: &ProxyRecord) -> bool {
        let address = &candidate.address;
        if !self.probe_protocols.contains(&address.protocol()) {
            debug!("Skipping {}: protocol not probed", address);
            return false;
        }

        let probe = self.transport.probe(&self.check_url, address, self.timeout);
        let response = match tokio::time::timeout(self.timeout, probe).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!("Probe through {} failed: {}", address, e);
                return false;
            }
            Err(_) => {
                debug!("Probe through {} timed out", address);
                return false;
            }
        };

        if !response.is_success() {
            debug!("Probe through {} returned status {}", address, response.status);
            return false;
        }
        if self.verify_origin {
            let echoed = response.origin.as_deref().unwrap_or_default();
            let host = address.host().trim_start_matches('[').trim_end_matches(']');
            if !echoed.split(',').any(|origin| origin.trim() == host) {
                debug!("Proxy {} echoed foreign origin {:?}", address, echoed);
                return false;
            }
        }
        debug!("Valid: {}", address);
        true
    }
}
