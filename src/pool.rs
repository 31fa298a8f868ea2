//! Core proxy pool implementation.

use crate::config::ProxyPoolConfig;
use crate::error::{Error, NoProxyReason, Result};
use crate::filter::ProxyPreferences;
use crate::persistence::{JsonFile, Persistence};
use crate::proxy::ProxyRecord;
use crate::selection::Selector;
use crate::source::{ProxySource, UrlSource};
use crate::store::{AddSummary, FeedbackOutcome, ProxyStore};
use crate::transport::{ProbeTransport, ReqwestTransport};
use crate::validation::Validator;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Counts reported by a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Entries returned by the sources.
    pub fetched: usize,
    /// Well-formed entries left after validation.
    pub valid: usize,
    /// New proxies added to the pool.
    pub added: usize,
    /// Entries merged into proxies already present.
    pub merged: usize,
    /// Entries repeating an address another entry of the same fetch had.
    pub duplicates: usize,
}

/// Snapshot of pool health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Proxies in the pool.
    pub total: usize,
    /// Proxies that succeeded at least once.
    pub proven: usize,
    /// Proxies never reported on.
    pub untested: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    WithPreferences,
    WithoutPreferences,
}

/// A pool of proxies that can be used for HTTP requests.
pub struct ProxyPool {
    /// Records, guarded for single-writer access.
    store: Mutex<ProxyStore>,
    /// Configuration for the pool.
    pub config: ProxyPoolConfig,
    sources: Vec<Arc<dyn ProxySource>>,
    validator: Validator,
    selector: Selector,
    persistence: Arc<dyn Persistence>,
    /// Bounds how often sources get hit.
    fetch_limiter: DefaultDirectRateLimiter,
    /// Consecutive `get_proxy` selections that came back empty.
    failed_gets_in_row: AtomicU32,
}

impl ProxyPool {
    /// Create a pool from configuration alone: URL sources, reqwest probes and
    /// a JSON data file. Fetches right away if the pool starts too small.
    pub async fn new(config: ProxyPoolConfig) -> Result<Arc<Self>> {
        Self::builder(config).build().await
    }

    /// Start building a pool with custom sources, transport or persistence.
    pub fn builder(config: ProxyPoolConfig) -> ProxyPoolBuilder {
        ProxyPoolBuilder::new(config)
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Copy of every record, in insertion order.
    pub fn snapshot(&self) -> Vec<ProxyRecord> {
        self.store.lock().records().to_vec()
    }

    /// Key of the proxy handed out last, if it is still in the pool.
    pub fn last_selected(&self) -> Option<String> {
        self.store.lock().last_selected().map(str::to_string)
    }

    /// Get statistics about the proxy pool.
    pub fn get_stats(&self) -> PoolStats {
        let store = self.store.lock();
        let records = store.records();
        PoolStats {
            total: records.len(),
            proven: records.iter().filter(|r| r.times_succeeded > 0).count(),
            untested: records.iter().filter(|r| r.attempts() == 0).count(),
        }
    }

    /// Add proxies directly, merging duplicates.
    pub fn add_proxies(&self, batch: Vec<ProxyRecord>) -> Result<AddSummary> {
        let mut store = self.store.lock();
        let summary = store.add(batch);
        self.persist(&store)?;
        Ok(summary)
    }

    /// Remove a proxy by its canonical address key.
    pub fn remove(&self, key: &str) -> Result<ProxyRecord> {
        let mut store = self.store.lock();
        let removed = store.remove(key)?;
        self.persist(&store)?;
        Ok(removed)
    }

    pub fn remove_all(&self) -> Result<()> {
        let mut store = self.store.lock();
        store.remove_all();
        self.persist(&store)
    }

    /// Get a proxy matching the configured preferences.
    pub async fn get_proxy(&self) -> Result<ProxyRecord> {
        self.get_proxy_with(&self.config.preferences).await
    }

    /// Get a proxy matching `preferences`, relaxing them or fetching more
    /// proxies when nothing matches.
    ///
    /// With `force_preferences` the pool only ever fetches and retries with the
    /// same preferences. Otherwise the first miss retries without preferences,
    /// and later misses fetch before doing so. Either way at most
    /// `max_fetch_retries` recovery rounds run per call.
    pub async fn get_proxy_with(&self, preferences: &ProxyPreferences) -> Result<ProxyRecord> {
        let any = ProxyPreferences::any();
        let mut attempt = Attempt::WithPreferences;
        let mut rounds = 0;

        loop {
            let filter = match attempt {
                Attempt::WithPreferences => preferences,
                Attempt::WithoutPreferences => &any,
            };

            let reason = match self.select(filter) {
                Ok(record) => {
                    self.failed_gets_in_row.store(0, Ordering::SeqCst);
                    debug!("Selected proxy {}", record.address);
                    return Ok(record);
                }
                Err(Error::NoProxyAvailable(reason)) => reason,
                Err(e) => return Err(e),
            };

            let failed = self.failed_gets_in_row.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.config.auto_fetch {
                return Err(Error::NoProxyAvailable(reason));
            }
            if rounds >= self.config.max_fetch_retries {
                error!(
                    "Giving up on getting a proxy after {} rounds ({}). Please check your preferences and sources.",
                    rounds, reason
                );
                return Err(Error::NoProxyAvailable(NoProxyReason::RetriesExhausted {
                    rounds,
                }));
            }
            rounds += 1;

            if self.config.force_preferences {
                if failed > 1 {
                    warn!(
                        "Failed to get proxy with preferences for the {} time in a row! Please check your preferences and sources.",
                        failed
                    );
                } else {
                    debug!("No proxy available ({}), fetching more proxies", reason);
                }
                self.fetch_proxies(true).await?;
                attempt = Attempt::WithPreferences;
                continue;
            }

            match failed {
                1 => debug!("Failed to get proxy ({}), trying without preferences", reason),
                2 => {
                    debug!("Failed to get proxy without preferences, fetching more proxies");
                    self.fetch_proxies(true).await?;
                }
                _ => {
                    warn!(
                        "Failed to get proxy without preferences for the {} time in a row! Please check your preferences and sources.",
                        failed
                    );
                    self.fetch_proxies(true).await?;
                }
            }
            attempt = Attempt::WithoutPreferences;
        }
    }

    fn select(&self, filter: &ProxyPreferences) -> Result<ProxyRecord> {
        let mut store = self.store.lock();
        self.selector.select(&mut store, filter, &mut rand::rng())
    }

    /// Report whether the proxy handed out last worked.
    ///
    /// Does nothing if no proxy was handed out or it is already gone.
    pub fn feedback(&self, success: bool) -> FeedbackOutcome {
        let mut store = self.store.lock();
        let outcome = store.feedback(success, &self.config.eviction_policy);
        self.settle_feedback(&store, &outcome);
        outcome
    }

    /// Report whether a request through the proxy with `key` worked.
    pub fn feedback_for(&self, key: &str, success: bool) -> FeedbackOutcome {
        let mut store = self.store.lock();
        let outcome = store.feedback_for(key, success, &self.config.eviction_policy);
        self.settle_feedback(&store, &outcome);
        outcome
    }

    fn settle_feedback(&self, store: &ProxyStore, outcome: &FeedbackOutcome) {
        match outcome {
            FeedbackOutcome::Ignored => {
                debug!("No selected proxy to give feedback on");
                return;
            }
            FeedbackOutcome::Evicted(record, reason) => {
                info!(
                    "Removing proxy {} due to {}. f:{} s:{} f_in_row:{}",
                    record.address,
                    reason,
                    record.times_failed,
                    record.times_succeeded,
                    record.times_failed_in_row
                );
            }
            FeedbackOutcome::Recorded(_) => {}
        }
        if let Err(e) = self.persist(store) {
            warn!("Failed to persist proxy pool: {}", e);
        }
    }

    /// Fetch from the configured sources and merge the results into the pool.
    pub async fn fetch_proxies(&self, test_before_add: bool) -> Result<FetchSummary> {
        self.fetch_from(&self.sources, test_before_add).await
    }

    /// Fetch from `sources` instead of the configured ones.
    ///
    /// Failing sources and malformed entries are logged and skipped. With
    /// `test_before_add`, only proxies passing a probe are added.
    pub async fn fetch_from(
        &self,
        sources: &[Arc<dyn ProxySource>],
        test_before_add: bool,
    ) -> Result<FetchSummary> {
        self.fetch_limiter.until_ready().await;
        info!("Fetching proxies from {} sources", sources.len());

        let mut raw = Vec::new();
        for source in sources {
            match source.fetch().await {
                Ok(found) => {
                    info!("Fetched {} proxies from {}", found.len(), source.name());
                    raw.extend(found);
                }
                Err(e) => {
                    warn!("Failed to fetch proxies from {}: {}", source.name(), e);
                }
            }
        }

        let fetched = raw.len();
        let mut candidates = Vec::with_capacity(fetched);
        for proxy in raw {
            match proxy.into_record(self.config.default_protocol) {
                Ok(record) => candidates.push(record),
                Err(e) => debug!("Dropping proxy entry: {}", e),
            }
        }
        if candidates.len() < fetched {
            warn!("Dropped {} malformed proxy entries", fetched - candidates.len());
        }

        let mut seen = HashSet::with_capacity(candidates.len());
        let duplicates = candidates.iter().filter(|r| !seen.insert(r.key())).count();
        if duplicates > 0 {
            info!("Found {} duplicate proxies across sources", duplicates);
        }

        if test_before_add {
            candidates = self
                .validator
                .validate(candidates, self.config.concurrency_limit, self.config.max_proxies)
                .await;
        }
        let valid = candidates.len();

        let summary = {
            let mut store = self.store.lock();
            let summary = store.add(candidates);
            self.persist(&store)?;
            summary
        };
        info!(
            "Proxy pool status update: {} added, {} merged, {} in pool",
            summary.added,
            summary.merged,
            self.len()
        );

        Ok(FetchSummary {
            fetched,
            valid,
            added: summary.added,
            merged: summary.merged,
            duplicates,
        })
    }

    /// Probe `batch` with the pool's validator; the pool itself is untouched.
    pub async fn validate(
        &self,
        batch: Vec<ProxyRecord>,
        concurrency_limit: usize,
        cap: Option<usize>,
    ) -> Vec<ProxyRecord> {
        self.validator.validate(batch, concurrency_limit, cap).await
    }

    fn persist(&self, store: &ProxyStore) -> Result<()> {
        if let Some(path) = &self.config.data_file {
            self.persistence.save(path, store.records())?;
        }
        Ok(())
    }
}

/// Assembles a [`ProxyPool`] from its collaborators.
pub struct ProxyPoolBuilder {
    config: ProxyPoolConfig,
    sources: Vec<Arc<dyn ProxySource>>,
    transport: Option<Arc<dyn ProbeTransport>>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl ProxyPoolBuilder {
    fn new(config: ProxyPoolConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            transport: None,
            persistence: None,
        }
    }

    /// Add a source on top of the URLs in the configuration.
    pub fn source(mut self, source: impl ProxySource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Probe through this transport instead of reqwest.
    pub fn transport(mut self, transport: impl ProbeTransport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Store the pool with this backend instead of JSON.
    pub fn persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Some(Arc::new(persistence));
        self
    }

    /// Load saved proxies, then fetch if the pool is below `min_proxies`.
    pub async fn build(self) -> Result<Arc<ProxyPool>> {
        let config = self.config;
        let per_minute = NonZeroU32::new(config.max_fetches_per_minute).ok_or_else(|| {
            Error::InvalidConfig("max_fetches_per_minute must be at least 1".to_string())
        })?;

        let mut sources: Vec<Arc<dyn ProxySource>> = config
            .sources
            .iter()
            .map(|location| {
                Arc::new(UrlSource::new(location).with_default_protocol(config.default_protocol))
                    as Arc<dyn ProxySource>
            })
            .collect();
        sources.extend(self.sources);

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let validator = Validator::new(transport, config.check_url.clone(), config.check_timeout)
            .verify_origin(config.verify_origin)
            .probe_protocols(config.probe_protocols.iter().copied());
        let persistence = self.persistence.unwrap_or_else(|| Arc::new(JsonFile));

        let mut store = ProxyStore::new();
        if let Some(path) = &config.data_file {
            match persistence.load(path) {
                Ok(records) => {
                    let loaded = store.add(records);
                    info!("Loaded {} proxies from {}", loaded.added, path.display());
                }
                Err(e) => warn!(
                    "Could not load proxies from {}, starting empty: {}",
                    path.display(),
                    e
                ),
            }
        }

        let pool = Arc::new(ProxyPool {
            store: Mutex::new(store),
            selector: Selector::new(config.min_proxies),
            fetch_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            failed_gets_in_row: AtomicU32::new(0),
            config,
            sources,
            validator,
            persistence,
        });

        if pool.config.auto_fetch && pool.len() < pool.config.min_proxies && !pool.sources.is_empty() {
            info!("Pool holds fewer than {} proxies, fetching", pool.config.min_proxies);
            pool.fetch_proxies(true).await?;
        }

        let stats = pool.get_stats();
        info!(
            "Initial proxy pool status: {} proxies, {} proven",
            stats.total, stats.proven
        );
        Ok(pool)
    }
}
