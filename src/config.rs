//! Configuration for the proxy pool.

use crate::error::{Error, Result};
use crate::filter::ProxyPreferences;
use crate::policy::EvictionPolicy;
use crate::proxy::Protocol;

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Source URLs or file paths to fetch proxy lists from.
    pub sources: Vec<String>,
    /// Protocol assumed for bare `host:port` entries in sources.
    pub default_protocol: Protocol,
    /// File the pool is persisted to, if any.
    pub data_file: Option<PathBuf>,
    /// Preferences applied by `get_proxy`.
    pub preferences: ProxyPreferences,
    /// Never fall back to ignoring preferences; fetch more instead.
    pub force_preferences: bool,
    /// Fetch from sources when the pool runs dry.
    pub auto_fetch: bool,
    /// When proxies get evicted.
    pub eviction_policy: EvictionPolicy,
    /// Stop validating once this many proxies passed.
    pub max_proxies: Option<usize>,
    /// Pools smaller than this hand out nothing.
    pub min_proxies: usize,
    /// Maximum number of probes in flight during validation.
    pub concurrency_limit: usize,
    /// URL used for validation probes.
    pub check_url: String,
    /// Timeout for a single validation probe.
    pub check_timeout: Duration,
    /// Require the check endpoint to echo the proxy's own address.
    pub verify_origin: bool,
    /// Protocols the validator probes; the rest fail validation.
    pub probe_protocols: Vec<Protocol>,
    /// Recovery rounds (relaxing preferences or fetching) one `get_proxy` call may run.
    pub max_fetch_retries: u32,
    /// Number of times the middleware retries a request with different proxies.
    pub retry_count: usize,
    /// Upper bound on fetches from sources per minute.
    pub max_fetches_per_minute: u32,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().assemble(EvictionPolicy::default(), ProxyPreferences::any())
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    sources: Vec<String>,
    default_protocol: Option<Protocol>,
    data_file: Option<PathBuf>,
    preferences: Option<ProxyPreferences>,
    preferred_protocol_tags: Vec<String>,
    force_preferences: Option<bool>,
    auto_fetch: Option<bool>,
    allowed_fails_in_row: Option<u32>,
    fails_without_check: Option<u32>,
    percent_failed_to_remove: Option<f64>,
    max_proxies: Option<Option<usize>>,
    min_proxies: Option<usize>,
    concurrency_limit: Option<usize>,
    check_url: Option<String>,
    check_timeout: Option<Duration>,
    verify_origin: Option<bool>,
    probe_protocols: Option<Vec<Protocol>>,
    max_fetch_retries: Option<u32>,
    retry_count: Option<usize>,
    max_fetches_per_minute: Option<u32>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            default_protocol: None,
            data_file: None,
            preferences: None,
            preferred_protocol_tags: Vec::new(),
            force_preferences: None,
            auto_fetch: None,
            allowed_fails_in_row: None,
            fails_without_check: None,
            percent_failed_to_remove: None,
            max_proxies: None,
            min_proxies: None,
            concurrency_limit: None,
            check_url: None,
            check_timeout: None,
            verify_origin: None,
            probe_protocols: None,
            max_fetch_retries: None,
            retry_count: None,
            max_fetches_per_minute: None,
        }
    }

    /// Set the source URLs or file paths to fetch proxy lists from.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the protocol assumed for bare `host:port` source entries.
    pub fn default_protocol(mut self, protocol: Protocol) -> Self {
        self.default_protocol = Some(protocol);
        self
    }

    /// Persist the pool to this JSON file.
    pub fn data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = Some(path.into());
        self
    }

    /// Set the preferences `get_proxy` selects with.
    pub fn preferences(mut self, preferences: ProxyPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Add preferred protocols by tag; unknown tags make `build` fail.
    pub fn preferred_protocols(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.preferred_protocol_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Never ignore preferences when nothing matches.
    pub fn force_preferences(mut self, force: bool) -> Self {
        self.force_preferences = Some(force);
        self
    }

    /// Fetch from sources automatically when the pool runs dry.
    pub fn auto_fetch(mut self, enabled: bool) -> Self {
        self.auto_fetch = Some(enabled);
        self
    }

    /// Set how many failures in a row a proxy survives.
    pub fn allowed_fails_in_row(mut self, count: u32) -> Self {
        self.allowed_fails_in_row = Some(count);
        self
    }

    /// Set how many failures are needed before the failure ratio is checked.
    pub fn fails_without_check(mut self, count: u32) -> Self {
        self.fails_without_check = Some(count);
        self
    }

    /// Set the failure ratio, in `[0, 1]`, above which a proxy is evicted.
    pub fn percent_failed_to_remove(mut self, ratio: f64) -> Self {
        self.percent_failed_to_remove = Some(ratio);
        self
    }

    /// Stop validating once this many proxies passed; `None` validates all.
    pub fn max_proxies(mut self, count: Option<usize>) -> Self {
        self.max_proxies = Some(count);
        self
    }

    /// Set the minimum number of proxies the pool needs to hand one out.
    pub fn min_proxies(mut self, count: usize) -> Self {
        self.min_proxies = Some(count);
        self
    }

    /// Set the maximum number of concurrent validation probes.
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    /// Set the URL used for validation probes.
    pub fn check_url(mut self, url: impl Into<String>) -> Self {
        self.check_url = Some(url.into());
        self
    }

    /// Set the timeout for validation probes.
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = Some(timeout);
        self
    }

    /// Require the check endpoint to echo the proxy's address.
    pub fn verify_origin(mut self, verify: bool) -> Self {
        self.verify_origin = Some(verify);
        self
    }

    /// Set which protocols get probed during validation.
    pub fn probe_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.probe_protocols = Some(protocols);
        self
    }

    /// Set how many recovery rounds one `get_proxy` call may run.
    pub fn max_fetch_retries(mut self, count: u32) -> Self {
        self.max_fetch_retries = Some(count);
        self
    }

    /// Set the number of times to retry a request with different proxies.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Limit how often sources are fetched.
    pub fn max_fetches_per_minute(mut self, count: u32) -> Self {
        self.max_fetches_per_minute = Some(count);
        self
    }

    /// Build the configuration.
    pub fn build(mut self) -> Result<ProxyPoolConfig> {
        let defaults = EvictionPolicy::default();
        let policy = EvictionPolicy::new(
            self.allowed_fails_in_row
                .unwrap_or(defaults.allowed_fails_in_row()),
            self.fails_without_check
                .unwrap_or(defaults.fails_without_check()),
            self.percent_failed_to_remove
                .unwrap_or(defaults.percent_failed_to_remove()),
        )?;

        if self.max_fetches_per_minute == Some(0) {
            return Err(Error::InvalidConfig(
                "max_fetches_per_minute must be at least 1".to_string(),
            ));
        }

        let tags = ProxyPreferences::protocols_from_tags(&self.preferred_protocol_tags)?;
        let preferences = self
            .preferences
            .take()
            .unwrap_or_default()
            .protocols(tags);

        Ok(self.assemble(policy, preferences))
    }

    fn assemble(self, eviction_policy: EvictionPolicy, preferences: ProxyPreferences) -> ProxyPoolConfig {
        ProxyPoolConfig {
            sources: self.sources,
            default_protocol: self.default_protocol.unwrap_or(Protocol::Http),
            data_file: self.data_file,
            preferences,
            force_preferences: self.force_preferences.unwrap_or(false),
            auto_fetch: self.auto_fetch.unwrap_or(true),
            eviction_policy,
            max_proxies: self.max_proxies.unwrap_or(Some(10)),
            min_proxies: self.min_proxies.unwrap_or(1),
            concurrency_limit: self.concurrency_limit.unwrap_or(200).max(1),
            check_url: self.check_url.unwrap_or_else(|| "https://httpbin.org/ip".to_string()),
            check_timeout: self.check_timeout.unwrap_or(Duration::from_secs(20)),
            verify_origin: self.verify_origin.unwrap_or(false),
            probe_protocols: self
                .probe_protocols
                .unwrap_or_else(|| vec![Protocol::Http, Protocol::Https, Protocol::Socks5]),
            max_fetch_retries: self.max_fetch_retries.unwrap_or(5),
            retry_count: self.retry_count.unwrap_or(3),
            max_fetches_per_minute: self.max_fetches_per_minute.unwrap_or(6),
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyPoolConfig::builder().build().unwrap();
        assert_eq!(config.eviction_policy, EvictionPolicy::default());
        assert_eq!(config.max_proxies, Some(10));
        assert_eq!(config.min_proxies, 1);
        assert_eq!(config.concurrency_limit, 200);
        assert_eq!(config.max_fetch_retries, 5);
        assert!(config.auto_fetch);
        assert!(!config.force_preferences);
        assert!(config.preferences.is_empty());
        assert_eq!(config.check_url, "https://httpbin.org/ip");
    }

    #[test]
    fn test_unknown_protocol_fails_fast() {
        let result = ProxyPoolConfig::builder()
            .preferred_protocols(vec!["http", "telnet"])
            .build();
        assert!(matches!(result, Err(Error::InvalidProtocol(tag)) if tag == "telnet"));
    }

    #[test]
    fn test_preferred_protocols_join_preferences() {
        let config = ProxyPoolConfig::builder()
            .preferences(ProxyPreferences::any().countries(["US"]))
            .preferred_protocols(vec!["socks5"])
            .build()
            .unwrap();
        let expected = ProxyPreferences::any()
            .countries(["US"])
            .protocols([Protocol::Socks5]);
        assert_eq!(config.preferences, expected);
    }

    #[test]
    fn test_invalid_limits() {
        assert!(matches!(
            ProxyPoolConfig::builder().percent_failed_to_remove(-0.1).build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            ProxyPoolConfig::builder().max_fetches_per_minute(0).build(),
            Err(Error::InvalidConfig(_))
        ));
    }
}
