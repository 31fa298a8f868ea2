//! # proxy-can
//!
//! A self-healing pool of free proxies for reqwest.
//!
//! Proxies are fetched from public lists, optionally probed before they are
//! added, and handed out at random according to caller preferences. Every
//! use is reported back as feedback; proxies that keep failing are evicted.
//! When nothing matches, the pool relaxes preferences or fetches more
//! proxies, within a bounded number of rounds.

pub mod config;
pub mod error;
pub mod filter;
pub mod middleware;
pub mod persistence;
pub mod policy;
pub mod pool;
pub mod proxy;
pub mod selection;
pub mod source;
pub mod store;
pub mod transport;
pub mod validation;
mod utils;

pub use config::{ProxyPoolConfig, ProxyPoolConfigBuilder};
pub use error::{Error, NoProxyReason, ProbeError, Result};
pub use filter::ProxyPreferences;
pub use middleware::ProxyPoolMiddleware;
pub use persistence::{JsonFile, Persistence};
pub use policy::{EvictionPolicy, EvictionReason};
pub use pool::{FetchSummary, PoolStats, ProxyPool, ProxyPoolBuilder};
pub use proxy::{Protocol, ProxyAddress, ProxyRecord, RawProxy};
pub use selection::Selector;
pub use source::{ProxySource, StaticSource, UrlSource};
pub use store::{AddSummary, FeedbackOutcome, ProxyStore};
pub use transport::{ProbeResponse, ProbeTransport, ReqwestTransport};
pub use validation::Validator;
