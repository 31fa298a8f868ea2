//! Error types for the proxy-can crate.

use std::fmt;
use thiserror::Error;

/// Why a selection came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoProxyReason {
    /// The pool holds fewer proxies than the configured minimum.
    BelowMinimum { available: usize, minimum: usize },
    /// No proxy in the pool matches the active preferences.
    NoMatch,
    /// The fallback cascade gave up after this many fetch rounds.
    RetriesExhausted { rounds: u32 },
}

impl fmt::Display for NoProxyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoProxyReason::BelowMinimum { available, minimum } => write!(
                f,
                "only {} proxies in pool, at least {} required",
                available, minimum
            ),
            NoProxyReason::NoMatch => write!(f, "no proxy matches the given preferences"),
            NoProxyReason::RetriesExhausted { rounds } => {
                write!(f, "gave up after {} fetch rounds", rounds)
            }
        }
    }
}

/// Errors returned by the proxy pool.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No proxy available in pool: {0}")]
    NoProxyAvailable(NoProxyReason),

    #[error("Invalid protocol: {0} (expected http, https, socks4 or socks5)")]
    InvalidProtocol(String),

    #[error("Invalid proxy address: {0}")]
    InvalidAddress(String),

    #[error("Proxy not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source {name} failed: {message}")]
    Source { name: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true when the error means "nothing to hand out" rather than a fault.
    pub fn is_no_proxy(&self) -> bool {
        matches!(self, Error::NoProxyAvailable(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single validation probe. The validator turns it into "invalid".
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("probe transport failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else {
            ProbeError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_proxy_display_names_reason() {
        let err = Error::NoProxyAvailable(NoProxyReason::BelowMinimum {
            available: 1,
            minimum: 3,
        });
        assert!(err.is_no_proxy());
        assert_eq!(
            err.to_string(),
            "No proxy available in pool: only 1 proxies in pool, at least 3 required"
        );
    }

    #[test]
    fn test_config_errors_are_not_no_proxy() {
        assert!(!Error::InvalidProtocol("ftp".into()).is_no_proxy());
        assert!(!Error::NotFound("http://1.2.3.4:80".into()).is_no_proxy());
    }
}
