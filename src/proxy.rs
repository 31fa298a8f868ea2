//! Proxy addresses and the records kept for them.

use crate::error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::{Host, Url};

/// Protocol spoken by a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl Protocol {
    /// All supported protocols.
    pub const ALL: [Protocol; 4] = [
        Protocol::Http,
        Protocol::Https,
        Protocol::Socks4,
        Protocol::Socks5,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            "socks4" => Ok(Protocol::Socks4),
            "socks5" => Ok(Protocol::Socks5),
            _ => Err(Error::InvalidProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized `(protocol, host, port)` triple identifying a proxy.
///
/// The canonical form `protocol://host:port` is the key the store
/// deduplicates on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyAddress {
    protocol: Protocol,
    host: String,
    port: u16,
}

impl ProxyAddress {
    /// Build an address from parts. IPv6 literals may be given with or
    /// without brackets; the stored host is always in URL form.
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> Result<Self> {
        let host: String = host.into();
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return Err(Error::InvalidAddress("missing host".to_string()));
        }
        if port == 0 {
            return Err(Error::InvalidAddress(format!("{}:0", host)));
        }

        let bracketed = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host
        };
        let host = Host::parse(&bracketed)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", bracketed, e)))?
            .to_string();
        Ok(Self { protocol, host, port })
    }

    /// Parse `scheme://host:port`, or a bare `host:port` assumed to speak `default`.
    pub fn parse_with_default(input: &str, default: Protocol) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }

        let (protocol, rest) = match input.split_once("://") {
            Some((scheme, rest)) => (scheme.parse::<Protocol>()?, rest),
            None => (default, input),
        };

        let url = Url::parse(&format!("{}://{}", protocol, rest))
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", input, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidAddress(format!("{}: missing host", input)))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidAddress(format!("{}: missing port", input)))?;

        Self::new(protocol, host, port)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Canonical URL string, used as the dedup key.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Convert the address to a reqwest::Proxy.
    pub fn to_reqwest_proxy(&self) -> std::result::Result<reqwest::Proxy, reqwest::Error> {
        reqwest::Proxy::all(self.key())
    }
}

impl FromStr for ProxyAddress {
    type Err = Error;

    /// Bare `host:port` is taken as HTTP.
    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_default(s, Protocol::Http)
    }
}

impl fmt::Display for ProxyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl TryFrom<String> for ProxyAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ProxyAddress> for String {
    fn from(address: ProxyAddress) -> Self {
        address.key()
    }
}

/// A proxy in the pool, with its reliability counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub address: ProxyAddress,
    pub country: Option<String>,
    pub anonymity: Option<String>,
    #[serde(default)]
    pub times_succeeded: u32,
    #[serde(default)]
    pub times_failed: u32,
    #[serde(default)]
    pub times_failed_in_row: u32,
}

impl ProxyRecord {
    /// Create a fresh record with zeroed counters.
    pub fn new(address: ProxyAddress) -> Self {
        Self {
            address,
            country: None,
            anonymity: None,
            times_succeeded: 0,
            times_failed: 0,
            times_failed_in_row: 0,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_anonymity(mut self, anonymity: impl Into<String>) -> Self {
        self.anonymity = Some(anonymity.into());
        self
    }

    pub fn key(&self) -> String {
        self.address.key()
    }

    pub fn protocol(&self) -> Protocol {
        self.address.protocol()
    }

    /// Total number of reported uses.
    pub fn attempts(&self) -> u32 {
        self.times_failed.saturating_add(self.times_succeeded)
    }

    /// Share of reported uses that failed.
    pub fn fail_ratio(&self) -> f64 {
        let total = self.attempts();
        if total == 0 {
            return 0.0;
        }
        self.times_failed as f64 / total as f64
    }

    /// Calculate the success rate of this proxy.
    pub fn success_rate(&self) -> f64 {
        let total = self.attempts();
        if total == 0 {
            return 0.0;
        }
        self.times_succeeded as f64 / total as f64
    }

    pub(crate) fn record_success(&mut self) {
        self.times_succeeded = self.times_succeeded.saturating_add(1);
        self.times_failed_in_row = 0;
    }

    pub(crate) fn record_failure(&mut self) {
        self.times_failed = self.times_failed.saturating_add(1);
        self.times_failed_in_row = self.times_failed_in_row.saturating_add(1);
    }

    /// Fold a duplicate of the same address into this record.
    ///
    /// Counters come from whichever side has more attempts (ties keep
    /// `self`); metadata is filled from the first side that has it.
    pub(crate) fn merge(&mut self, other: ProxyRecord) {
        if other.attempts() > self.attempts() {
            self.times_succeeded = other.times_succeeded;
            self.times_failed = other.times_failed;
            self.times_failed_in_row = other.times_failed_in_row;
        }
        if self.country.is_none() {
            self.country = other.country;
        }
        if self.anonymity.is_none() {
            self.anonymity = other.anonymity;
        }
    }
}

/// A proxy as a feed describes it, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProxy {
    pub address: String,
    pub protocol: Option<String>,
    pub country: Option<String>,
    pub anonymity: Option<String>,
}

impl RawProxy {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn anonymity(mut self, anonymity: impl Into<String>) -> Self {
        self.anonymity = Some(anonymity.into());
        self
    }

    /// Validate the descriptor into a record with zeroed counters.
    ///
    /// An explicit `protocol` wins over the address scheme; an address with
    /// neither falls back to `default`.
    pub fn into_record(self, default: Protocol) -> Result<ProxyRecord> {
        let address = match self.protocol.as_deref() {
            Some(tag) => {
                let protocol: Protocol = tag.parse()?;
                let bare = self
                    .address
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or(&self.address);
                ProxyAddress::parse_with_default(bare, protocol)?
            }
            None => ProxyAddress::parse_with_default(&self.address, default)?,
        };

        let mut record = ProxyRecord::new(address);
        record.country = self.country.filter(|c| !c.trim().is_empty());
        record.anonymity = self.anonymity.filter(|a| !a.trim().is_empty());
        Ok(record)
    }
}
