//! Preference filter narrowing which proxies may be selected.

use crate::error::Result;
use crate::proxy::{Protocol, ProxyRecord};

use std::collections::HashSet;

/// Include/exclude constraints over protocol, country and anonymity.
///
/// Every constraint is optional; an empty set matches everything. Country
/// and anonymity are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyPreferences {
    protocols: HashSet<Protocol>,
    countries: HashSet<String>,
    anonymities: HashSet<String>,
    exclude_protocols: HashSet<Protocol>,
    exclude_countries: HashSet<String>,
    exclude_anonymities: HashSet<String>,
}

impl ProxyPreferences {
    /// The filter that matches every proxy.
    pub fn any() -> Self {
        Self::default()
    }

    /// Parse protocol tags, failing on the first one that is not recognized.
    pub fn protocols_from_tags<I, S>(tags: I) -> Result<Vec<Protocol>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter().map(|t| t.as_ref().parse()).collect()
    }

    pub fn protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.protocols.extend(protocols);
        self
    }

    pub fn countries<S: AsRef<str>>(mut self, countries: impl IntoIterator<Item = S>) -> Self {
        self.countries.extend(countries.into_iter().map(normalize));
        self
    }

    pub fn anonymities<S: AsRef<str>>(mut self, levels: impl IntoIterator<Item = S>) -> Self {
        self.anonymities.extend(levels.into_iter().map(normalize));
        self
    }

    pub fn exclude_protocols(mut self, protocols: impl IntoIterator<Item = Protocol>) -> Self {
        self.exclude_protocols.extend(protocols);
        self
    }

    pub fn exclude_countries<S: AsRef<str>>(
        mut self,
        countries: impl IntoIterator<Item = S>,
    ) -> Self {
        self.exclude_countries.extend(countries.into_iter().map(normalize));
        self
    }

    pub fn exclude_anonymities<S: AsRef<str>>(
        mut self,
        levels: impl IntoIterator<Item = S>,
    ) -> Self {
        self.exclude_anonymities.extend(levels.into_iter().map(normalize));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
            && self.countries.is_empty()
            && self.anonymities.is_empty()
            && self.exclude_protocols.is_empty()
            && self.exclude_countries.is_empty()
            && self.exclude_anonymities.is_empty()
    }

    pub fn matches(&self, record: &ProxyRecord) -> bool {
        let protocol = record.protocol();
        if !self.protocols.is_empty() && !self.protocols.contains(&protocol) {
            return false;
        }
        if self.exclude_protocols.contains(&protocol) {
            return false;
        }
        tag_matches(record.country.as_deref(), &self.countries, &self.exclude_countries)
            && tag_matches(
                record.anonymity.as_deref(),
                &self.anonymities,
                &self.exclude_anonymities,
            )
    }
}

fn normalize<S: AsRef<str>>(tag: S) -> String {
    tag.as_ref().trim().to_ascii_lowercase()
}

// A missing tag fails a non-empty include set and is never excluded.
fn tag_matches(tag: Option<&str>, include: &HashSet<String>, exclude: &HashSet<String>) -> bool {
    match tag.map(normalize) {
        Some(tag) => {
            (include.is_empty() || include.contains(&tag)) && !exclude.contains(&tag)
        }
        None => include.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn record(url: &str, country: Option<&str>, anonymity: Option<&str>) -> ProxyRecord {
        let mut record = ProxyRecord::new(url.parse().unwrap());
        record.country = country.map(str::to_string);
        record.anonymity = anonymity.map(str::to_string);
        record
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let prefs = ProxyPreferences::any();
        assert!(prefs.is_empty());
        assert!(prefs.matches(&record("socks4://1.1.1.1:1080", None, None)));
    }

    #[test]
    fn test_include_sets_are_conjunctive() {
        let prefs = ProxyPreferences::any()
            .protocols([Protocol::Http, Protocol::Https])
            .countries(["us"]);
        assert!(prefs.matches(&record("http://1.1.1.1:80", Some("US"), None)));
        assert!(!prefs.matches(&record("http://1.1.1.1:80", Some("DE"), None)));
        assert!(!prefs.matches(&record("socks5://1.1.1.1:1080", Some("US"), None)));
        assert!(!prefs.matches(&record("http://1.1.1.1:80", None, None)));
    }

    #[test]
    fn test_exclude_sets() {
        let prefs = ProxyPreferences::any()
            .exclude_protocols([Protocol::Socks4])
            .exclude_anonymities(["Transparent"]);
        assert!(prefs.matches(&record("http://1.1.1.1:80", None, Some("elite"))));
        assert!(prefs.matches(&record("http://1.1.1.1:80", None, None)));
        assert!(!prefs.matches(&record("http://1.1.1.1:80", None, Some("transparent"))));
        assert!(!prefs.matches(&record("socks4://1.1.1.1:1080", None, None)));
    }

    #[test]
    fn test_protocol_tags_fail_fast() {
        let parsed = ProxyPreferences::protocols_from_tags(["http", "SOCKS5"]).unwrap();
        assert_eq!(parsed, vec![Protocol::Http, Protocol::Socks5]);
        assert!(matches!(
            ProxyPreferences::protocols_from_tags(["http", "quic"]),
            Err(Error::InvalidProtocol(_))
        ));
        assert_eq!(
            ProxyPreferences::protocols_from_tags(Protocol::ALL.map(|p| p.as_str())).unwrap().len(),
            4
        );
    }
}
