//! Preference-filtered random selection with an anti-repeat rule.

use crate::error::{Error, NoProxyReason, Result};
use crate::filter::ProxyPreferences;
use crate::proxy::ProxyRecord;
use crate::store::ProxyStore;

use rand::seq::IndexedRandom;
use rand::Rng;

/// Picks one proxy out of the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    min_proxies: usize,
}

impl Selector {
    /// A store smaller than `min_proxies` is treated as empty.
    pub fn new(min_proxies: usize) -> Self {
        Self { min_proxies }
    }

    /// Sample a record matching `filter` and mark it as last selected.
    ///
    /// The previous selection is skipped whenever another candidate matches,
    /// so the same proxy is never returned twice in a row unless it is the
    /// only match.
    pub fn select<R: Rng + ?Sized>(
        &self,
        store: &mut ProxyStore,
        filter: &ProxyPreferences,
        rng: &mut R,
    ) -> Result<ProxyRecord> {
        if store.len() < self.min_proxies {
            return Err(Error::NoProxyAvailable(NoProxyReason::BelowMinimum {
                available: store.len(),
                minimum: self.min_proxies,
            }));
        }

        let mut candidates: Vec<&ProxyRecord> = store
            .records()
            .iter()
            .filter(|r| filter.matches(r))
            .collect();

        if candidates.len() > 1 {
            if let Some(last) = store.last_selected() {
                candidates.retain(|r| r.key() != last);
            }
        }

        let selected = candidates
            .choose(rng)
            .map(|r| (*r).clone())
            .ok_or(Error::NoProxyAvailable(NoProxyReason::NoMatch))?;

        store.mark_selected(&selected.key());
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Protocol;

    fn store_of(urls: &[&str]) -> ProxyStore {
        let mut store = ProxyStore::new();
        store.add(urls.iter().map(|u| ProxyRecord::new(u.parse().unwrap())));
        store
    }

    #[test]
    fn test_empty_store() {
        let mut store = ProxyStore::new();
        let result = Selector::new(0).select(&mut store, &ProxyPreferences::any(), &mut rand::rng());
        assert!(matches!(
            result,
            Err(Error::NoProxyAvailable(NoProxyReason::NoMatch))
        ));
    }

    #[test]
    fn test_below_minimum() {
        let mut store = store_of(&["http://1.1.1.1:80", "http://2.2.2.2:80"]);
        let result = Selector::new(3).select(&mut store, &ProxyPreferences::any(), &mut rand::rng());
        assert!(matches!(
            result,
            Err(Error::NoProxyAvailable(NoProxyReason::BelowMinimum { available: 2, minimum: 3 }))
        ));
    }

    #[test]
    fn test_filter_excludes_everything() {
        let mut store = store_of(&["socks5://1.1.1.1:1080", "socks5://2.2.2.2:1080"]);
        let filter = ProxyPreferences::any().protocols([Protocol::Http]);
        let result = Selector::new(1).select(&mut store, &filter, &mut rand::rng());
        assert!(matches!(result, Err(Error::NoProxyAvailable(_))));
        assert_eq!(store.last_selected(), None);
    }

    #[test]
    fn test_never_repeats_with_two_candidates() {
        let mut store = store_of(&["http://1.1.1.1:80", "http://2.2.2.2:80"]);
        let selector = Selector::new(1);
        let mut rng = rand::rng();
        let mut previous = selector
            .select(&mut store, &ProxyPreferences::any(), &mut rng)
            .unwrap()
            .key();
        for _ in 0..50 {
            let next = selector
                .select(&mut store, &ProxyPreferences::any(), &mut rng)
                .unwrap()
                .key();
            assert_ne!(next, previous);
            assert_eq!(store.last_selected(), Some(next.as_str()));
            previous = next;
        }
    }

    #[test]
    fn test_single_match_may_repeat() {
        let mut store = store_of(&["http://1.1.1.1:80", "socks5://2.2.2.2:1080"]);
        let filter = ProxyPreferences::any().protocols([Protocol::Socks5]);
        let selector = Selector::new(1);
        let mut rng = rand::rng();
        for _ in 0..3 {
            let record = selector.select(&mut store, &filter, &mut rng).unwrap();
            assert_eq!(record.key(), "socks5://2.2.2.2:1080");
        }
    }
}
