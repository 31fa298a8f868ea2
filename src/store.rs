//! In-memory proxy records with dedup on insert.

use crate::error::{Error, Result};
use crate::policy::{EvictionPolicy, EvictionReason};
use crate::proxy::ProxyRecord;

use std::collections::HashMap;

/// Counts reported by [`ProxyStore::add`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddSummary {
    /// Records whose address was new to the store.
    pub added: usize,
    /// Records folded into an existing entry with the same address.
    pub merged: usize,
}

/// What a feedback call did.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// No selected record to apply it to.
    Ignored,
    /// Counters updated, record kept.
    Recorded(ProxyRecord),
    /// Counters updated and the record was removed.
    Evicted(ProxyRecord, EvictionReason),
}

/// Insertion-ordered set of proxy records keyed by canonical address.
///
/// The last selected proxy is remembered by key so removals elsewhere in
/// the store never invalidate it.
#[derive(Debug, Default)]
pub struct ProxyStore {
    records: Vec<ProxyRecord>,
    index: HashMap<String, usize>,
    last_selected: Option<String>,
}

impl ProxyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a batch, merging any record whose address is already present.
    pub fn add(&mut self, records: impl IntoIterator<Item = ProxyRecord>) -> AddSummary {
        let mut summary = AddSummary::default();
        for record in records {
            let key = record.key();
            match self.index.get(&key) {
                Some(&pos) => {
                    self.records[pos].merge(record);
                    summary.merged += 1;
                }
                None => {
                    self.index.insert(key, self.records.len());
                    self.records.push(record);
                    summary.added += 1;
                }
            }
        }
        summary
    }

    /// Remove the record with the given address key.
    pub fn remove(&mut self, key: &str) -> Result<ProxyRecord> {
        let pos = self
            .index
            .remove(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let record = self.records.remove(pos);
        for (offset, shifted) in self.records[pos..].iter().enumerate() {
            self.index.insert(shifted.key(), pos + offset);
        }
        if self.last_selected.as_deref() == Some(key) {
            self.last_selected = None;
        }
        Ok(record)
    }

    pub fn remove_all(&mut self) {
        self.records.clear();
        self.index.clear();
        self.last_selected = None;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ProxyRecord> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    /// Records in insertion order.
    pub fn records(&self) -> &[ProxyRecord] {
        &self.records
    }

    pub fn last_selected(&self) -> Option<&str> {
        self.last_selected.as_deref()
    }

    /// Remember `key` as the last handed-out proxy. Unknown keys clear it.
    pub fn mark_selected(&mut self, key: &str) {
        self.last_selected = self.contains(key).then(|| key.to_string());
    }

    /// Apply feedback to the last selected record.
    pub fn feedback(&mut self, success: bool, policy: &EvictionPolicy) -> FeedbackOutcome {
        match self.last_selected.clone() {
            Some(key) => self.feedback_for(&key, success, policy),
            None => FeedbackOutcome::Ignored,
        }
    }

    /// Apply feedback to the record with the given key.
    ///
    /// A failure that trips the policy removes the record immediately.
    pub fn feedback_for(
        &mut self,
        key: &str,
        success: bool,
        policy: &EvictionPolicy,
    ) -> FeedbackOutcome {
        let Some(&pos) = self.index.get(key) else {
            return FeedbackOutcome::Ignored;
        };

        let record = &mut self.records[pos];
        if success {
            record.record_success();
            return FeedbackOutcome::Recorded(record.clone());
        }

        record.record_failure();
        let Some(reason) = policy.evaluate(record) else {
            return FeedbackOutcome::Recorded(record.clone());
        };
        match self.remove(key) {
            Ok(removed) => FeedbackOutcome::Evicted(removed, reason),
            Err(_) => FeedbackOutcome::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str) -> ProxyRecord {
        ProxyRecord::new(url.parse().unwrap())
    }

    fn with_totals(url: &str, succeeded: u32, failed: u32) -> ProxyRecord {
        let mut r = record(url);
        r.times_succeeded = succeeded;
        r.times_failed = failed;
        r
    }

    #[test]
    fn test_add_dedups_within_batch_and_store() {
        let mut store = ProxyStore::new();
        let summary = store.add(vec![
            record("http://1.1.1.1:80"),
            record("http://1.1.1.1:80").with_country("US"),
            record("http://2.2.2.2:80"),
        ]);
        assert_eq!(summary, AddSummary { added: 2, merged: 1 });
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("http://1.1.1.1:80").unwrap().country.as_deref(),
            Some("US")
        );

        let summary = store.add(vec![record("http://2.2.2.2:80")]);
        assert_eq!(summary.merged, 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_dedup_keeps_larger_totals() {
        let mut store = ProxyStore::new();
        store.add(vec![
            with_totals("http://7.7.7.7:80", 2, 1).with_anonymity("elite"),
            with_totals("http://7.7.7.7:80", 6, 4).with_country("FR"),
        ]);
        assert_eq!(store.len(), 1);
        let kept = store.get("http://7.7.7.7:80").unwrap();
        assert_eq!((kept.times_succeeded, kept.times_failed), (6, 4));
        assert_eq!(kept.country.as_deref(), Some("FR"));
        assert_eq!(kept.anonymity.as_deref(), Some("elite"));
    }

    #[test]
    fn test_remove_by_key_keeps_order_and_selection() {
        let mut store = ProxyStore::new();
        store.add(vec![
            record("http://1.1.1.1:80"),
            record("http://2.2.2.2:80"),
            record("http://3.3.3.3:80"),
        ]);
        store.mark_selected("http://3.3.3.3:80");

        store.remove("http://1.1.1.1:80").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].key(), "http://2.2.2.2:80");
        assert_eq!(store.last_selected(), Some("http://3.3.3.3:80"));
        assert_eq!(store.get("http://3.3.3.3:80").unwrap().key(), "http://3.3.3.3:80");

        store.remove("http://3.3.3.3:80").unwrap();
        assert_eq!(store.last_selected(), None);
    }

    #[test]
    fn test_remove_missing_key() {
        let mut store = ProxyStore::new();
        assert!(matches!(
            store.remove("http://1.1.1.1:80"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_all_clears_selection() {
        let mut store = ProxyStore::new();
        store.add(vec![record("http://1.1.1.1:80")]);
        store.mark_selected("http://1.1.1.1:80");
        store.remove_all();
        assert!(store.is_empty());
        assert_eq!(store.last_selected(), None);
    }

    #[test]
    fn test_feedback_without_selection_is_ignored() {
        let mut store = ProxyStore::new();
        store.add(vec![record("http://1.1.1.1:80")]);
        let outcome = store.feedback(false, &EvictionPolicy::default());
        assert_eq!(outcome, FeedbackOutcome::Ignored);
        assert_eq!(store.get("http://1.1.1.1:80").unwrap().times_failed, 0);
    }

    #[test]
    fn test_feedback_streak_evicts() {
        let mut store = ProxyStore::new();
        let policy = EvictionPolicy::new(3, 100, 0.5).unwrap();
        store.add(vec![record("http://1.1.1.1:80"), record("http://2.2.2.2:80")]);
        store.mark_selected("http://1.1.1.1:80");

        for _ in 0..3 {
            assert!(matches!(
                store.feedback(false, &policy),
                FeedbackOutcome::Recorded(_)
            ));
        }
        let outcome = store.feedback(false, &policy);
        assert!(matches!(
            outcome,
            FeedbackOutcome::Evicted(ref r, EvictionReason::FailedInRow) if r.times_failed_in_row == 4
        ));
        assert_eq!(store.len(), 1);
        assert!(!store.contains("http://1.1.1.1:80"));

        // the selection went with the record
        assert_eq!(store.feedback(true, &policy), FeedbackOutcome::Ignored);
    }

    #[test]
    fn test_feedback_success_resets_streak() {
        let mut store = ProxyStore::new();
        let policy = EvictionPolicy::default();
        store.add(vec![record("http://1.1.1.1:80")]);
        store.mark_selected("http://1.1.1.1:80");
        store.feedback(false, &policy);
        store.feedback(false, &policy);
        store.feedback(true, &policy);
        let kept = store.get("http://1.1.1.1:80").unwrap();
        assert_eq!(kept.times_failed_in_row, 0);
        assert_eq!(kept.times_failed, 2);
        assert_eq!(kept.times_succeeded, 1);
    }
}
