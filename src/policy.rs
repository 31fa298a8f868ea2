//! Eviction rules for unreliable proxies.

use crate::error::{Error, Result};
use crate::proxy::ProxyRecord;

use std::fmt;

/// Why a proxy was judged unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Too many consecutive failures.
    FailedInRow,
    /// Too large a share of failures over enough samples.
    FailRatio,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::FailedInRow => f.write_str("too many failures in a row"),
            EvictionReason::FailRatio => f.write_str("bad success-failure ratio"),
        }
    }
}

/// Decides from a record's counters whether it stays in the pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    allowed_fails_in_row: u32,
    fails_without_check: u32,
    percent_failed_to_remove: f64,
}

impl EvictionPolicy {
    /// `percent_failed_to_remove` is a fraction in `[0, 1]`.
    pub fn new(
        allowed_fails_in_row: u32,
        fails_without_check: u32,
        percent_failed_to_remove: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&percent_failed_to_remove) {
            return Err(Error::InvalidConfig(format!(
                "percent_failed_to_remove must be within [0, 1], got {}",
                percent_failed_to_remove
            )));
        }
        Ok(Self {
            allowed_fails_in_row,
            fails_without_check,
            percent_failed_to_remove,
        })
    }

    pub fn allowed_fails_in_row(&self) -> u32 {
        self.allowed_fails_in_row
    }

    pub fn fails_without_check(&self) -> u32 {
        self.fails_without_check
    }

    pub fn percent_failed_to_remove(&self) -> f64 {
        self.percent_failed_to_remove
    }

    /// Reason to evict `record`, if any.
    pub fn evaluate(&self, record: &ProxyRecord) -> Option<EvictionReason> {
        if record.times_failed_in_row > self.allowed_fails_in_row {
            return Some(EvictionReason::FailedInRow);
        }
        // fails_without_check is the minimum sample before the ratio counts
        if record.times_failed > self.fails_without_check
            && record.fail_ratio() > self.percent_failed_to_remove
        {
            return Some(EvictionReason::FailRatio);
        }
        None
    }

    pub fn should_evict(&self, record: &ProxyRecord) -> bool {
        self.evaluate(record).is_some()
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            allowed_fails_in_row: 3,
            fails_without_check: 2,
            percent_failed_to_remove: 0.5,
        }
    }
}
