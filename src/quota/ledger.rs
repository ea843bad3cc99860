//! Process-wide quota accounting.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::quota::DomainKey;

/// Usage and optional limit for one domain key, both in KiB.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuotaEntry {
    pub used_kib: f64,
    /// `None` means unlimited.
    pub limit_kib: Option<f64>,
}

impl QuotaEntry {
    /// True once usage has reached the limit. Over-limit is checked before a
    /// charge, so the request that crosses the limit is still admitted.
    pub fn is_exhausted(&self) -> bool {
        self.limit_kib.is_some_and(|limit| self.used_kib >= limit)
    }
}

/// Result of [`QuotaLedger::check_and_charge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected,
}

/// One row of a usage report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub domain: DomainKey,
    pub used_kib: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_kib: Option<f64>,
}

/// Mapping from domain key to quota entry.
///
/// Every operation takes the same lock, so charges to a key are applied in a
/// total order and `reset_all` clears every entry in one step. Entries are
/// created lazily and only removed when the ledger is dropped.
#[derive(Debug, Default)]
pub struct QuotaLedger {
    entries: Mutex<HashMap<DomainKey, QuotaEntry>>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DomainKey, QuotaEntry>> {
        // Entries stay consistent across a panicking holder: every critical
        // section is a single field update.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the entry for `key`, creating a zero-usage unlimited one if absent.
    pub fn ensure(&self, key: &DomainKey) -> QuotaEntry {
        *self.lock().entry(key.clone()).or_default()
    }

    /// Install or replace the limit for `key` without touching its usage.
    pub fn set_limit(&self, key: &DomainKey, limit_kib: f64) {
        self.lock().entry(key.clone()).or_default().limit_kib = Some(limit_kib);
        tracing::info!(domain = %key, limit_kib, "Quota limit set");
    }

    /// Reject if `key` is already at or over its limit, otherwise add `delta_kib`.
    pub fn check_and_charge(&self, key: &DomainKey, delta_kib: f64) -> Admission {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_default();
        if entry.is_exhausted() {
            return Admission::Rejected;
        }
        entry.used_kib += delta_kib;
        Admission::Admitted
    }

    /// Add `delta_kib` to `key` unconditionally. Used for relayed traffic,
    /// which is metered even after the limit is crossed.
    pub fn charge(&self, key: &DomainKey, delta_kib: f64) {
        self.lock().entry(key.clone()).or_default().used_kib += delta_kib;
    }

    /// Zero every entry's usage, keeping limits.
    pub fn reset_all(&self) {
        let mut entries = self.lock();
        for entry in entries.values_mut() {
            entry.used_kib = 0.0;
        }
        tracing::info!(domains = entries.len(), "Daily quota usage reset");
    }

    /// Point-in-time copy of every entry, highest usage first.
    pub fn snapshot(&self) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> = self
            .lock()
            .iter()
            .map(|(domain, entry)| UsageRecord {
                domain: domain.clone(),
                used_kib: entry.used_kib,
                limit_kib: entry.limit_kib,
            })
            .collect();
        records.sort_by(|a, b| {
            b.used_kib
                .total_cmp(&a.used_kib)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
