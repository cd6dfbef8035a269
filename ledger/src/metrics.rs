use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct LedgerMetrics {
    actions_created: AtomicU64,
    duplicates_prechecked: AtomicU64,
    duplicates_raced: AtomicU64,
    scores_written: AtomicU64,
    scores_skipped: AtomicU64,
    resets: AtomicU64,
    storage_errors: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LedgerMetricsSnapshot {
    pub actions_created: u64,
    /// Duplicates caught by the in-transaction lookup.
    pub duplicates_prechecked: u64,
    /// Duplicates only the engine's unique index caught.
    pub duplicates_raced: u64,
    pub scores_written: u64,
    pub scores_skipped: u64,
    pub resets: u64,
    pub storage_errors: u64,
}

impl LedgerMetricsSnapshot {
    pub fn duplicates(&self) -> u64 {
        self.duplicates_prechecked + self.duplicates_raced
    }
}

impl LedgerMetrics {
    pub fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            actions_created: self.actions_created.load(Ordering::Relaxed),
            duplicates_prechecked: self.duplicates_prechecked.load(Ordering::Relaxed),
            duplicates_raced: self.duplicates_raced.load(Ordering::Relaxed),
            scores_written: self.scores_written.load(Ordering::Relaxed),
            scores_skipped: self.scores_skipped.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
        }
    }

    pub fn inc_created(&self) {
        self.actions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate_prechecked(&self) {
        self.duplicates_prechecked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_duplicate_raced(&self) {
        self.duplicates_raced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_score_written(&self) {
        self.scores_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_score_skipped(&self) {
        self.scores_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_storage_error(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }
}
