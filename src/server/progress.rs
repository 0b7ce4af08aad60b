//! Materialization progress tracking.
//!
//! One writer (the materialization task), many readers (status polls). The
//! whole snapshot lives under a single lock so readers can never observe a
//! torn (rows, total, percentage) combination.

use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A consistent view of materialization progress.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    /// Rows materialized so far.
    pub rows_materialized: usize,

    /// Total row count, once known.
    pub total_row_count: Option<usize>,

    /// Progress percentage, 0-100.
    pub percentage: u8,
}

/// Concurrency-safe progress state for one session.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    inner: RwLock<ProgressSnapshot>,
}

impl ProgressTracker {
    /// Creates a tracker; pass the total when the backend knows it up front.
    pub fn new(total_row_count: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(ProgressSnapshot {
                rows_materialized: 0,
                total_row_count,
                percentage: 0,
            }),
        }
    }

    /// Records `count` newly materialized rows.
    pub fn record_rows(&self, count: usize) {
        let mut state = write_lock(&self.inner);
        state.rows_materialized += count;
        state.percentage = match state.total_row_count {
            Some(total) if total > 0 => {
                // Cap below 100 until finish() declares completion.
                (((state.rows_materialized * 100) / total).min(99)) as u8
            }
            Some(_) => 99,
            None => staged_percentage(state.rows_materialized),
        };
    }

    /// Declares materialization finished with the final row total.
    pub fn finish(&self, total_row_count: usize) {
        let mut state = write_lock(&self.inner);
        state.total_row_count = Some(total_row_count);
        state.percentage = 100;
    }

    /// Returns a consistent snapshot of the current progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        *read_lock(&self.inner)
    }
}

/// Staged heuristic used while the total row count is unknown.
fn staged_percentage(rows: usize) -> u8 {
    match rows {
        0..=999 => 25,
        1_000..=9_999 => 50,
        10_000..=99_999 => 75,
        _ => 90,
    }
}

// A poisoned lock only means a writer panicked mid-update; the snapshot is
// still structurally valid, so recover rather than propagate the panic.
fn read_lock(lock: &RwLock<ProgressSnapshot>) -> RwLockReadGuard<'_, ProgressSnapshot> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock(lock: &RwLock<ProgressSnapshot>) -> RwLockWriteGuard<'_, ProgressSnapshot> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
