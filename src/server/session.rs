//! Query session state.
//!
//! A session is the server-side handle to one query's cached, materializing
//! or materialized result set. Status moves forward only: Processing
//! transitions into exactly one terminal state.

use crate::db::{ColumnInfo, Row};
use crate::server::progress::{ProgressSnapshot, ProgressTracker};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle status of a query session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Materialization in progress.
    Processing,
    /// All rows cached.
    Completed,
    /// The underlying query failed; the message is recorded on the session.
    Error,
    /// Result exceeded the row cap; paging is refused, CSV export offered.
    SizeExceeded,
    /// Cancelled by the user; already-materialized rows remain readable.
    Cancelled,
    /// Evicted by the TTL sweeper while still processing.
    Expired,
}

impl SessionStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Paged reads are served for completed and cancelled sessions.
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// CSV export additionally covers size-exceeded sessions (cached prefix).
    pub fn is_exportable(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::SizeExceeded)
    }

    /// Returns the status as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::SizeExceeded => "size_exceeded",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A point-in-time view of a session, served to status polls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub rows_materialized: usize,
    pub total_row_count: Option<usize>,
    pub progress_percentage: u8,
    pub error_message: Option<String>,
}

/// Mutable lifecycle state, guarded as one unit.
#[derive(Debug)]
struct LifecycleState {
    status: SessionStatus,
    error_message: Option<String>,
}

/// One cached query session: lifecycle state, progress, and the row set.
pub struct SessionEntry {
    id: String,
    owner: String,
    columns: Vec<ColumnInfo>,
    created_at: Instant,
    last_accessed: Mutex<Instant>,
    state: RwLock<LifecycleState>,
    rows: RwLock<Vec<Row>>,
    progress: ProgressTracker,
    cancel: CancellationToken,
}

impl SessionEntry {
    /// Creates a new processing session.
    pub fn new(owner: impl Into<String>, columns: Vec<ColumnInfo>, total_hint: Option<usize>) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            columns,
            created_at: now,
            last_accessed: Mutex::new(now),
            state: RwLock::new(LifecycleState {
                status: SessionStatus::Processing,
                error_message: None,
            }),
            rows: RwLock::new(Vec::new()),
            progress: ProgressTracker::new(total_hint),
            cancel: CancellationToken::new(),
        }
    }

    /// Opaque session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Owner of this session.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Column metadata of the cached result set.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Cancellation token checked by the materialization task per batch.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Progress tracker written by the materialization task.
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// When the session was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Refreshes the idle clock; called on every read.
    pub fn touch(&self) {
        *lock_mutex(&self.last_accessed) = Instant::now();
    }

    /// How long since the session was last read.
    pub fn idle_for(&self) -> std::time::Duration {
        lock_mutex(&self.last_accessed).elapsed()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        read_lock(&self.state).status
    }

    /// Recorded execution error, if any.
    pub fn error_message(&self) -> Option<String> {
        read_lock(&self.state).error_message.clone()
    }

    /// Transitions into a terminal state.
    ///
    /// Forward-only: once terminal, further transitions are ignored and
    /// `false` is returned. This makes the cancel/complete race harmless -
    /// whichever lands first wins.
    pub fn transition(&self, to: SessionStatus) -> bool {
        debug_assert!(to.is_terminal());
        let mut state = write_lock(&self.state);
        if state.status.is_terminal() {
            return false;
        }
        state.status = to;
        true
    }

    /// Transitions to Error with the failure message recorded on the session.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let mut state = write_lock(&self.state);
        if state.status.is_terminal() {
            return false;
        }
        state.status = SessionStatus::Error;
        state.error_message = Some(message.into());
        true
    }

    /// Appends a materialized batch and advances progress.
    pub fn append_rows(&self, batch: Vec<Row>) {
        let count = batch.len();
        self.rows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(batch);
        self.progress.record_rows(count);
    }

    /// Runs `f` against the cached rows without cloning the whole set.
    pub fn with_rows<R>(&self, f: impl FnOnce(&[Row]) -> R) -> R {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        f(&rows)
    }

    /// Number of rows cached so far.
    pub fn cached_row_count(&self) -> usize {
        self.rows.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Builds the status snapshot served to polls.
    pub fn snapshot(&self) -> StatusSnapshot {
        // Read lifecycle state first: a Processing snapshot with slightly
        // stale progress is fine, the reverse would report terminal status
        // with pre-terminal progress.
        let state = read_lock(&self.state);
        let progress: ProgressSnapshot = self.progress.snapshot();
        StatusSnapshot {
            status: state.status,
            rows_materialized: progress.rows_materialized,
            total_row_count: progress.total_row_count,
            progress_percentage: progress.percentage,
            error_message: state.error_message.clone(),
        }
    }
}

fn read_lock(lock: &RwLock<LifecycleState>) -> RwLockReadGuard<'_, LifecycleState> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock(lock: &RwLock<LifecycleState>) -> RwLockWriteGuard<'_, LifecycleState> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn lock_mutex(lock: &Mutex<Instant>) -> MutexGuard<'_, Instant> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}
