//! Session lifecycle management.
//!
//! Owns the session map, drives materialization in detached background
//! tasks, and evicts idle sessions through a TTL sweeper.

use crate::config::CacheConfig;
use crate::db::QueryStream;
use crate::error::{PagerError, Result};
use crate::server::session::{SessionEntry, SessionStatus, StatusSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type SessionMap = HashMap<String, Arc<SessionEntry>>;

/// Manages the server-side result cache.
pub struct SessionCacheManager {
    sessions: RwLock<SessionMap>,
    config: CacheConfig,
    shutdown: CancellationToken,
}

impl SessionCacheManager {
    /// Creates a manager with the given configuration.
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Registers a session for `owner` and starts materializing `stream` in a
    /// detached background task. Returns the new session id.
    pub fn create_session(&self, owner: &str, stream: QueryStream) -> String {
        self.enforce_owner_cap(owner);

        let entry = Arc::new(SessionEntry::new(
            owner,
            stream.columns.clone(),
            stream.total_rows,
        ));
        let id = entry.id().to_string();

        write_sessions(&self.sessions).insert(id.clone(), entry.clone());
        debug!("Created session {} for owner {}", id, owner);

        let max_cached_rows = self.config.max_cached_rows;
        tokio::spawn(materialize(entry, stream, max_cached_rows));

        id
    }

    /// Returns a status snapshot, refreshing the session's idle clock.
    pub fn get_status(&self, session_id: &str) -> Result<StatusSnapshot> {
        let entry = self.session(session_id)?;
        Ok(entry.snapshot())
    }

    /// Looks up a session, refreshing its idle clock.
    pub fn session(&self, session_id: &str) -> Result<Arc<SessionEntry>> {
        let entry = read_sessions(&self.sessions)
            .get(session_id)
            .cloned()
            .ok_or_else(|| PagerError::not_found(format!("session {session_id}")))?;
        entry.touch();
        Ok(entry)
    }

    /// Requests cooperative cancellation.
    ///
    /// The materialization task observes the token at its next batch
    /// boundary and transitions the session to Cancelled; rows cached so far
    /// remain readable. Returns whether a processing session was found.
    pub fn cancel(&self, session_id: &str) -> bool {
        let Some(entry) = read_sessions(&self.sessions).get(session_id).cloned() else {
            return false;
        };
        if entry.status() != SessionStatus::Processing {
            return false;
        }
        debug!("Cancellation requested for session {}", session_id);
        entry.cancel_token().cancel();
        true
    }

    /// Releases a session's storage immediately. Idempotent.
    pub fn cleanup(&self, session_id: &str) {
        if let Some(entry) = write_sessions(&self.sessions).remove(session_id) {
            entry.cancel_token().cancel();
            debug!("Cleaned up session {}", session_id);
        }
    }

    /// Releases every session belonging to `owner`. Idempotent.
    pub fn cleanup_owner(&self, owner: &str) -> usize {
        let mut sessions = write_sessions(&self.sessions);
        let ids: Vec<String> = sessions
            .values()
            .filter(|e| e.owner() == owner)
            .map(|e| e.id().to_string())
            .collect();
        for id in &ids {
            if let Some(entry) = sessions.remove(id) {
                entry.cancel_token().cancel();
            }
        }
        if !ids.is_empty() {
            debug!("Cleaned up {} sessions for owner {}", ids.len(), owner);
        }
        ids.len()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        read_sessions(&self.sessions).len()
    }

    /// Starts the background TTL sweeper. Call once; stopped by `close()`.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.sweep_interval());
            ticker.tick().await; // first tick completes immediately
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = ticker.tick() => manager.sweep_expired(),
                }
            }
        });
    }

    /// Evicts sessions idle past the TTL window.
    pub fn sweep_expired(&self) {
        let ttl = self.config.session_ttl();
        let mut sessions = write_sessions(&self.sessions);
        let expired: Vec<String> = sessions
            .values()
            .filter(|e| e.idle_for() > ttl)
            .map(|e| e.id().to_string())
            .collect();

        for id in &expired {
            if let Some(entry) = sessions.remove(id) {
                // A still-processing session is marked Expired so its
                // materialization task stops at the next batch boundary.
                entry.transition(SessionStatus::Expired);
                entry.cancel_token().cancel();
            }
        }

        if !expired.is_empty() {
            info!("TTL sweep evicted {} idle sessions", expired.len());
        }
    }

    /// Stops the sweeper task.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Evicts the owner's least recently used session when at the cap.
    fn enforce_owner_cap(&self, owner: &str) {
        let mut sessions = write_sessions(&self.sessions);
        let mut owned: Vec<Arc<SessionEntry>> = sessions
            .values()
            .filter(|e| e.owner() == owner)
            .cloned()
            .collect();

        while owned.len() >= self.config.max_sessions_per_owner {
            // Longest idle = least recently used
            let Some(lru) = owned
                .iter()
                .max_by_key(|e| e.idle_for())
                .map(|e| e.id().to_string())
            else {
                break;
            };
            if let Some(entry) = sessions.remove(&lru) {
                entry.cancel_token().cancel();
                warn!(
                    "Owner {} at session cap; evicted least recently used session {}",
                    owner, lru
                );
            }
            owned.retain(|e| e.id() != lru);
        }
    }
}

/// Materialization loop for one session.
///
/// Appends batches, checks cancellation at batch granularity, and finishes
/// with exactly one terminal status. Beyond the row cap, batches are drained
/// only to count the total.
async fn materialize(entry: Arc<SessionEntry>, mut stream: QueryStream, max_cached_rows: usize) {
    let mut total_rows = 0usize;
    let mut capped = false;

    loop {
        tokio::select! {
            biased;

            _ = entry.cancel_token().cancelled() => {
                if entry.transition(SessionStatus::Cancelled) {
                    debug!(
                        "Session {} cancelled after {} rows",
                        entry.id(),
                        entry.cached_row_count()
                    );
                }
                return;
            }

            batch = stream.batches.recv() => match batch {
                Some(Ok(batch)) => {
                    total_rows += batch.len();

                    if capped {
                        entry.progress().record_rows(batch.len());
                    } else if entry.cached_row_count() + batch.len() > max_cached_rows {
                        let room = max_cached_rows.saturating_sub(entry.cached_row_count());
                        let mut batch = batch;
                        let overflow = batch.split_off(room);
                        entry.append_rows(batch);
                        entry.progress().record_rows(overflow.len());
                        capped = true;
                        debug!(
                            "Session {} exceeded row cap of {}; counting remainder only",
                            entry.id(),
                            max_cached_rows
                        );
                    } else {
                        entry.append_rows(batch);
                    }
                }
                Some(Err(e)) => {
                    warn!("Session {} failed: {}", entry.id(), e);
                    entry.fail(e.to_string());
                    return;
                }
                None => {
                    entry.progress().finish(total_rows);
                    let status = if capped {
                        SessionStatus::SizeExceeded
                    } else {
                        SessionStatus::Completed
                    };
                    if entry.transition(status) {
                        debug!(
                            "Session {} finished as {} with {} rows",
                            entry.id(),
                            status,
                            total_rows
                        );
                    }
                    return;
                }
            }
        }
    }
}

fn read_sessions(lock: &RwLock<SessionMap>) -> RwLockReadGuard<'_, SessionMap> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_sessions(lock: &RwLock<SessionMap>) -> RwLockWriteGuard<'_, SessionMap> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
