//! Query execution orchestration.
//!
//! Drives one query from submission through polling to a readable store,
//! as an explicit state loop: Executing -> Polling -> Reading. Poll results
//! feed through the pure `classify_poll` so the branching is testable
//! without a runtime.

use crate::client::api::{ExecuteResponse, SessionApi};
use crate::client::source::{LocalPageSource, PageSource, ServerPageSource};
use crate::client::store::ClientResultStore;
use crate::client::with_timeout;
use crate::config::CacheConfig;
use crate::error::{PagerError, Result};
use crate::server::{SessionStatus, StatusSnapshot};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Progress notifications emitted while a query runs. Delivery is best
/// effort; a slow or absent receiver never stalls the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Execution accepted. `session_id` is `None` for inline results.
    Started { session_id: Option<String> },
    Progress { rows_materialized: usize, percentage: u8 },
    Completed { total_rows: usize },
    Cancelled { rows_materialized: usize },
    Failed { message: String },
}

/// What one status poll means for the loop.
#[derive(Debug)]
pub enum PollOutcome {
    /// Transient fault; poll again.
    Retry,
    /// Still materializing.
    Continue { rows_materialized: usize, percentage: u8 },
    /// Session is readable; stop polling.
    Ready(StatusSnapshot),
    /// The query will never become readable.
    Terminal(PagerError),
}

/// Classifies a status poll result. Pure: no I/O, no state.
pub fn classify_poll(result: Result<StatusSnapshot>) -> PollOutcome {
    let snapshot = match result {
        Err(e) if e.is_retryable() => return PollOutcome::Retry,
        Err(PagerError::NotFound(_)) => {
            return PollOutcome::Terminal(PagerError::not_found(
                "session expired; re-run the query",
            ))
        }
        Err(e) => return PollOutcome::Terminal(e),
        Ok(snapshot) => snapshot,
    };

    match snapshot.status {
        SessionStatus::Processing => PollOutcome::Continue {
            rows_materialized: snapshot.rows_materialized,
            percentage: snapshot.progress_percentage,
        },
        SessionStatus::Completed | SessionStatus::Cancelled => PollOutcome::Ready(snapshot),
        SessionStatus::Error => PollOutcome::Terminal(PagerError::execution(
            snapshot
                .error_message
                .unwrap_or_else(|| "query failed".to_string()),
        )),
        SessionStatus::SizeExceeded => PollOutcome::Terminal(PagerError::SizeExceeded {
            total_rows: snapshot
                .total_row_count
                .unwrap_or(snapshot.rows_materialized),
        }),
        SessionStatus::Expired => PollOutcome::Terminal(PagerError::not_found(
            "session expired; re-run the query",
        )),
    }
}

enum RunState {
    Executing { sql: String },
    Polling { session_id: String },
    Reading { source: Arc<dyn PageSource> },
}

/// Runs queries against a `SessionApi` and hands back readable stores.
pub struct ClientCacheOrchestrator {
    api: Arc<dyn SessionApi>,
    config: CacheConfig,
    current_session: Option<String>,
    events: Option<mpsc::Sender<PollEvent>>,
}

impl ClientCacheOrchestrator {
    pub fn new(api: Arc<dyn SessionApi>, config: CacheConfig) -> Self {
        Self {
            api,
            config,
            current_session: None,
            events: None,
        }
    }

    /// Attaches a progress event channel.
    pub fn with_events(mut self, sender: mpsc::Sender<PollEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Session backing the latest query, if it ran in server mode.
    pub fn session_id(&self) -> Option<&str> {
        self.current_session.as_deref()
    }

    /// Executes `sql` and returns a store over the result once readable.
    ///
    /// A prior session, if any, is cleaned up in a detached task; its
    /// failure is logged and never blocks the new query.
    pub async fn run_query(&mut self, sql: &str, page_size: usize) -> Result<ClientResultStore> {
        if let Some(prior) = self.current_session.take() {
            self.spawn_cleanup(prior);
        }

        let mut state = RunState::Executing {
            sql: sql.to_string(),
        };
        loop {
            state = match state {
                RunState::Executing { sql } => match self.call(self.api.execute(&sql)).await? {
                    ExecuteResponse::Inline { columns, rows, .. } => {
                        self.emit(PollEvent::Started { session_id: None });
                        self.emit(PollEvent::Completed {
                            total_rows: rows.len(),
                        });
                        RunState::Reading {
                            source: Arc::new(LocalPageSource::new(columns, rows)),
                        }
                    }
                    ExecuteResponse::Session { session_id } => {
                        debug!("Query running under session {}", session_id);
                        self.current_session = Some(session_id.clone());
                        self.emit(PollEvent::Started {
                            session_id: Some(session_id.clone()),
                        });
                        RunState::Polling { session_id }
                    }
                },

                RunState::Polling { session_id } => {
                    tokio::time::sleep(self.config.poll_interval()).await;
                    let result = self.call(self.api.session_status(&session_id)).await;
                    match classify_poll(result) {
                        PollOutcome::Retry => RunState::Polling { session_id },
                        PollOutcome::Continue {
                            rows_materialized,
                            percentage,
                        } => {
                            self.emit(PollEvent::Progress {
                                rows_materialized,
                                percentage,
                            });
                            RunState::Polling { session_id }
                        }
                        PollOutcome::Ready(snapshot) => {
                            match snapshot.status {
                                SessionStatus::Cancelled => self.emit(PollEvent::Cancelled {
                                    rows_materialized: snapshot.rows_materialized,
                                }),
                                _ => self.emit(PollEvent::Completed {
                                    total_rows: snapshot
                                        .total_row_count
                                        .unwrap_or(snapshot.rows_materialized),
                                }),
                            }
                            RunState::Reading {
                                source: Arc::new(ServerPageSource::new(
                                    Arc::clone(&self.api),
                                    session_id,
                                    self.config.request_timeout(),
                                )),
                            }
                        }
                        PollOutcome::Terminal(e) => {
                            self.emit(PollEvent::Failed {
                                message: e.to_string(),
                            });
                            return Err(e);
                        }
                    }
                }

                RunState::Reading { source } => {
                    return ClientResultStore::open(source, page_size).await;
                }
            };
        }
    }

    /// Requests cancellation of the running query. Advisory: the poll loop
    /// keeps going until it observes the Cancelled status, at which point
    /// `run_query` returns a store over the partial rows.
    pub async fn cancel(&self) -> Result<bool> {
        match &self.current_session {
            Some(session_id) => self.call(self.api.cancel(session_id)).await,
            None => Ok(false),
        }
    }

    /// Releases the current session without waiting for the result.
    pub fn discard(&mut self) {
        if let Some(session_id) = self.current_session.take() {
            self.spawn_cleanup(session_id);
        }
    }

    fn spawn_cleanup(&self, session_id: String) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.delete_session(&session_id).await {
                warn!("Failed to clean up session {}: {}", session_id, e);
            }
        });
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        with_timeout(self.config.request_timeout(), fut).await
    }

    fn emit(&self, event: PollEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.try_send(event);
        }
    }
}
