//! The session API surface.
//!
//! `SessionApi` mirrors the calls a remote cache server would expose.
//! `InProcessApi` implements it directly over the executor, manager and
//! reader, which is how embedding hosts and the test suite drive the system.

use crate::db::{ColumnInfo, QueryExecutor, Row};
use crate::error::{PagerError, Result};
use crate::page::{FilterMap, PageRequest, PageResponse, SortSpec, ValueCount};
use crate::server::{ResultPageReader, SessionCacheManager, StatusSnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of submitting a query for execution.
#[derive(Debug, Clone)]
pub enum ExecuteResponse {
    /// Small result returned directly; no session was created.
    Inline {
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
        execution_time_ms: u64,
    },
    /// Result is materializing server-side under this session id.
    Session { session_id: String },
}

/// Calls against the result cache, independent of transport.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// Submits a query. Small results with a known total come back inline;
    /// everything else gets a session.
    async fn execute(&self, sql: &str) -> Result<ExecuteResponse>;

    /// Returns the session's status snapshot.
    async fn session_status(&self, session_id: &str) -> Result<StatusSnapshot>;

    /// Reads one page. Session-recorded execution errors come back as a
    /// failed `PageResponse`, not as an `Err`.
    async fn read(&self, request: &PageRequest) -> Result<PageResponse>;

    /// Distinct values of `column` under the filters on other columns.
    async fn unique_values(
        &self,
        session_id: &str,
        column: &str,
        filters: &FilterMap,
    ) -> Result<Vec<ValueCount>>;

    /// Requests cancellation. Returns whether the request was accepted.
    async fn cancel(&self, session_id: &str) -> Result<bool>;

    /// Releases one session. Idempotent.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Releases every session this client owns. Returns how many.
    async fn delete_owner_sessions(&self) -> Result<usize>;

    /// Exports the filtered/sorted result set as CSV bytes.
    async fn download_csv(
        &self,
        session_id: &str,
        filters: &FilterMap,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<u8>>;
}

/// In-process implementation over the server components.
pub struct InProcessApi {
    executor: Arc<dyn QueryExecutor>,
    manager: Arc<SessionCacheManager>,
    reader: ResultPageReader,
    owner: String,
    inline_row_limit: usize,
}

impl InProcessApi {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        manager: Arc<SessionCacheManager>,
        owner: impl Into<String>,
        inline_row_limit: usize,
    ) -> Self {
        let reader = ResultPageReader::new(manager.clone());
        Self {
            executor,
            manager,
            reader,
            owner: owner.into(),
            inline_row_limit,
        }
    }
}

#[async_trait]
impl SessionApi for InProcessApi {
    async fn execute(&self, sql: &str) -> Result<ExecuteResponse> {
        let start = Instant::now();
        let stream = self.executor.execute(sql).await?;

        // Inline only when the backend knows the total up front; otherwise
        // we would have to buffer an unbounded stream to find out.
        match stream.total_rows {
            Some(total) if total <= self.inline_row_limit => {
                let columns = stream.columns.clone();
                let rows = stream.collect_rows().await?;
                Ok(ExecuteResponse::Inline {
                    columns,
                    rows,
                    execution_time_ms: start.elapsed().as_millis() as u64,
                })
            }
            _ => {
                let session_id = self.manager.create_session(&self.owner, stream);
                Ok(ExecuteResponse::Session { session_id })
            }
        }
    }

    async fn session_status(&self, session_id: &str) -> Result<StatusSnapshot> {
        self.manager.get_status(session_id)
    }

    async fn read(&self, request: &PageRequest) -> Result<PageResponse> {
        match self.reader.read(request) {
            Ok(response) => Ok(response),
            // The query's own failure is data to the caller, not a fault.
            Err(PagerError::Execution(message)) => Ok(PageResponse::error(message)),
            Err(e) => Err(e),
        }
    }

    async fn unique_values(
        &self,
        session_id: &str,
        column: &str,
        filters: &FilterMap,
    ) -> Result<Vec<ValueCount>> {
        self.reader.unique_values(session_id, column, filters)
    }

    async fn cancel(&self, session_id: &str) -> Result<bool> {
        Ok(self.manager.cancel(session_id))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.manager.cleanup(session_id);
        Ok(())
    }

    async fn delete_owner_sessions(&self) -> Result<usize> {
        Ok(self.manager.cleanup_owner(&self.owner))
    }

    async fn download_csv(
        &self,
        session_id: &str,
        filters: &FilterMap,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<u8>> {
        self.reader.export_csv(session_id, filters, sort)
    }
}
