//! Paged reads against cached sessions.
//!
//! Serves filtered/sorted/paginated pages, unique-value lookups and CSV
//! export. All row semantics delegate to the shared `page` module so server
//! reads and client local mode cannot drift apart.

use crate::error::{PagerError, Result};
use crate::page::{self, FilterMap, PageRequest, PageResponse, SortSpec, ValueCount};
use crate::server::manager::SessionCacheManager;
use crate::server::session::{SessionEntry, SessionStatus};
use std::sync::Arc;
use std::time::Instant;

/// Reads pages out of completed or cancelled sessions.
#[derive(Clone)]
pub struct ResultPageReader {
    manager: Arc<SessionCacheManager>,
}

impl ResultPageReader {
    /// Creates a reader over the given session cache.
    pub fn new(manager: Arc<SessionCacheManager>) -> Self {
        Self { manager }
    }

    /// Serves one page of a session's result set.
    ///
    /// `total_count` in the response counts rows surviving the filters,
    /// before pagination; it is distinct from the session's unfiltered total.
    pub fn read(&self, request: &PageRequest) -> Result<PageResponse> {
        request.validate()?;
        let entry = self.readable_session(&request.session_id)?;

        let start = Instant::now();
        let (rows, total_count) = entry.with_rows(|rows| -> Result<(Vec<_>, usize)> {
            let view = page::apply_view(
                entry.columns(),
                rows,
                &request.filters,
                request.sort.as_ref(),
            )?;
            let total = view.len();
            Ok((page::paginate(&view, request.page, request.page_size), total))
        })?;

        Ok(PageResponse::ok(
            rows,
            entry.columns().to_vec(),
            total_count,
            start.elapsed().as_millis() as u64,
        ))
    }

    /// Returns the distinct values of `column` with counts, honoring the
    /// filters on other columns only.
    pub fn unique_values(
        &self,
        session_id: &str,
        column: &str,
        filters: &FilterMap,
    ) -> Result<Vec<ValueCount>> {
        let entry = self.readable_session(session_id)?;
        entry.with_rows(|rows| page::unique_values(entry.columns(), rows, column, filters))
    }

    /// Exports the filtered/sorted result set as one CSV byte stream,
    /// unpaginated. Also available for size-exceeded sessions, which serve
    /// their cached prefix.
    pub fn export_csv(
        &self,
        session_id: &str,
        filters: &FilterMap,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<u8>> {
        let entry = self.manager.session(session_id)?;
        match entry.status() {
            SessionStatus::Processing => {
                return Err(PagerError::not_ready(format!(
                    "session {session_id} is still materializing"
                )))
            }
            SessionStatus::Error => {
                return Err(PagerError::execution(
                    entry.error_message().unwrap_or_else(|| "query failed".to_string()),
                ))
            }
            status if status.is_exportable() => {}
            status => {
                return Err(PagerError::not_found(format!(
                    "session {session_id} is {status}"
                )))
            }
        }

        entry.with_rows(|rows| {
            let view = page::apply_view(entry.columns(), rows, filters, sort)?;
            page::write_csv(entry.columns(), &view)
        })
    }

    /// Looks up a session and gates on its status for paged reads.
    fn readable_session(&self, session_id: &str) -> Result<Arc<SessionEntry>> {
        let entry = self.manager.session(session_id)?;
        match entry.status() {
            SessionStatus::Processing => Err(PagerError::not_ready(format!(
                "session {session_id} is still materializing"
            ))),
            SessionStatus::Error => Err(PagerError::execution(
                entry.error_message().unwrap_or_else(|| "query failed".to_string()),
            )),
            SessionStatus::SizeExceeded => Err(PagerError::SizeExceeded {
                total_rows: entry
                    .snapshot()
                    .total_row_count
                    .unwrap_or_else(|| entry.cached_row_count()),
            }),
            status if status.is_readable() => Ok(entry),
            status => Err(PagerError::not_found(format!(
                "session {session_id} is {status}"
            ))),
        }
    }
}
