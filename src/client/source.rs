//! Page sources for the two execution paths.
//!
//! `ServerPageSource` reads from a cached session through the API;
//! `LocalPageSource` holds an inline result and serves the same operations
//! over it. Both delegate row semantics to `page::`, so a page looks the same
//! no matter which path produced it.

use crate::client::api::SessionApi;
use crate::error::Result;
use crate::page::{
    self, FilterMap, PageRequest, PageResponse, SortSpec, ValueCount,
};
use crate::db::{ColumnInfo, Row};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Page parameters without a session id; the source knows where its rows are.
#[derive(Debug, Clone, Default)]
pub struct PageQuery {
    pub page: usize,
    pub page_size: usize,
    pub filters: FilterMap,
    pub sort: Option<SortSpec>,
}

/// Where a result store gets its pages from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get_page(&self, query: &PageQuery) -> Result<PageResponse>;

    async fn unique_values(&self, column: &str, filters: &FilterMap) -> Result<Vec<ValueCount>>;

    async fn export_csv(&self, filters: &FilterMap, sort: Option<&SortSpec>) -> Result<Vec<u8>>;
}

/// Serves pages from a server-side session, with a bounded timeout per call.
pub struct ServerPageSource {
    api: Arc<dyn SessionApi>,
    session_id: String,
    request_timeout: Duration,
}

impl ServerPageSource {
    pub fn new(api: Arc<dyn SessionApi>, session_id: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            api,
            session_id: session_id.into(),
            request_timeout,
        }
    }

    /// The session this source reads from.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait]
impl PageSource for ServerPageSource {
    async fn get_page(&self, query: &PageQuery) -> Result<PageResponse> {
        let mut request = PageRequest::new(&self.session_id, query.page, query.page_size);
        request.filters = query.filters.clone();
        request.sort = query.sort.clone();
        crate::client::with_timeout(self.request_timeout, self.api.read(&request)).await
    }

    async fn unique_values(&self, column: &str, filters: &FilterMap) -> Result<Vec<ValueCount>> {
        crate::client::with_timeout(
            self.request_timeout,
            self.api.unique_values(&self.session_id, column, filters),
        )
        .await
    }

    async fn export_csv(&self, filters: &FilterMap, sort: Option<&SortSpec>) -> Result<Vec<u8>> {
        crate::client::with_timeout(
            self.request_timeout,
            self.api.download_csv(&self.session_id, filters, sort),
        )
        .await
    }
}

/// Serves pages from an inline result held in client memory.
pub struct LocalPageSource {
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
}

impl LocalPageSource {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }
}

#[async_trait]
impl PageSource for LocalPageSource {
    async fn get_page(&self, query: &PageQuery) -> Result<PageResponse> {
        let start = Instant::now();
        let view = page::apply_view(&self.columns, &self.rows, &query.filters, query.sort.as_ref())?;
        let total_count = view.len();
        let rows = page::paginate(&view, query.page, query.page_size);
        Ok(PageResponse::ok(
            rows,
            self.columns.clone(),
            total_count,
            start.elapsed().as_millis() as u64,
        ))
    }

    async fn unique_values(&self, column: &str, filters: &FilterMap) -> Result<Vec<ValueCount>> {
        page::unique_values(&self.columns, &self.rows, column, filters)
    }

    async fn export_csv(&self, filters: &FilterMap, sort: Option<&SortSpec>) -> Result<Vec<u8>> {
        let view = page::apply_view(&self.columns, &self.rows, filters, sort)?;
        page::write_csv(&self.columns, &view)
    }
}
