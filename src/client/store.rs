//! Client-side read model over a page source.
//!
//! Accumulates pages for infinite scroll and owns the active filter and sort
//! state. Sort and filter changes never patch rows already loaded; they reset
//! to page 1 and reload through the source.

use crate::client::source::{PageQuery, PageSource};
use crate::db::{ColumnInfo, Row};
use crate::error::Result;
use crate::page::{FilterMap, SortSpec, ValueCount};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Accumulated result state the host renders from.
pub struct ClientResultStore {
    source: Arc<dyn PageSource>,
    columns: Vec<ColumnInfo>,
    rows: Vec<Row>,
    total_count: usize,
    current_page: usize,
    page_size: usize,
    filters: FilterMap,
    sort: Option<SortSpec>,
    has_more_data: bool,
    load_in_flight: bool,
}

impl std::fmt::Debug for ClientResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientResultStore")
            .field("columns", &self.columns)
            .field("rows", &self.rows.len())
            .field("total_count", &self.total_count)
            .field("current_page", &self.current_page)
            .field("page_size", &self.page_size)
            .field("filters", &self.filters)
            .field("sort", &self.sort)
            .field("has_more_data", &self.has_more_data)
            .field("load_in_flight", &self.load_in_flight)
            .finish_non_exhaustive()
    }
}

impl ClientResultStore {
    /// Opens a store over `source` and loads the first page.
    pub async fn open(source: Arc<dyn PageSource>, page_size: usize) -> Result<Self> {
        let mut store = Self {
            source,
            columns: Vec::new(),
            rows: Vec::new(),
            total_count: 0,
            current_page: 1,
            page_size,
            filters: FilterMap::new(),
            sort: None,
            has_more_data: false,
            load_in_flight: false,
        };
        store.reload().await?;
        Ok(store)
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Rows loaded so far, in display order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows surviving the current filters, across all pages.
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn has_more_data(&self) -> bool {
        self.has_more_data
    }

    pub fn filters(&self) -> &FilterMap {
        &self.filters
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Sorts by `column`: same column toggles direction, a new column starts
    /// ascending. Resets to page 1.
    pub async fn apply_sort(&mut self, column: &str) -> Result<()> {
        let sort = match &self.sort {
            Some(current) if current.column == column => SortSpec {
                column: column.to_string(),
                direction: current.direction.toggled(),
            },
            _ => SortSpec::ascending(column),
        };
        self.sort = Some(sort);
        self.reload().await
    }

    /// Replaces the filter on `column`; empty `values` removes it entirely.
    /// Resets to page 1.
    pub async fn apply_filter(&mut self, column: &str, values: Vec<String>) -> Result<()> {
        if values.is_empty() {
            self.filters.remove(column);
        } else {
            self.filters
                .insert(column.to_string(), values.into_iter().collect::<BTreeSet<_>>());
        }
        self.reload().await
    }

    /// Loads the next page and appends it.
    ///
    /// Returns `false` without touching the source when everything is loaded
    /// or a load is already in flight. On failure the in-flight flag clears
    /// and previously loaded rows stay intact.
    pub async fn load_more(&mut self) -> Result<bool> {
        if !self.has_more_data || self.load_in_flight {
            return Ok(false);
        }
        self.load_in_flight = true;

        let result = self.source.get_page(&self.query(self.current_page + 1)).await;
        self.load_in_flight = false;

        let response = result?;
        if !response.success {
            return Err(crate::error::PagerError::execution(
                response
                    .error_message
                    .unwrap_or_else(|| "page load failed".to_string()),
            ));
        }

        self.current_page += 1;
        self.total_count = response.total_count;
        self.rows.extend(response.rows);
        self.has_more_data = self.rows.len() < self.total_count;
        debug!(
            "Loaded page {}; {} of {} rows held",
            self.current_page,
            self.rows.len(),
            self.total_count
        );
        Ok(true)
    }

    /// Distinct values for a filter dropdown on `column`.
    pub async fn unique_values(&self, column: &str) -> Result<Vec<ValueCount>> {
        self.source.unique_values(column, &self.filters).await
    }

    /// Exports the full filtered/sorted result set as CSV bytes.
    pub async fn export_csv(&self) -> Result<Vec<u8>> {
        self.source.export_csv(&self.filters, self.sort.as_ref()).await
    }

    /// Replaces the accumulated rows with a fresh page 1.
    async fn reload(&mut self) -> Result<()> {
        let response = self.source.get_page(&self.query(1)).await?;
        if !response.success {
            return Err(crate::error::PagerError::execution(
                response
                    .error_message
                    .unwrap_or_else(|| "page load failed".to_string()),
            ));
        }
        self.columns = response.columns;
        self.rows = response.rows;
        self.total_count = response.total_count;
        self.current_page = 1;
        self.has_more_data = self.rows.len() < self.total_count;
        Ok(())
    }

    fn query(&self, page: usize) -> PageQuery {
        PageQuery {
            page,
            page_size: self.page_size,
            filters: self.filters.clone(),
            sort: self.sort.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_load_in_flight(&mut self, in_flight: bool) {
        self.load_in_flight = in_flight;
    }
}
