//! Shared pagination semantics.
//!
//! One implementation of the filter predicate, sort comparator, slicing,
//! unique-value lookup and CSV encoding, used by both the server-side page
//! reader and the client-side local mode. Keeping a single implementation is
//! what guarantees both execution paths return identical results.

mod filter;
mod sort;
mod view;

pub use filter::row_matches;
pub use sort::{compare_cells, sort_rows};
pub use view::{apply_view, paginate, unique_values, write_csv};

use crate::db::{ColumnInfo, Row};
use crate::error::{PagerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Column filters: each entry maps a column name to its allowed stringified
/// values. An absent column means "no filter"; a present-but-empty set means
/// "match nothing".
pub type FilterMap = BTreeMap<String, BTreeSet<String>>;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Returns the opposite direction.
    pub fn toggled(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// A sort specification: column plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Ascending sort on the given column.
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// Descending sort on the given column.
    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// A request for one page of a session's result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub session_id: String,
    pub page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub filters: FilterMap,
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

impl PageRequest {
    /// Creates an unfiltered, unsorted request for the given page.
    pub fn new(session_id: impl Into<String>, page: usize, page_size: usize) -> Self {
        Self {
            session_id: session_id.into(),
            page,
            page_size,
            filters: FilterMap::new(),
            sort: None,
        }
    }

    /// Validates page bounds.
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(PagerError::validation("page must be >= 1"));
        }
        if self.page_size < 1 {
            return Err(PagerError::validation("page_size must be >= 1"));
        }
        Ok(())
    }
}

/// A page of results, or the error that stands in for one.
///
/// Session-recorded execution errors travel in `error_message` with
/// `success = false`; they are data, not a transport fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub success: bool,
    pub rows: Vec<Row>,
    pub columns: Vec<ColumnInfo>,
    /// Rows surviving filtering, pre-pagination. Authoritative for display.
    pub total_count: usize,
    pub execution_time_ms: u64,
    pub error_message: Option<String>,
}

impl PageResponse {
    /// Builds a successful response.
    pub fn ok(
        rows: Vec<Row>,
        columns: Vec<ColumnInfo>,
        total_count: usize,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: true,
            rows,
            columns,
            total_count,
            execution_time_ms,
            error_message: None,
        }
    }

    /// Builds a failed response carrying an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            columns: Vec::new(),
            total_count: 0,
            execution_time_ms: 0,
            error_message: Some(message.into()),
        }
    }
}

/// A distinct column value with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

/// Builds a single-column filter from string values.
pub fn filter_of(column: impl Into<String>, values: &[&str]) -> FilterMap {
    let mut filters = FilterMap::new();
    filters.insert(
        column.into(),
        values.iter().map(|v| v.to_string()).collect(),
    );
    filters
}
