//! Row filter predicate.

use super::FilterMap;
use crate::db::{column_index, ColumnInfo, Row};

/// Returns true if the row satisfies every column filter.
///
/// A row qualifies iff for each column present in the filter map, its
/// stringified value is a member of that column's allowed set. An empty
/// allowed set therefore matches nothing, which is distinct from the column
/// being absent from the map (no filter at all).
pub fn row_matches(columns: &[ColumnInfo], row: &Row, filters: &FilterMap) -> bool {
    filters.iter().all(|(column, allowed)| {
        match column_index(columns, column) {
            Some(idx) => {
                let cell = row.get(idx).map(|v| v.to_display_string()).unwrap_or_default();
                allowed.contains(&cell)
            }
            // Unknown columns are rejected by request validation before the
            // predicate runs; treat defensively as a non-match here.
            None => false,
        }
    })
}
