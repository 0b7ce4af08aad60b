//! Filtered/sorted views over a cached row set: page slicing, unique-value
//! lookup and CSV encoding.

use super::{row_matches, sort_rows, FilterMap, SortSpec, ValueCount};
use crate::db::{column_index, ColumnInfo, Row};
use crate::error::{PagerError, Result};
use std::collections::HashMap;

/// Applies filters and sort to a row set, returning the surviving rows in
/// display order.
///
/// Fails with a validation error when a filter or sort column does not exist.
/// Without a sort spec, materialization order is preserved.
pub fn apply_view(
    columns: &[ColumnInfo],
    rows: &[Row],
    filters: &FilterMap,
    sort: Option<&SortSpec>,
) -> Result<Vec<Row>> {
    for column in filters.keys() {
        if column_index(columns, column).is_none() {
            return Err(PagerError::validation(format!(
                "unknown filter column '{column}'"
            )));
        }
    }

    let mut view: Vec<Row> = rows
        .iter()
        .filter(|row| row_matches(columns, row, filters))
        .cloned()
        .collect();

    if let Some(spec) = sort {
        let idx = column_index(columns, &spec.column).ok_or_else(|| {
            PagerError::validation(format!("unknown sort column '{}'", spec.column))
        })?;
        sort_rows(&mut view, idx, spec.direction);
    }

    Ok(view)
}

/// Slices one page out of a view. Page numbers are 1-based; a page past the
/// end is empty.
pub fn paginate(rows: &[Row], page: usize, page_size: usize) -> Vec<Row> {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    if start >= rows.len() {
        return Vec::new();
    }
    let end = (start + page_size).min(rows.len());
    rows[start..end].to_vec()
}

/// Returns the distinct stringified values of `column` with occurrence
/// counts, honoring the filters on *other* columns only.
///
/// Excluding the target column's own filter lets a filter UI offer values the
/// user could widen back out to. Values sort numerically when every distinct
/// value parses as a number, else lexicographically.
pub fn unique_values(
    columns: &[ColumnInfo],
    rows: &[Row],
    column: &str,
    filters: &FilterMap,
) -> Result<Vec<ValueCount>> {
    let target_idx = column_index(columns, column)
        .ok_or_else(|| PagerError::validation(format!("unknown column '{column}'")))?;

    let mut other_filters = filters.clone();
    other_filters.remove(column);

    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in rows {
        if row_matches(columns, row, &other_filters) {
            let cell = row
                .get(target_idx)
                .map(|v| v.to_display_string())
                .unwrap_or_default();
            *counts.entry(cell).or_insert(0) += 1;
        }
    }

    let mut values: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();

    let all_numeric = !values.is_empty() && values.iter().all(|v| v.value.parse::<f64>().is_ok());
    if all_numeric {
        values.sort_by(|a, b| {
            let na: f64 = a.value.parse().unwrap_or(f64::MAX);
            let nb: f64 = b.value.parse().unwrap_or(f64::MAX);
            na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        values.sort_by(|a, b| a.value.cmp(&b.value));
    }

    Ok(values)
}

/// Encodes a view as CSV: header row of column names, then every row's
/// stringified cells.
pub fn write_csv(columns: &[ColumnInfo], rows: &[Row]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    writer
        .write_record(&header)
        .map_err(|e| PagerError::internal(format!("csv write failed: {e}")))?;

    for row in rows {
        let record: Vec<String> = row.iter().map(|v| v.to_display_string()).collect();
        writer
            .write_record(&record)
            .map_err(|e| PagerError::internal(format!("csv write failed: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| PagerError::internal(format!("csv flush failed: {e}")))
}
