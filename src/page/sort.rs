//! Cell comparator and stable row sort.

use super::SortDirection;
use crate::db::{Row, Value};
use std::cmp::Ordering;

/// Compares two non-null cells.
///
/// When both stringified values parse as numbers they compare numerically,
/// otherwise lexicographically (case-sensitive).
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    let sa = a.to_display_string();
    let sb = b.to_display_string();

    match (sa.parse::<f64>(), sb.parse::<f64>()) {
        (Ok(na), Ok(nb)) => na.partial_cmp(&nb).unwrap_or(Ordering::Equal),
        _ => sa.cmp(&sb),
    }
}

/// Sorts rows in place by the given column index.
///
/// The sort is stable, so equal-key rows retain materialization order. Nulls
/// sort last regardless of direction.
pub fn sort_rows(rows: &mut [Row], column_idx: usize, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let va = a.get(column_idx).unwrap_or(&Value::Null);
        let vb = b.get(column_idx).unwrap_or(&Value::Null);

        match (va.is_null(), vb.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = compare_cells(va, vb);
                match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            }
        }
    });
}
