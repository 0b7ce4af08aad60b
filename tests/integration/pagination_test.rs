//! Filtering, sorting and pagination semantics against a cached session.

use crate::integration::{fast_config, stack, wait_for_terminal};
use db_pager::client::{ExecuteResponse, SessionApi};
use db_pager::db::{MockQueryExecutor, Value};
use db_pager::page::{filter_of, FilterMap, PageRequest, SortSpec};
use pretty_assertions::assert_eq;
use std::sync::Arc;

async fn completed_session(rows: usize) -> (Arc<dyn SessionApi>, String) {
    let (_, api) = stack(MockQueryExecutor::new(rows, 100), fast_config());
    let ExecuteResponse::Session { session_id } = api.execute("SELECT * FROM orders").await.unwrap()
    else {
        panic!("expected a session");
    };
    wait_for_terminal(&api, &session_id).await;
    (api, session_id)
}

fn request(
    session_id: &str,
    page: usize,
    page_size: usize,
    filters: FilterMap,
    sort: Option<SortSpec>,
) -> PageRequest {
    let mut request = PageRequest::new(session_id, page, page_size);
    request.filters = filters;
    request.sort = sort;
    request
}

#[tokio::test]
async fn test_identical_requests_are_idempotent() {
    let (api, id) = completed_session(500).await;
    let req = request(
        &id,
        3,
        50,
        filter_of("status", &["ACTIVE", "INACTIVE"]),
        Some(SortSpec::descending("amount")),
    );

    let first = api.read(&req).await.unwrap();
    let second = api.read(&req).await.unwrap();
    assert_eq!(first.rows, second.rows);
    assert_eq!(first.total_count, second.total_count);
}

#[tokio::test]
async fn test_filtered_pages_partition_the_filtered_set() {
    let (api, id) = completed_session(100).await;
    let filters = filter_of("status", &["ACTIVE"]);

    // 4 ACTIVE rows in every 10 mock rows
    let total = api
        .read(&request(&id, 1, 10, filters.clone(), None))
        .await
        .unwrap()
        .total_count;
    assert_eq!(total, 40);

    let mut seen_ids = Vec::new();
    let mut page = 1;
    loop {
        let response = api
            .read(&request(&id, page, 10, filters.clone(), None))
            .await
            .unwrap();
        assert_eq!(response.total_count, total);
        if response.rows.is_empty() {
            break;
        }
        for row in &response.rows {
            assert_eq!(row[1], Value::from("ACTIVE"));
            seen_ids.push(row[0].clone());
        }
        page += 1;
    }

    // Pages are disjoint and cover every matching row exactly once.
    assert_eq!(seen_ids.len(), total);
    let mut deduped = seen_ids.clone();
    deduped.dedup();
    assert_eq!(deduped.len(), total);
}

#[tokio::test]
async fn test_empty_filter_set_matches_nothing() {
    let (api, id) = completed_session(50).await;
    let response = api
        .read(&request(&id, 1, 10, filter_of("status", &[]), None))
        .await
        .unwrap();
    assert_eq!(response.total_count, 0);
    assert!(response.rows.is_empty());
}

#[tokio::test]
async fn test_sort_is_stable_within_equal_keys() {
    let (api, id) = completed_session(100).await;
    let response = api
        .read(&request(&id, 1, 100, FilterMap::new(), Some(SortSpec::ascending("status"))))
        .await
        .unwrap();

    // Within each status group, the original id order is preserved.
    let mut last_id_per_status: std::collections::HashMap<String, i64> =
        std::collections::HashMap::new();
    for row in &response.rows {
        let status = row[1].to_display_string();
        let Value::Int(id) = row[0] else {
            panic!("expected integer id");
        };
        if let Some(last) = last_id_per_status.get(&status) {
            assert!(id > *last, "unstable order within status {status}");
        }
        last_id_per_status.insert(status, id);
    }
}

#[tokio::test]
async fn test_nulls_sort_last_in_both_directions() {
    let (api, id) = completed_session(50).await;

    for direction in [SortSpec::ascending("status"), SortSpec::descending("status")] {
        let response = api
            .read(&request(&id, 1, 50, FilterMap::new(), Some(direction)))
            .await
            .unwrap();
        let first_null = response
            .rows
            .iter()
            .position(|r| r[1].is_null())
            .expect("mock data contains nulls");
        assert!(
            response.rows[first_null..].iter().all(|r| r[1].is_null()),
            "nulls must form a trailing block"
        );
    }
}

#[tokio::test]
async fn test_numeric_sort_compares_by_value() {
    let (api, id) = completed_session(120).await;
    let response = api
        .read(&request(&id, 1, 5, FilterMap::new(), Some(SortSpec::descending("amount"))))
        .await
        .unwrap();

    // Lexicographic order would put "99" above "120"; numeric order must not.
    assert_eq!(response.rows[0][0], Value::Int(120));
    assert_eq!(response.rows[1][0], Value::Int(119));
}

#[tokio::test]
async fn test_sort_applies_before_pagination() {
    let (api, id) = completed_session(100).await;
    let page2 = api
        .read(&request(&id, 2, 10, FilterMap::new(), Some(SortSpec::descending("id"))))
        .await
        .unwrap();
    assert_eq!(page2.rows[0][0], Value::Int(90));
    assert_eq!(page2.rows[9][0], Value::Int(81));
}

#[tokio::test]
async fn test_unique_values_counts_and_own_filter_exclusion() {
    let (api, id) = completed_session(100).await;

    let values = api
        .unique_values(&id, "status", &FilterMap::new())
        .await
        .unwrap();
    let find = |name: &str| values.iter().find(|v| v.value == name).map(|v| v.count);
    assert_eq!(find("ACTIVE"), Some(40));
    assert_eq!(find("INACTIVE"), Some(40));
    // Nulls appear under the empty display string
    assert_eq!(find(""), Some(20));

    // A filter on status itself does not narrow its own dropdown.
    let narrowed = api
        .unique_values(&id, "status", &filter_of("status", &["ACTIVE"]))
        .await
        .unwrap();
    assert_eq!(narrowed.len(), values.len());
}

#[tokio::test]
async fn test_csv_export_matches_filtered_sorted_view() {
    let (api, id) = completed_session(30).await;
    let bytes = api
        .download_csv(
            &id,
            &filter_of("status", &["ACTIVE"]),
            Some(&SortSpec::descending("id")),
        )
        .await
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "id,status,amount");
    // 12 ACTIVE rows in 30
    assert_eq!(lines.len(), 13);
    let ids: Vec<i64> = lines[1..]
        .iter()
        .map(|l| l.split(',').next().unwrap().parse().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(ids, sorted);
}

#[tokio::test]
async fn test_unknown_filter_column_is_rejected() {
    let (api, id) = completed_session(10).await;
    let result = api
        .read(&request(&id, 1, 10, filter_of("no_such_column", &["x"]), None))
        .await;
    assert!(result.is_err());
}
