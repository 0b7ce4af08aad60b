//! Session lifecycle through the API surface.

use crate::integration::{fast_config, stack, wait_for_terminal};
use db_pager::client::{ExecuteResponse, SessionApi};
use db_pager::config::CacheConfig;
use db_pager::db::MockQueryExecutor;
use db_pager::error::PagerError;
use db_pager::page::PageRequest;
use db_pager::server::SessionStatus;
use pretty_assertions::assert_eq;
use std::time::Duration;

async fn session_id(api: &std::sync::Arc<dyn SessionApi>, sql: &str) -> String {
    match api.execute(sql).await.unwrap() {
        ExecuteResponse::Session { session_id } => session_id,
        other => panic!("expected a session, got {other:?}"),
    }
}

#[tokio::test]
async fn test_session_materializes_to_completed() {
    let (_, api) = stack(MockQueryExecutor::new(2000, 100), fast_config());
    let id = session_id(&api, "SELECT * FROM orders").await;

    let snapshot = wait_for_terminal(&api, &id).await;
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.rows_materialized, 2000);
    assert_eq!(snapshot.total_row_count, Some(2000));
    assert_eq!(snapshot.progress_percentage, 100);
}

#[tokio::test]
async fn test_status_progresses_monotonically() {
    let (_, api) = stack(
        MockQueryExecutor::new(1000, 100).with_batch_delay(Duration::from_millis(5)),
        fast_config(),
    );
    let id = session_id(&api, "SELECT * FROM orders").await;

    let mut last_rows = 0;
    let mut last_pct = 0;
    loop {
        let snapshot = api.session_status(&id).await.unwrap();
        assert!(snapshot.rows_materialized >= last_rows);
        assert!(snapshot.progress_percentage >= last_pct);
        last_rows = snapshot.rows_materialized;
        last_pct = snapshot.progress_percentage;
        if snapshot.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(last_pct, 100);
}

#[tokio::test]
async fn test_cancel_mid_flight_keeps_partial_rows_readable() {
    let (_, api) = stack(
        MockQueryExecutor::new(1000, 50).with_batch_delay(Duration::from_millis(10)),
        fast_config(),
    );
    let id = session_id(&api, "SELECT * FROM orders").await;

    tokio::time::sleep(Duration::from_millis(45)).await;
    assert!(api.cancel(&id).await.unwrap());

    let snapshot = wait_for_terminal(&api, &id).await;
    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert!(snapshot.rows_materialized < 1000);

    // Partial rows page normally.
    let response = api.read(&PageRequest::new(&id, 1, 10)).await.unwrap();
    assert!(response.success);
    assert_eq!(response.rows.len(), 10);
    assert_eq!(response.total_count, snapshot.rows_materialized);
}

#[tokio::test]
async fn test_cancel_after_completion_is_rejected() {
    let (_, api) = stack(MockQueryExecutor::new(100, 50), fast_config());
    let id = session_id(&api, "SELECT * FROM orders").await;
    wait_for_terminal(&api, &id).await;

    assert!(!api.cancel(&id).await.unwrap());
    let snapshot = api.session_status(&id).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_query_error_is_reported_as_status_not_failure() {
    let (_, api) = stack(MockQueryExecutor::new(500, 100).failing_after(2), fast_config());
    let id = session_id(&api, "SELECT * FROM nope").await;

    let snapshot = wait_for_terminal(&api, &id).await;
    assert_eq!(snapshot.status, SessionStatus::Error);
    assert!(snapshot.error_message.is_some());

    // Reads report the failure as data, not as a transport error.
    let response = api.read(&PageRequest::new(&id, 1, 10)).await.unwrap();
    assert!(!response.success);
    assert_eq!(
        response.error_message.as_deref(),
        snapshot.error_message.as_deref()
    );
}

#[tokio::test]
async fn test_size_exceeded_counts_full_total() {
    let config = CacheConfig {
        max_cached_rows: 100,
        ..fast_config()
    };
    let (_, api) = stack(MockQueryExecutor::new(350, 40), config);
    let id = session_id(&api, "SELECT * FROM orders").await;

    let snapshot = wait_for_terminal(&api, &id).await;
    assert_eq!(snapshot.status, SessionStatus::SizeExceeded);
    assert_eq!(snapshot.total_row_count, Some(350));

    match api.read(&PageRequest::new(&id, 1, 10)).await {
        Err(PagerError::SizeExceeded { total_rows }) => assert_eq!(total_rows, 350),
        other => panic!("expected SizeExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_session_is_idempotent_and_final() {
    let (_, api) = stack(MockQueryExecutor::new(100, 50), fast_config());
    let id = session_id(&api, "SELECT * FROM orders").await;
    wait_for_terminal(&api, &id).await;

    api.delete_session(&id).await.unwrap();
    api.delete_session(&id).await.unwrap();

    assert!(matches!(
        api.session_status(&id).await,
        Err(PagerError::NotFound(_))
    ));
    assert!(matches!(
        api.read(&PageRequest::new(&id, 1, 10)).await,
        Err(PagerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_owner_cap_evicts_oldest_session() {
    let config = CacheConfig {
        max_sessions_per_owner: 2,
        ..fast_config()
    };
    let (manager, api) = stack(MockQueryExecutor::new(50, 50), config);

    let first = session_id(&api, "SELECT 1").await;
    let second = session_id(&api, "SELECT 2").await;
    wait_for_terminal(&api, &first).await;
    wait_for_terminal(&api, &second).await;

    // Touch the first so the second is least recently used.
    api.session_status(&first).await.unwrap();
    let third = session_id(&api, "SELECT 3").await;

    assert_eq!(manager.session_count(), 2);
    assert!(api.session_status(&first).await.is_ok());
    assert!(api.session_status(&second).await.is_err());
    assert!(api.session_status(&third).await.is_ok());
}

#[tokio::test]
async fn test_ttl_sweep_expires_idle_sessions() {
    let config = CacheConfig {
        session_ttl_secs: 0,
        ..fast_config()
    };
    let (manager, api) = stack(MockQueryExecutor::new(50, 50), config);
    let id = session_id(&api, "SELECT * FROM orders").await;
    wait_for_terminal(&api, &id).await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.sweep_expired();

    assert!(matches!(
        api.session_status(&id).await,
        Err(PagerError::NotFound(_))
    ));
}
