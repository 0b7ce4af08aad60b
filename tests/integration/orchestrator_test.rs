//! End-to-end orchestrator flows: poll, scroll, cancel, cleanup, retry.

use crate::integration::{fast_config, orchestrator, stack};
use async_trait::async_trait;
use db_pager::client::{
    ClientCacheOrchestrator, ExecuteResponse, PollEvent, SessionApi,
};
use db_pager::db::{MockQueryExecutor, Value};
use db_pager::error::{PagerError, Result};
use db_pager::page::{FilterMap, PageRequest, PageResponse, SortSpec, ValueCount};
use db_pager::server::StatusSnapshot;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_ten_thousand_row_scroll_scenario() {
    let mut orchestrator = orchestrator(MockQueryExecutor::new(10_000, 500));
    let mut store = orchestrator
        .run_query("SELECT * FROM orders", 100)
        .await
        .unwrap();

    assert_eq!(store.total_count(), 10_000);
    assert_eq!(store.rows().len(), 100);
    assert_eq!(store.rows()[0][0], Value::Int(1));

    // Drain the remaining 99 pages.
    let mut loads = 0;
    while store.load_more().await.unwrap() {
        loads += 1;
    }
    assert_eq!(loads, 99);
    assert_eq!(store.rows().len(), 10_000);
    assert_eq!(store.current_page(), 100);
    assert!(!store.has_more_data());
    assert_eq!(store.rows()[9_999][0], Value::Int(10_000));
}

#[tokio::test]
async fn test_filter_then_sort_scenario() {
    let mut orchestrator = orchestrator(MockQueryExecutor::new(10_000, 500));
    let mut store = orchestrator
        .run_query("SELECT * FROM orders", 100)
        .await
        .unwrap();

    // 4 in 10 mock rows are ACTIVE.
    store
        .apply_filter("status", vec!["ACTIVE".to_string()])
        .await
        .unwrap();
    assert_eq!(store.total_count(), 4000);
    assert_eq!(store.current_page(), 1);
    assert!(store
        .rows()
        .iter()
        .all(|r| r[1].to_display_string() == "ACTIVE"));

    // Toggling the sort lands the maximum amount among matching rows first.
    store.apply_sort("amount").await.unwrap();
    store.apply_sort("amount").await.unwrap();
    assert_eq!(store.rows()[0][0], Value::Int(9_999));
    assert_eq!(store.total_count(), 4000);
}

#[tokio::test]
async fn test_small_known_result_stays_local() {
    let mut orchestrator = orchestrator(MockQueryExecutor::new(42, 10).with_known_total());
    let mut store = orchestrator
        .run_query("SELECT * FROM small", 100)
        .await
        .unwrap();

    assert!(orchestrator.session_id().is_none());
    assert_eq!(store.total_count(), 42);
    assert_eq!(store.rows().len(), 42);
    assert!(!store.has_more_data());

    // Local mode supports the same operations as server mode.
    store.apply_sort("amount").await.unwrap();
    store.apply_sort("amount").await.unwrap();
    assert_eq!(store.rows()[0][0], Value::Int(42));
    let values = store.unique_values("status").await.unwrap();
    assert!(!values.is_empty());
}

#[tokio::test]
async fn test_cancel_then_read_preserves_partial_rows() {
    let (_, api) = stack(
        MockQueryExecutor::new(2000, 50).with_batch_delay(Duration::from_millis(10)),
        fast_config(),
    );
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator =
        ClientCacheOrchestrator::new(Arc::clone(&api), fast_config()).with_events(tx);

    let handle = tokio::spawn(async move {
        let mut orchestrator = orchestrator;
        orchestrator.run_query("SELECT * FROM orders", 2000).await
    });

    let session_id = loop {
        match rx.recv().await {
            Some(PollEvent::Started {
                session_id: Some(id),
            }) => break id,
            Some(_) => continue,
            None => panic!("event channel closed before start"),
        }
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(api.cancel(&session_id).await.unwrap());

    let store = handle.await.unwrap().unwrap();
    assert!(!store.rows().is_empty());
    assert!(store.rows().len() < 2000);
    // The prefix is the original row order, uncorrupted.
    assert_eq!(store.rows()[0][0], Value::Int(1));
}

#[tokio::test]
async fn test_new_execute_fires_cleanup_of_prior_session() {
    let (_, api) = stack(MockQueryExecutor::new(500, 100), fast_config());
    let mut orchestrator = ClientCacheOrchestrator::new(Arc::clone(&api), fast_config());

    orchestrator.run_query("SELECT * FROM a", 100).await.unwrap();
    let first = orchestrator.session_id().unwrap().to_string();

    // The new query is served while the old session is torn down in the
    // background.
    let store = orchestrator.run_query("SELECT * FROM b", 100).await.unwrap();
    assert_eq!(store.rows().len(), 100);

    for _ in 0..100 {
        if api.session_status(&first).await.is_err() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(matches!(
        api.session_status(&first).await,
        Err(PagerError::NotFound(_))
    ));
}

/// Fails `session_status` a fixed number of times with a transient error,
/// then delegates.
struct FlakyApi {
    inner: Arc<dyn SessionApi>,
    failures_left: AtomicUsize,
}

#[async_trait]
impl SessionApi for FlakyApi {
    async fn execute(&self, sql: &str) -> Result<ExecuteResponse> {
        self.inner.execute(sql).await
    }

    async fn session_status(&self, session_id: &str) -> Result<StatusSnapshot> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PagerError::transient("connection reset by peer"));
        }
        self.inner.session_status(session_id).await
    }

    async fn read(&self, request: &PageRequest) -> Result<PageResponse> {
        self.inner.read(request).await
    }

    async fn unique_values(
        &self,
        session_id: &str,
        column: &str,
        filters: &FilterMap,
    ) -> Result<Vec<ValueCount>> {
        self.inner.unique_values(session_id, column, filters).await
    }

    async fn cancel(&self, session_id: &str) -> Result<bool> {
        self.inner.cancel(session_id).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.inner.delete_session(session_id).await
    }

    async fn delete_owner_sessions(&self) -> Result<usize> {
        self.inner.delete_owner_sessions().await
    }

    async fn download_csv(
        &self,
        session_id: &str,
        filters: &FilterMap,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<u8>> {
        self.inner.download_csv(session_id, filters, sort).await
    }
}

#[tokio::test]
async fn test_transient_poll_failures_are_retried_silently() {
    let (_, inner) = stack(MockQueryExecutor::new(1000, 100), fast_config());
    let api: Arc<dyn SessionApi> = Arc::new(FlakyApi {
        inner,
        failures_left: AtomicUsize::new(3),
    });

    let mut orchestrator = ClientCacheOrchestrator::new(api, fast_config());
    let store = orchestrator
        .run_query("SELECT * FROM orders", 100)
        .await
        .unwrap();
    assert_eq!(store.total_count(), 1000);
}

#[tokio::test]
async fn test_session_deleted_mid_poll_is_terminal() {
    let (_, api) = stack(
        MockQueryExecutor::new(5000, 50).with_batch_delay(Duration::from_millis(5)),
        fast_config(),
    );
    let (tx, mut rx) = mpsc::channel(64);
    let orchestrator =
        ClientCacheOrchestrator::new(Arc::clone(&api), fast_config()).with_events(tx);

    let handle = tokio::spawn(async move {
        let mut orchestrator = orchestrator;
        orchestrator.run_query("SELECT * FROM orders", 100).await
    });

    let session_id = loop {
        match rx.recv().await {
            Some(PollEvent::Started {
                session_id: Some(id),
            }) => break id,
            Some(_) => continue,
            None => panic!("event channel closed before start"),
        }
    };
    api.delete_session(&session_id).await.unwrap();

    assert!(matches!(
        handle.await.unwrap(),
        Err(PagerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_size_exceeded_query_fails_with_total() {
    let config = db_pager::config::CacheConfig {
        max_cached_rows: 100,
        ..fast_config()
    };
    let (_, api) = stack(MockQueryExecutor::new(450, 50), config.clone());
    let mut orchestrator = ClientCacheOrchestrator::new(api, config);

    match orchestrator.run_query("SELECT * FROM big", 100).await {
        Err(PagerError::SizeExceeded { total_rows }) => assert_eq!(total_rows, 450),
        other => panic!("expected SizeExceeded, got {other:?}"),
    }
}
