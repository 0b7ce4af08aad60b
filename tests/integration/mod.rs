mod orchestrator_test;
mod pagination_test;
mod session_test;

use db_pager::client::{ClientCacheOrchestrator, InProcessApi, SessionApi};
use db_pager::config::CacheConfig;
use db_pager::db::MockQueryExecutor;
use db_pager::server::{SessionCacheManager, StatusSnapshot};
use std::sync::Arc;
use std::time::Duration;

/// Cache config tuned for fast test turnaround.
pub fn fast_config() -> CacheConfig {
    CacheConfig {
        poll_interval_ms: 10,
        request_timeout_secs: 5,
        ..CacheConfig::default()
    }
}

/// Builds the full in-process stack over a mock executor.
pub fn stack(
    executor: MockQueryExecutor,
    config: CacheConfig,
) -> (Arc<SessionCacheManager>, Arc<dyn SessionApi>) {
    let manager = SessionCacheManager::new(config.clone());
    let api: Arc<dyn SessionApi> = Arc::new(InProcessApi::new(
        Arc::new(executor),
        Arc::clone(&manager),
        "tester",
        config.inline_row_limit,
    ));
    (manager, api)
}

/// Orchestrator over the full stack.
pub fn orchestrator(executor: MockQueryExecutor) -> ClientCacheOrchestrator {
    let (_, api) = stack(executor, fast_config());
    ClientCacheOrchestrator::new(api, fast_config())
}

/// Polls until the session reaches a terminal status.
pub async fn wait_for_terminal(api: &Arc<dyn SessionApi>, session_id: &str) -> StatusSnapshot {
    for _ in 0..400 {
        let snapshot = api.session_status(session_id).await.unwrap();
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {session_id} never reached a terminal state");
}
