//! Client-side orchestration over the session API.
//!
//! The orchestrator runs a query to readiness, the store accumulates pages
//! for display, and the page sources hide whether rows live in a server
//! session or in client memory.

mod api;
mod orchestrator;
mod source;
mod store;

pub use api::{ExecuteResponse, InProcessApi, SessionApi};
pub use orchestrator::{classify_poll, ClientCacheOrchestrator, PollEvent, PollOutcome};
pub use source::{LocalPageSource, PageQuery, PageSource, ServerPageSource};
pub use store::ClientResultStore;

use crate::error::{PagerError, Result};
use std::future::Future;
use std::time::Duration;

/// Bounds a client call; an elapsed deadline is a transient fault, retried
/// by the poll loop like any other.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PagerError::transient(format!(
            "request timed out after {}s",
            limit.as_secs()
        ))),
    }
}
