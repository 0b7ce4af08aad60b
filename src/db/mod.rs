//! Query execution boundary.
//!
//! Provides a trait-based interface to the external query engine, allowing
//! different backends to be used interchangeably. The executor yields rows
//! incrementally in batches so the cache can materialize progressively and
//! honor cancellation at batch granularity.

mod mock;
mod postgres;
mod types;

pub use mock::MockQueryExecutor;
pub use postgres::PostgresExecutor;
pub use types::{column_index, ColumnInfo, Row, Value};

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of the batch channel between an executor and the cache.
const BATCH_CHANNEL_CAPACITY: usize = 8;

/// An in-flight query: column metadata plus an incremental stream of row
/// batches.
///
/// `total_rows` is populated when the backend knows the result size up front
/// (e.g. a counted query); it lets the server elect inline delivery for small
/// results and compute exact progress percentages.
pub struct QueryStream {
    /// Column metadata for the result set.
    pub columns: Vec<ColumnInfo>,

    /// Total row count, when known before materialization.
    pub total_rows: Option<usize>,

    /// Receiver of row batches. A batch-level error terminates the stream.
    pub batches: mpsc::Receiver<Result<Vec<Row>>>,
}

impl QueryStream {
    /// Creates a stream and the sender half used by the producing task.
    pub fn channel(
        columns: Vec<ColumnInfo>,
        total_rows: Option<usize>,
    ) -> (mpsc::Sender<Result<Vec<Row>>>, Self) {
        let (tx, rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        (
            tx,
            Self {
                columns,
                total_rows,
                batches: rx,
            },
        )
    }

    /// Drains the remaining batches into a single row vector.
    ///
    /// Used for inline delivery of small results.
    pub async fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(batch) = self.batches.recv().await {
            rows.extend(batch?);
        }
        Ok(rows)
    }
}

/// Trait defining the interface to the external query engine.
///
/// Implementations start the query and feed row batches through the returned
/// stream; a failure mid-stream arrives as an `Err` batch.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Starts executing a SQL query and returns its result stream.
    async fn execute(&self, sql: &str) -> Result<QueryStream>;
}

/// Creates an executor for the given connection configuration.
pub async fn connect(
    config: &ConnectionConfig,
    batch_size: usize,
    query_timeout: Duration,
) -> Result<Box<dyn QueryExecutor>> {
    let executor = PostgresExecutor::connect(config, batch_size, query_timeout).await?;
    Ok(Box::new(executor))
}
