//! Mock query executor for testing.
//!
//! Generates deterministic synthetic result sets with configurable size,
//! batching, pacing and failure behavior, so session materialization and the
//! client orchestrator can be exercised without a database.

use super::{ColumnInfo, QueryExecutor, QueryStream, Row, Value};
use crate::error::{PagerError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// A mock executor that yields `row_count` synthetic rows in batches.
///
/// Rows have the shape `(id, status, amount)`: `id` counts up from 1,
/// `status` alternates ACTIVE/INACTIVE (every 5th row NULL), `amount` is a
/// float derived from the id.
pub struct MockQueryExecutor {
    row_count: usize,
    batch_size: usize,
    batch_delay: Option<Duration>,
    fail_after_batches: Option<usize>,
    advertise_total: bool,
}

impl MockQueryExecutor {
    /// Creates a mock executor yielding `row_count` rows in `batch_size` batches.
    pub fn new(row_count: usize, batch_size: usize) -> Self {
        Self {
            row_count,
            batch_size: batch_size.max(1),
            batch_delay: None,
            fail_after_batches: None,
            advertise_total: false,
        }
    }

    /// Sleeps this long before each batch, simulating a slow backend.
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    /// Fails the stream with an execution error after emitting `batches` batches.
    pub fn failing_after(mut self, batches: usize) -> Self {
        self.fail_after_batches = Some(batches);
        self
    }

    /// Reports the total row count up front, enabling inline delivery and
    /// exact progress percentages.
    pub fn with_known_total(mut self) -> Self {
        self.advertise_total = true;
        self
    }

    /// The columns every mock result carries.
    pub fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", "integer"),
            ColumnInfo::new("status", "varchar"),
            ColumnInfo::new("amount", "numeric"),
        ]
    }

    /// Builds the synthetic row for a zero-based index.
    pub fn row_at(index: usize) -> Row {
        let id = (index + 1) as i64;
        let status = if index % 5 == 4 {
            Value::Null
        } else if index % 2 == 0 {
            Value::from("ACTIVE")
        } else {
            Value::from("INACTIVE")
        };
        vec![
            Value::Int(id),
            status,
            Value::Float((id as f64) * 1.5),
        ]
    }
}

#[async_trait]
impl QueryExecutor for MockQueryExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryStream> {
        if sql.trim().is_empty() {
            return Err(PagerError::execution("empty query"));
        }

        let total = self.advertise_total.then_some(self.row_count);
        let (tx, stream) = QueryStream::channel(Self::columns(), total);

        let row_count = self.row_count;
        let batch_size = self.batch_size;
        let batch_delay = self.batch_delay;
        let fail_after = self.fail_after_batches;

        tokio::spawn(async move {
            let mut sent_batches = 0usize;
            let mut index = 0usize;

            while index < row_count {
                if let Some(limit) = fail_after {
                    if sent_batches >= limit {
                        let _ = tx
                            .send(Err(PagerError::execution("mock query failed mid-stream")))
                            .await;
                        return;
                    }
                }

                if let Some(delay) = batch_delay {
                    tokio::time::sleep(delay).await;
                }

                let end = (index + batch_size).min(row_count);
                let batch: Vec<Row> = (index..end).map(MockQueryExecutor::row_at).collect();
                index = end;
                sent_batches += 1;

                if tx.send(Ok(batch)).await.is_err() {
                    // Receiver dropped; the session was cancelled or cleaned up.
                    return;
                }
            }
        });

        Ok(stream)
    }
}
