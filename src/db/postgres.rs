//! PostgreSQL query executor implementation.
//!
//! Implements the `QueryExecutor` trait using sqlx with a streaming fetch, so
//! rows reach the session cache in batches instead of one full allocation.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, QueryExecutor, QueryStream, Row, Value};
use crate::error::{PagerError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL query executor.
#[derive(Debug)]
pub struct PostgresExecutor {
    pool: PgPool,
    batch_size: usize,
    query_timeout: Duration,
}

impl PostgresExecutor {
    /// Creates an executor from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(pool: PgPool, batch_size: usize, query_timeout: Duration) -> Self {
        Self {
            pool,
            batch_size,
            query_timeout,
        }
    }

    /// Connects to the database, retrying transient failures with backoff.
    ///
    /// `query_timeout` bounds how long a query may take to produce its first
    /// row; materialization after that is unbounded (the TTL sweep governs
    /// session lifetime).
    pub async fn connect(
        config: &ConnectionConfig,
        batch_size: usize,
        query_timeout: Duration,
    ) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self {
                        pool,
                        batch_size,
                        query_timeout,
                    });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        tracing::warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(map_connection_error(
            last_error.expect("at least one attempt was made"),
            config,
        ))
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryStream> {
        let sql = sql.to_string();
        let pool = self.pool.clone();
        let batch_size = self.batch_size.max(1);

        // The fetching task owns the query. It reports column metadata (or
        // the startup error) through a oneshot once the first row arrives, so
        // syntax errors surface at execute() rather than mid-materialization.
        let (meta_tx, meta_rx) = oneshot::channel::<Result<Vec<ColumnInfo>>>();
        let (tx, stream) = QueryStream::channel(Vec::new(), None);

        tokio::spawn(async move {
            let mut fetch = sqlx::query(&sql).fetch(&pool);
            let mut batch: Vec<Row> = Vec::with_capacity(batch_size);

            match fetch.next().await {
                Some(Ok(row)) => {
                    let _ = meta_tx.send(Ok(column_metadata(&row)));
                    batch.push(convert_row(&row));
                }
                Some(Err(e)) => {
                    let _ = meta_tx.send(Err(PagerError::execution(format_query_error(e))));
                    return;
                }
                None => {
                    // Empty result set: no metadata, no batches.
                    let _ = meta_tx.send(Ok(Vec::new()));
                    return;
                }
            }

            while let Some(next) = fetch.next().await {
                match next {
                    Ok(row) => {
                        batch.push(convert_row(&row));
                        if batch.len() >= batch_size
                            && tx.send(Ok(std::mem::take(&mut batch))).await.is_err()
                        {
                            // Receiver dropped; session cancelled or cleaned up.
                            return;
                        }
                    }
                    Err(e) => {
                        if !batch.is_empty() {
                            let _ = tx.send(Ok(std::mem::take(&mut batch))).await;
                        }
                        let _ = tx
                            .send(Err(PagerError::execution(format_query_error(e))))
                            .await;
                        return;
                    }
                }
            }

            if !batch.is_empty() {
                let _ = tx.send(Ok(batch)).await;
            }
        });

        let meta = tokio::time::timeout(self.query_timeout, meta_rx)
            .await
            .map_err(|_| {
                PagerError::execution(format!(
                    "query produced no rows within {:?}",
                    self.query_timeout
                ))
            })?
            .map_err(|_| PagerError::internal("query task exited before reporting metadata"))?;

        let mut stream = stream;
        stream.columns = meta?;
        Ok(stream)
    }
}

/// Extracts column metadata from a fetched row.
fn column_metadata(row: &PgRow) -> Vec<ColumnInfo> {
    row.columns()
        .iter()
        .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
        .collect()
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        // All other types are carried as their text form.
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

/// Determines if a connection error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    // Authentication and database-not-found errors are not transient
    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> PagerError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        PagerError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        PagerError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        PagerError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        PagerError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        PagerError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        PagerError::connection(error.to_string())
    }
}

/// Formats a query error with Postgres detail and hint fields when available.
fn format_query_error(error: sqlx::Error) -> String {
    if let Some(db_error) = error.as_database_error() {
        let mut result = format!("ERROR: {}", db_error.message());

        if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            if let Some(detail) = pg_error.detail() {
                result.push_str("\n  DETAIL: ");
                result.push_str(detail);
            }
            if let Some(hint) = pg_error.hint() {
                result.push_str("\n  HINT: ");
                result.push_str(hint);
            }
        }

        result
    } else {
        error.to_string()
    }
}
