//! db-pager - progressive result-set pager for SQL queries.

mod cli;

use cli::Cli;
use db_pager::client::{
    ClientCacheOrchestrator, ClientResultStore, InProcessApi, PollEvent, SessionApi,
};
use db_pager::config::{Config, ConnectionConfig};
use db_pager::db::{self, MockQueryExecutor, QueryExecutor, Value};
use db_pager::error::{PagerError, Result};
use db_pager::logging;
use db_pager::server::SessionCacheManager;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init_stderr_logging();

    if let Err(e) = run().await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let config = Config::load_from_file(&cli.config_path())?;

    let executor = build_executor(&cli, &config).await?;
    let manager = SessionCacheManager::new(config.cache.clone());
    manager.spawn_sweeper();

    let api: Arc<dyn SessionApi> = Arc::new(InProcessApi::new(
        executor,
        Arc::clone(&manager),
        whoami(),
        config.cache.inline_row_limit,
    ));

    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(64);
    let progress = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                PollEvent::Started { session_id: Some(id) } => {
                    eprintln!("materializing under session {id}...")
                }
                PollEvent::Started { session_id: None } => {}
                PollEvent::Progress {
                    rows_materialized,
                    percentage,
                } => eprintln!("  {rows_materialized} rows ({percentage}%)"),
                PollEvent::Completed { total_rows } => eprintln!("done: {total_rows} rows"),
                PollEvent::Cancelled { rows_materialized } => {
                    eprintln!("cancelled after {rows_materialized} rows")
                }
                PollEvent::Failed { message } => eprintln!("failed: {message}"),
            }
        }
    });

    let mut orchestrator =
        ClientCacheOrchestrator::new(Arc::clone(&api), config.cache.clone()).with_events(events_tx);

    let mut store = orchestrator.run_query(&cli.sql, cli.page_size).await?;

    if let Some(path) = &cli.csv {
        let bytes = store.export_csv().await?;
        std::fs::write(path, &bytes)
            .map_err(|e| PagerError::internal(format!("cannot write {}: {e}", path.display())))?;
        info!("Wrote {} bytes to {}", bytes.len(), path.display());
    } else {
        if cli.all {
            while store.load_more().await? {}
        }
        print_rows(&store);
    }

    orchestrator.discard();
    api.delete_owner_sessions().await?;
    manager.close();
    progress.abort();
    Ok(())
}

/// Owner identity for session accounting: one per OS user on this host.
fn whoami() -> String {
    std::env::var("USER").unwrap_or_else(|_| "local".to_string())
}

/// Connection resolution: CLI arguments, then the config file connection,
/// then DATABASE_URL.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    if let Some(conn) = cli.to_connection_config()? {
        return Ok(conn);
    }
    if config.connection.host.is_some() {
        return Ok(config.connection.clone());
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        return ConnectionConfig::from_connection_string(&url);
    }
    Err(PagerError::config(
        "no database connection configured; pass a connection string, set one in the config file, or set DATABASE_URL",
    ))
}

async fn build_executor(cli: &Cli, config: &Config) -> Result<Arc<dyn QueryExecutor>> {
    if cli.mock_db {
        info!("Using mock backend with {} rows", cli.mock_rows);
        return Ok(Arc::new(MockQueryExecutor::new(
            cli.mock_rows,
            config.cache.batch_size,
        )));
    }

    let connection = resolve_connection(cli, config)?;
    info!("Connecting to {}", connection.display_string());
    let executor = db::connect(
        &connection,
        config.cache.batch_size,
        config.cache.query_timeout(),
    )
    .await?;
    Ok(Arc::from(executor))
}

fn print_rows(store: &ClientResultStore) {
    let header: Vec<&str> = store.columns().iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join(" | "));

    for row in store.rows() {
        let cells: Vec<String> = row.iter().map(Value::to_display_string).collect();
        println!("{}", cells.join(" | "));
    }
    println!(
        "-- {} of {} rows",
        store.rows().len(),
        store.total_count()
    );
}
