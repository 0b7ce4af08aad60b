//! db-pager - progressive result-set cache and pagination engine.
//!
//! Large query results materialize into server-side sessions in the
//! background while clients poll for progress, then page through the cached
//! rows with filters and sorting. Small results skip the session machinery
//! entirely and are served from client memory through the same interface.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod page;
pub mod server;
