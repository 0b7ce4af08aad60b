//! Server-side result cache.
//!
//! Owns session lifecycle and progressive materialization, and serves
//! filtered/sorted/paginated reads against cached row sets.

mod manager;
mod progress;
mod reader;
mod session;

pub use manager::SessionCacheManager;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use reader::ResultPageReader;
pub use session::{SessionEntry, SessionStatus, StatusSnapshot};
