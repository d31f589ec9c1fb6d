//! LabelForge Store — SQLite persistence, sample leases, audit ledger.

pub mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SqliteStore;
pub use types::*;
