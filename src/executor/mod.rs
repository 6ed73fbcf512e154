//! Database Executor Module
//!
//! Executes statements against the embedded SQLite database and classifies
//! them as mutating or read-only.

mod classify;
mod sqlite;
mod types;

pub use classify::{classify, StatementClassifier, StatementKind, DEFAULT_MUTATING_KEYWORDS};
pub use sqlite::Database;
pub use types::{json_to_sql, ColumnValue, ExecutionResult, Record, Statement};
