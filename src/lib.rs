//! sqliteserver - SQLite over HTTP with statement replication
//!
//! Serves an embedded SQLite database over a small HTTP API and pushes
//! mutating statements from a leader node to any followers that registered
//! with it.
//!
//! # Architecture
//!
//! Every `/query` request is executed locally first. Statements classified as
//! mutating are then broadcast to the registered followers on a best-effort
//! basis (one attempt each, failures only logged) and, when audit mode is on,
//! appended to a durable write log.
//!
//! # Features
//!
//! - Schema-agnostic result marshaling into JSON
//! - Keyword-based statement classification
//! - Follower self-registration and concurrent fan-out
//! - Optional append-only write log
//! - Shared-secret authentication on every route

pub mod api;
pub mod config;
pub mod error;
pub mod executor;
pub mod replication;
pub mod writelog;

pub use config::ServerConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{Dispatcher, HttpServer, QueryResponse};
    pub use crate::config::ServerConfig;
    pub use crate::error::{Error, Result};
    pub use crate::executor::{Database, ExecutionResult, Record, Statement, StatementKind};
    pub use crate::replication::{FollowerEndpoint, ReplicaRegistry, Replicator};
    pub use crate::writelog::WriteLog;
}
