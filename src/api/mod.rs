//! HTTP API Module
//!
//! Exposes the query dispatcher, health check and follower registration
//! over HTTP.

mod auth;
mod dispatcher;
mod http;

pub use auth::{require_secret, SharedSecret, SECRET_HEADER};
pub use dispatcher::{Dispatcher, QueryResponse};
pub use http::{AppState, HttpServer};
