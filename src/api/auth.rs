//! Shared-Secret Authentication
//!
//! Every route requires the `secret` header to match the configured value.
//! Rejected requests get an empty 401 and never reach a handler.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Header carrying the shared secret
pub const SECRET_HEADER: &str = "secret";

/// Secret the middleware compares against
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self(Arc::from(secret))
    }

    fn matches(&self, candidate: Option<&str>) -> bool {
        candidate == Some(&*self.0)
    }
}

/// Middleware rejecting requests without the right secret
pub async fn require_secret(
    State(secret): State<SharedSecret>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok());

    if !secret.matches(provided) {
        tracing::debug!("Rejected {} {}: bad secret", request.method(), request.uri().path());
        return StatusCode::UNAUTHORIZED.into_response();
    }

    next.run(request).await
}
