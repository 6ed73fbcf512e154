//! Follower Transport
//!
//! HTTP plumbing between leader and followers: posting statements to a
//! follower's `/query` endpoint and a follower announcing itself to the
//! leader's `/follower` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::registry::FollowerEndpoint;
use crate::api::SECRET_HEADER;
use crate::error::{Error, Result};
use crate::executor::Statement;

/// Delivers one statement to one follower
#[async_trait]
pub trait FollowerTransport: Send + Sync {
    /// Send `statement` to the follower whose base URL is `follower`
    async fn send(&self, follower: &str, statement: &Statement) -> Result<()>;
}

/// The part of a follower's `/query` reply the leader inspects
#[derive(Debug, Deserialize)]
struct FollowerReply {
    #[serde(default)]
    error: String,
}

/// Statement delivery over HTTP with the shared-secret header
pub struct HttpTransport {
    client: reqwest::Client,
    secret: String,
}

impl HttpTransport {
    /// Create a transport. Without a timeout a hung follower stalls the
    /// request that is replicating to it.
    pub fn new(secret: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            secret: secret.into(),
        })
    }
}

#[async_trait]
impl FollowerTransport for HttpTransport {
    async fn send(&self, follower: &str, statement: &Statement) -> Result<()> {
        let url = format!("{}/query", follower.trim_end_matches('/'));
        tracing::debug!("Replicating to {}", url);

        let response = self
            .client
            .post(&url)
            .header(SECRET_HEADER, &self.secret)
            .json(statement)
            .send()
            .await
            .map_err(|e| Error::ConnectionFailed {
                address: follower.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FollowerRejected {
                address: follower.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        match response.json::<FollowerReply>().await {
            Ok(reply) if !reply.error.is_empty() => Err(Error::FollowerRejected {
                address: follower.to_string(),
                reason: reply.error,
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::debug!("Unreadable reply from {}: {}", follower, e);
                Ok(())
            }
        }
    }
}

/// Announce this node to the leader so it starts receiving statements
pub async fn register_with_leader(
    client: &reqwest::Client,
    leader_address: &str,
    endpoint: &FollowerEndpoint,
    secret: &str,
) -> Result<()> {
    let url = format!("{}/follower", leader_address.trim_end_matches('/'));
    tracing::info!("Registering {} with leader at {}", endpoint.key(), url);

    let response = client
        .post(&url)
        .header(SECRET_HEADER, secret)
        .json(endpoint)
        .send()
        .await
        .map_err(|e| Error::ConnectionFailed {
            address: leader_address.to_string(),
            reason: e.to_string(),
        })?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::Replication(format!(
            "leader {} refused registration: HTTP {}",
            leader_address,
            response.status()
        )));
    }

    Ok(())
}
