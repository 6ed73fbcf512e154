//! Replication Fan-out
//!
//! Best-effort broadcast of a locally committed statement to every
//! registered follower. Each follower gets exactly one attempt; failures are
//! logged and reported to the caller, never retried and never rolled back.

use std::sync::Arc;

use futures::future::join_all;

use super::registry::ReplicaRegistry;
use super::transport::FollowerTransport;
use crate::executor::Statement;

/// Outcome of one fan-out round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Followers a send was attempted against
    pub attempted: usize,
    /// Followers that failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl PropagationReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed.len()
    }
}

/// Sends mutating statements to the followers in a registry
pub struct Replicator {
    registry: Arc<ReplicaRegistry>,
    transport: Arc<dyn FollowerTransport>,
}

impl Replicator {
    pub fn new(registry: Arc<ReplicaRegistry>, transport: Arc<dyn FollowerTransport>) -> Self {
        Self { registry, transport }
    }

    pub fn registry(&self) -> &Arc<ReplicaRegistry> {
        &self.registry
    }

    /// Send `statement` to every follower registered right now. Followers
    /// registering while this runs may or may not be included.
    pub async fn propagate(&self, statement: &Statement) -> PropagationReport {
        let followers = self.registry.list_all().await;
        if followers.is_empty() {
            return PropagationReport::default();
        }

        tracing::debug!("Sending statement to {} followers", followers.len());

        let sends = followers.iter().map(|follower| async move {
            let result = self.transport.send(follower, statement).await;
            (follower, result)
        });

        let mut report = PropagationReport {
            attempted: followers.len(),
            failed: Vec::new(),
        };
        for (follower, result) in join_all(sends).await {
            if let Err(e) = result {
                tracing::warn!("Replication to {} failed: {}", follower, e);
                report.failed.push((follower.clone(), e.to_string()));
            }
        }

        if !report.failed.is_empty() {
            tracing::warn!(
                "Statement reached {}/{} followers",
                report.delivered(),
                report.attempted
            );
        }

        report
    }
}
