//! Request Dispatcher
//!
//! Sequences one `/query` request: decode, execute locally, classify, then
//! replicate and/or log mutating statements, then answer. Decode and
//! execution failures short-circuit straight to the answer.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;
use crate::executor::{Database, Record, Statement, StatementClassifier, StatementKind};
use crate::replication::{FollowerEndpoint, ReplicaRegistry, Replicator};
use crate::writelog::WriteLog;

/// Body of every `/query` answer
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    pub result: Option<Vec<Record>>,
    pub error: String,
}

impl QueryResponse {
    fn ok(rows: Vec<Record>) -> Self {
        Self {
            result: Some(rows),
            error: String::new(),
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            result: None,
            error: error.into(),
        }
    }
}

/// Composition root for query handling
pub struct Dispatcher {
    db: Arc<Database>,
    classifier: StatementClassifier,
    registry: Arc<ReplicaRegistry>,
    replicator: Option<Replicator>,
    write_log: Option<WriteLog>,
}

impl Dispatcher {
    /// Dispatcher that executes statements and accepts follower
    /// registrations, with replication and the write log both off
    pub fn new(db: Arc<Database>, registry: Arc<ReplicaRegistry>) -> Self {
        Self {
            db,
            classifier: StatementClassifier::default(),
            registry,
            replicator: None,
            write_log: None,
        }
    }

    pub fn with_classifier(mut self, classifier: StatementClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Fan mutating statements out through `replicator`
    pub fn with_replicator(mut self, replicator: Replicator) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// Append mutating statements to `write_log`
    pub fn with_write_log(mut self, write_log: WriteLog) -> Self {
        self.write_log = Some(write_log);
        self
    }

    pub fn registry(&self) -> &Arc<ReplicaRegistry> {
        &self.registry
    }

    pub fn write_log(&self) -> Option<&WriteLog> {
        self.write_log.as_ref()
    }

    /// Handle a raw `/query` body
    pub async fn handle_query(&self, body: &[u8]) -> QueryResponse {
        let statement: Statement = match serde_json::from_slice(body) {
            Ok(statement) => statement,
            Err(e) => {
                tracing::debug!("Undecodable query body: {}", e);
                return QueryResponse::failed(Error::Decode(e).to_string());
            }
        };

        self.dispatch(statement).await
    }

    /// Execute a decoded statement and apply its side effects
    pub async fn dispatch(&self, statement: Statement) -> QueryResponse {
        tracing::debug!("Query: {}", statement.text);

        let result = self.db.execute(statement.clone()).await;
        if let Some(error) = result.error {
            return QueryResponse::failed(error);
        }

        if self.classifier.classify(&statement.text) == StatementKind::ReadOnly {
            return QueryResponse::ok(result.rows);
        }

        // Committed locally; followers get it even if the audit append fails
        if let Some(replicator) = &self.replicator {
            replicator.propagate(&statement).await;
        }

        if let Some(write_log) = &self.write_log {
            if let Err(e) = write_log.append(&statement.text).await {
                tracing::error!("{}", e);
                return QueryResponse::failed(e.to_string());
            }
        }

        QueryResponse::ok(result.rows)
    }

    /// Register a follower with this node
    pub async fn register_follower(&self, endpoint: &FollowerEndpoint) -> bool {
        if self.replicator.is_none() {
            tracing::warn!(
                "Follower {} registered but this node does not replicate",
                endpoint.key()
            );
        }
        self.registry.register(endpoint).await
    }
}
