//! Replica Registry
//!
//! Tracks the followers a leader fans statements out to. Members are only
//! ever added; they stay registered until the process exits.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Follower address as sent to `/follower`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerEndpoint {
    /// Scheme and host, e.g. `http://localhost`
    pub address: String,
    /// Port with its leading colon, e.g. `:5051`
    pub port: String,
}

impl FollowerEndpoint {
    /// Membership key: `address` and `port` concatenated, which is also the
    /// base URL statements are posted to
    pub fn key(&self) -> String {
        format!("{}{}", self.address, self.port)
    }
}

/// Concurrency-safe set of registered followers
#[derive(Debug, Default)]
pub struct ReplicaRegistry {
    members: RwLock<BTreeSet<String>>,
}

impl ReplicaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a follower. Returns `false` if it was already a member.
    pub async fn register(&self, endpoint: &FollowerEndpoint) -> bool {
        let key = endpoint.key();
        let added = self.members.write().await.insert(key.clone());
        if added {
            tracing::info!("Registered follower {}", key);
        } else {
            tracing::debug!("Follower {} already registered", key);
        }
        added
    }

    /// Snapshot of all registered followers
    pub async fn list_all(&self) -> Vec<String> {
        self.members.read().await.iter().cloned().collect()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.members.read().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn endpoint(port: &str) -> FollowerEndpoint {
        FollowerEndpoint {
            address: "http://localhost".to_string(),
            port: port.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = ReplicaRegistry::new();
        assert!(registry.register(&endpoint(":5051")).await);
        for _ in 0..5 {
            assert!(!registry.register(&endpoint(":5051")).await);
        }
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains("http://localhost:5051").await);
    }

    #[tokio::test]
    async fn test_list_all_snapshot() {
        let registry = ReplicaRegistry::new();
        assert!(registry.is_empty().await);
        registry.register(&endpoint(":5052")).await;
        registry.register(&endpoint(":5051")).await;

        let snapshot = registry.list_all().await;
        registry.register(&endpoint(":5053")).await;

        assert_eq!(snapshot, vec!["http://localhost:5051", "http://localhost:5052"]);
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let registry = Arc::new(ReplicaRegistry::new());
        let mut handles = Vec::new();
        for i in 0..64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register(&endpoint(&format!(":{}", 6000 + i % 16))).await;
                registry.list_all().await.len()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap() >= 1);
        }
        assert_eq!(registry.len().await, 16);
    }
}
