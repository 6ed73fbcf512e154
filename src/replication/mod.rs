//! Replication Module
//!
//! Leader-side fan-out of mutating statements to registered followers, and
//! follower-side registration with the leader.

mod fanout;
mod registry;
mod transport;

pub use fanout::{PropagationReport, Replicator};
pub use registry::{FollowerEndpoint, ReplicaRegistry};
pub use transport::{register_with_leader, FollowerTransport, HttpTransport};
