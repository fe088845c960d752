//! Error types of the membership manager, the event proposal path and node startup.

use std::io;
use std::time::Duration;

use openraft::ServerState;

use crate::snapshot::SnapshotError;
use crate::typ;

/// A write reached a node that is not the leader.
///
/// Carries whatever this node knows about the current leader so that the client can retry there.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "My state is {state:?}. only leaders can accept this request. leader id is {} and its address is {}",
    .leader_id.as_deref().unwrap_or("unknown"),
    .leader_address.as_deref().unwrap_or("unknown")
)]
pub struct NotLeader {
    pub state: ServerState,
    pub leader_id: Option<String>,
    pub leader_address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error(transparent)]
    NotLeader(#[from] NotLeader),

    #[error("node {id} on address {address} is unreachable: {source}")]
    Unreachable {
        id: String,
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("could not change membership with error: {0}")]
    EngineRejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    #[error(transparent)]
    NotLeader(#[from] NotLeader),

    #[error("invalid event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("could not commit event with error: {0}")]
    Rejected(String),

    #[error("event was not committed within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error(transparent)]
    Raft(#[from] openraft::ConfigError),

    #[error("snapshot_retain must be > 0")]
    SnapshotRetainIs0,
}

/// Errors that stop a node from coming up.
///
/// A node that fails to restore its snapshot must not serve: it has no consistent base state.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to restore snapshot: {0}")]
    Restore(#[from] SnapshotError),

    #[error("failed to start raft: {0}")]
    Raft(#[from] typ::Fatal),

    #[error("failed to bootstrap cluster: {0}")]
    Bootstrap(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
