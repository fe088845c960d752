//! Leader-gated membership changes.

use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use openraft::error::ClientWriteError;
use openraft::error::RaftError;
use openraft::ChangeMembers;
use openraft::ServerState;
use tokio::net::TcpStream;

use crate::error::MembershipError;
use crate::error::NotLeader;
use crate::node::node_id_of;
use crate::node::NodeInfo;
use crate::node::NodeRole;
use crate::typ;
use crate::typ::StoredMembership;
use crate::Node;
use crate::NodeId;
use crate::Raft;

/// What this node currently knows about who leads the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leadership {
    pub state: ServerState,
    pub leader_id: Option<NodeId>,
    pub leader: Option<Node>,
}

impl Leadership {
    pub fn is_leader(&self) -> bool {
        self.state == ServerState::Leader
    }

    pub fn not_leader(&self) -> NotLeader {
        NotLeader {
            state: self.state,
            leader_id: self.leader.as_ref().map(|n| n.id.clone()),
            leader_address: self.leader.as_ref().map(|n| n.address.clone()),
        }
    }
}

/// Adds and removes voters through the consensus engine.
///
/// Every change is refused up front unless this node is the leader, and a new node must accept
/// a TCP connection before it is handed to the engine.
#[derive(Clone)]
pub struct ClusterManager {
    raft: Raft,
    probe_timeout: Duration,
}

impl ClusterManager {
    pub fn new(raft: Raft, probe_timeout: Duration) -> Self {
        Self { raft, probe_timeout }
    }

    pub fn leadership(&self) -> Leadership {
        let metrics = self.raft.metrics();
        let metrics = metrics.borrow();

        let leader = metrics
            .current_leader
            .and_then(|id| find_node(&metrics.membership_config, id).cloned());

        Leadership {
            state: metrics.state,
            leader_id: metrics.current_leader,
            leader,
        }
    }

    pub fn ensure_leader(&self) -> Result<(), NotLeader> {
        let leadership = self.leadership();
        if leadership.is_leader() {
            Ok(())
        } else {
            Err(leadership.not_leader())
        }
    }

    /// Add `node` to the cluster as a voter.
    ///
    /// The node is first added as a learner and caught up with the log, then promoted.
    pub async fn add_node(&self, node: Node) -> Result<(), MembershipError> {
        self.ensure_leader()?;

        let node_id = node.node_id();

        let membership = self.membership();
        if let Some(existing) = find_node(&membership, node_id) {
            if existing.id != node.id {
                return Err(MembershipError::EngineRejected(format!(
                    "node id collision: {} and {} map to the same engine id",
                    existing.id, node.id
                )));
            }
        }

        if let Err(source) = probe(&node.address, self.probe_timeout).await {
            tracing::warn!(node = %node, error = %source, "refuse to add unreachable node");

            return Err(MembershipError::Unreachable {
                id: node.id,
                address: node.address,
                source,
            });
        }

        tracing::info!(node = %node, node_id, "add node as learner");
        self.raft.add_learner(node_id, node.clone(), true).await.map_err(|e| self.engine_error(e))?;

        tracing::info!(node = %node, node_id, "promote node to voter");
        self.raft
            .change_membership(ChangeMembers::AddVoterIds(BTreeSet::from([node_id])), false)
            .await
            .map_err(|e| self.engine_error(e))?;

        Ok(())
    }

    /// Remove the node with the string id `id`, whether it is a voter or a learner.
    pub async fn remove_node(&self, id: &str) -> Result<(), MembershipError> {
        self.ensure_leader()?;

        let node_id = node_id_of(id);
        let membership = self.membership();

        if find_node(&membership, node_id).is_none() {
            return Err(MembershipError::EngineRejected(format!("node {} is not a cluster member", id)));
        }

        let ids = BTreeSet::from([node_id]);
        let change = if voter_ids(&membership).contains(&node_id) {
            ChangeMembers::RemoveVoters(ids)
        } else {
            ChangeMembers::RemoveNodes(ids)
        };

        tracing::info!(id, node_id, "remove node");
        self.raft.change_membership(change, false).await.map_err(|e| self.engine_error(e))?;

        Ok(())
    }

    /// The locally known configuration, sorted by node id.
    pub fn list_nodes(&self) -> Vec<NodeInfo> {
        let membership = self.membership();
        let voters = voter_ids(&membership);

        let mut nodes = membership
            .membership()
            .nodes()
            .map(|(node_id, node)| NodeInfo {
                id: node.id.clone(),
                address: node.address.clone(),
                role: if voters.contains(node_id) {
                    NodeRole::Voter
                } else {
                    NodeRole::Learner
                },
            })
            .collect::<Vec<_>>();

        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Map an engine write error to a [`NotLeader`] if the engine says another node leads.
    pub fn not_leader_of(&self, e: &typ::RaftError<typ::ClientWriteError>) -> Option<NotLeader> {
        match e {
            RaftError::APIError(ClientWriteError::ForwardToLeader(fwd)) => Some(NotLeader {
                state: self.leadership().state,
                leader_id: fwd.leader_node.as_ref().map(|n| n.id.clone()),
                leader_address: fwd.leader_node.as_ref().map(|n| n.address.clone()),
            }),
            _ => None,
        }
    }

    fn engine_error(&self, e: typ::RaftError<typ::ClientWriteError>) -> MembershipError {
        match self.not_leader_of(&e) {
            Some(not_leader) => MembershipError::NotLeader(not_leader),
            None => MembershipError::EngineRejected(e.to_string()),
        }
    }

    fn membership(&self) -> Arc<StoredMembership> {
        self.raft.metrics().borrow().membership_config.clone()
    }
}

fn find_node(membership: &StoredMembership, node_id: NodeId) -> Option<&Node> {
    membership.membership().nodes().find(|(id, _)| **id == node_id).map(|(_, node)| node)
}

fn voter_ids(membership: &StoredMembership) -> BTreeSet<NodeId> {
    membership.membership().get_joint_config().iter().flatten().copied().collect()
}

/// Check that something accepts TCP connections on `address` within `timeout`.
pub async fn probe(address: &str, timeout: Duration) -> io::Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no connection within {:?}", timeout),
        )),
    }
}
