use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::NodeId;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A cluster member: its operator-facing id and the `host:port` it serves on.
///
/// The same shape is used as the `POST /nodes` request body and as the node data stored in the
/// replicated membership config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub address: String,
}

impl Node {
    pub fn new(id: impl ToString, address: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            address: address.to_string(),
        }
    }

    /// The id the consensus engine knows this node by.
    pub fn node_id(&self) -> NodeId {
        node_id_of(&self.id)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("node id must not be empty".to_string());
        }
        if self.address.trim().is_empty() {
            return Err("node address must not be empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Map an operator-facing node id to the numeric id used by the consensus engine.
///
/// FNV-1a over the UTF-8 bytes: stable across processes, builds and platforms, so every replica
/// derives the same engine id from the same string.
pub fn node_id_of(id: &str) -> NodeId {
    id.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Voter,
    Learner,
}

/// A member as reported by `GET /nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub address: String,
    pub role: NodeRole,
}

/// Body of `DELETE /nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: String,
}
