//! Startup configuration of an event store node.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use openraft::SnapshotPolicy;

use crate::error::ConfigError;
use crate::Node;

/// The configuration of one node, read from the command line or the environment.
///
/// Only the port is required: the node id defaults to the port and the data directory to
/// `data/<port>`.
#[derive(Clone, Debug, Parser)]
#[clap(author, version, about, long_about = None)]
pub struct NodeConfig {
    /// The port to serve the HTTP API and the replication endpoints on
    #[clap(long, env = "PORT")]
    pub port: u16,

    /// The id of this node in the cluster, the port if not set
    #[clap(long, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// The host to listen on and to advertise to other nodes
    #[clap(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Where the raft log and snapshots are kept, `data/<port>` if not set
    #[clap(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Initialize a new single-node cluster with this node as the only voter
    #[clap(
        long,
        env = "BOOTSTRAP_CLUSTER",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub bootstrap_cluster: bool,

    /// The heartbeat interval in milliseconds
    #[clap(long, env = "RAFT_HEARTBEAT_MS", default_value = "500")]
    pub heartbeat_interval: u64,

    /// The minimum election timeout in milliseconds
    #[clap(long, env = "RAFT_ELECTION_MIN_MS", default_value = "1500")]
    pub election_timeout_min: u64,

    /// The maximum election timeout in milliseconds
    #[clap(long, env = "RAFT_ELECTION_MAX_MS", default_value = "3000")]
    pub election_timeout_max: u64,

    /// Build a snapshot once this many logs are applied since the last one
    #[clap(long, env = "SNAPSHOT_THRESHOLD", default_value = "8192")]
    pub snapshot_threshold: u64,

    /// How many snapshots to keep on disk
    #[clap(long, env = "SNAPSHOT_RETAIN", default_value = "3")]
    pub snapshot_retain: usize,

    /// How long a new node has to accept a TCP connection before it is refused, in milliseconds
    #[clap(long, env = "PROBE_TIMEOUT_MS", default_value = "1000")]
    pub probe_timeout_ms: u64,

    /// Give up waiting for an event to commit after this many milliseconds; wait forever if not set
    #[clap(long, env = "PROPOSE_TIMEOUT_MS")]
    pub propose_timeout_ms: Option<u64>,
}

impl NodeConfig {
    pub fn build(args: &[&str]) -> Result<NodeConfig, ConfigError> {
        let config = <Self as Parser>::try_parse_from(args).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()
    }

    /// Validate the state of this config.
    pub fn validate(self) -> Result<NodeConfig, ConfigError> {
        if self.snapshot_retain == 0 {
            return Err(ConfigError::SnapshotRetainIs0);
        }

        self.raft_config()?;
        Ok(self)
    }

    pub fn node_id(&self) -> String {
        self.node_id.clone().unwrap_or_else(|| self.port.to_string())
    }

    /// The address this node listens on and is known by: `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn local_node(&self) -> Node {
        Node::new(self.node_id(), self.addr())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| PathBuf::from("data").join(self.port.to_string()))
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir().join("snapshots")
    }

    /// Where the raft log and the vote are kept.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("raft")
    }

    pub fn raft_config(&self) -> Result<openraft::Config, ConfigError> {
        let config = openraft::Config {
            cluster_name: "raft-event-store".to_string(),
            heartbeat_interval: self.heartbeat_interval,
            election_timeout_min: self.election_timeout_min,
            election_timeout_max: self.election_timeout_max,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(self.snapshot_threshold),
            ..Default::default()
        };

        Ok(config.validate()?)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn propose_timeout(&self) -> Option<Duration> {
        self.propose_timeout_ms.map(Duration::from_millis)
    }
}
