use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use openraft::error::InitializeError;
use openraft::error::RaftError;

use crate::cluster::ClusterManager;
use crate::config::NodeConfig;
use crate::error::ProposeError;
use crate::error::StartError;
use crate::fsm::EventFsm;
use crate::network::Network;
use crate::snapshot::FileSnapshotStore;
use crate::store::LogStore;
use crate::store::StateMachineStore;
use crate::typ;
use crate::Event;
use crate::EventEntry;
use crate::Node;
use crate::NodeId;
use crate::Raft;

/// Everything a running node shares between its HTTP handlers.
pub struct App {
    pub id: NodeId,
    pub node: Node,
    pub raft: Raft,
    pub cluster: ClusterManager,
    pub fsm: Arc<EventFsm>,
    pub propose_timeout: Option<Duration>,
}

impl App {
    /// Restore the latest snapshot, open the raft log, start the consensus engine and, if asked
    /// to, bootstrap a single-node cluster.
    ///
    /// Bootstrapping a node that already has a vote or logs on disk is a no-op.
    pub async fn open(config: &NodeConfig) -> Result<App, StartError> {
        let config = config.clone().validate()?;
        let raft_config = Arc::new(config.raft_config()?);

        let node = config.local_node();
        let id = node.node_id();

        let snapshots = FileSnapshotStore::open(config.snapshot_dir(), config.snapshot_retain)?;
        let fsm = Arc::new(EventFsm::new());
        let state_machine = Arc::new(StateMachineStore::open(fsm.clone(), snapshots)?);

        let log_store = LogStore::open(config.log_dir())?;
        let network = Network::new();

        let raft = Raft::new(id, raft_config, network, log_store, state_machine).await?;

        if config.bootstrap_cluster {
            bootstrap(&raft, id, node.clone()).await?;
        }

        Ok(App {
            id,
            node,
            cluster: ClusterManager::new(raft.clone(), config.probe_timeout()),
            raft,
            fsm,
            propose_timeout: config.propose_timeout(),
        })
    }

    /// Replicate `event` and wait until it is committed and applied.
    pub async fn propose(&self, event: &Event) -> Result<typ::ClientWriteResponse, ProposeError> {
        self.cluster.ensure_leader()?;

        let entry = EventEntry::encode(event)?;
        let write = self.raft.client_write(entry);

        let res = match self.propose_timeout {
            Some(timeout) => tokio::time::timeout(timeout, write).await.map_err(|_| ProposeError::Timeout(timeout))?,
            None => write.await,
        };

        res.map_err(|e| match self.cluster.not_leader_of(&e) {
            Some(not_leader) => ProposeError::NotLeader(not_leader),
            None => ProposeError::Rejected(e.to_string()),
        })
    }
}

async fn bootstrap(raft: &Raft, id: NodeId, node: Node) -> Result<(), StartError> {
    let res = raft.initialize(BTreeMap::from([(id, node.clone())])).await;

    match res {
        Ok(()) => {
            tracing::info!(node = %node, "bootstrapped a new cluster");
            Ok(())
        }
        Err(RaftError::APIError(InitializeError::NotAllowed(e))) => {
            tracing::info!(error = %e, "cluster is already initialized, skip bootstrap");
            Ok(())
        }
        Err(e) => Err(StartError::Bootstrap(e.to_string())),
    }
}
