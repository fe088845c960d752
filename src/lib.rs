#![allow(clippy::uninlined_format_args)]
#![deny(unused_qualifications)]

//! A replicated, single-leader event store.
//!
//! A cluster of nodes agrees on an ordered log of opaque events through `openraft`. Each node
//! applies committed entries to an in-memory [`EventFsm`](fsm::EventFsm), compacts it into
//! snapshots kept in a [`FileSnapshotStore`](snapshot::FileSnapshotStore), and serves an HTTP
//! control plane for membership changes and event submission.

use std::io::Cursor;

use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::HttpServer;
use openraft::TokioRuntime;

use crate::app::App;
use crate::config::NodeConfig;
use crate::error::StartError;
pub use crate::event::Event;
pub use crate::event::EventEntry;
pub use crate::event::EventResponse;
pub use crate::node::Node;

pub mod app;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod event;
pub mod fsm;
pub mod network;
pub mod node;
pub mod snapshot;
pub mod store;

pub type NodeId = u64;

openraft::declare_raft_types!(
    /// Declare the type configuration for the event store.
    pub TypeConfig:
        D = EventEntry,
        R = EventResponse,
        NodeId = NodeId,
        Node = Node,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime
);

pub type Raft = openraft::Raft<TypeConfig>;

pub mod typ {
    use crate::Node;
    use crate::NodeId;
    use crate::TypeConfig;

    pub type LogId = openraft::LogId<NodeId>;
    pub type Entry = openraft::Entry<TypeConfig>;
    pub type StoredMembership = openraft::StoredMembership<NodeId, Node>;

    pub type SnapshotMeta = openraft::SnapshotMeta<NodeId, Node>;
    pub type Snapshot = openraft::storage::Snapshot<TypeConfig>;

    pub type StorageError = openraft::StorageError<NodeId>;
    pub type Fatal = openraft::error::Fatal<NodeId>;
    pub type RaftError<E = openraft::error::Infallible> = openraft::error::RaftError<NodeId, E>;
    pub type RPCError<E = openraft::error::Infallible> = openraft::error::RPCError<NodeId, Node, RaftError<E>>;

    pub type ClientWriteError = openraft::error::ClientWriteError<NodeId, Node>;

    pub type ClientWriteResponse = openraft::raft::ClientWriteResponse<TypeConfig>;
    pub type RaftMetrics = openraft::RaftMetrics<NodeId, Node>;
}

/// Open the node described by `config` and serve its HTTP API until the server stops.
pub async fn start_event_node(config: NodeConfig) -> Result<(), StartError> {
    let addr = config.addr();
    let app = Data::new(App::open(&config).await?);

    tracing::info!(node = %app.node, "event store node is up");

    serve(app, &addr).await?;
    Ok(())
}

/// Serve the control plane and the replication endpoints of `app` on `addr`.
pub async fn serve(app: Data<App>, addr: &str) -> std::io::Result<()> {
    let server = HttpServer::new(move || {
        actix_web::App::new()
            .wrap(Logger::default())
            .app_data(app.clone())
            .configure(network::configure)
    });

    server.bind(addr)?.run().await
}
