//! The HTTP surface of a node: the control plane for operators and the replication endpoints
//! for peers, plus the client side of replication.

use actix_web::web::ServiceConfig;

pub mod api;
pub mod error;
pub mod management;
pub mod raft;
mod raft_network_impl;

pub use raft_network_impl::Network;
pub use raft_network_impl::PeerConnection;

/// Register every endpoint of a node on an actix `App`.
pub fn configure(cfg: &mut ServiceConfig) {
    cfg.app_data(error::json_config())
        // raft internal RPC
        .service(raft::append)
        .service(raft::snapshot)
        .service(raft::vote)
        // admin API
        .service(management::list_nodes)
        .service(management::add_node)
        .service(management::remove_node)
        .service(management::metrics)
        .service(management::snapshot)
        // application API
        .service(api::submit_event)
        .service(api::list_events);
}
