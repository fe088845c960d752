//! Replication endpoints, called by [`Network`](crate::network::Network) on the peers.
//!
//! Engine errors travel back inside the JSON body as `Result`, so these handlers always
//! answer 200.

use actix_web::post;
use actix_web::web::Data;
use actix_web::web::Json;
use openraft::error::InstallSnapshotError;
use openraft::raft::AppendEntriesRequest;
use openraft::raft::AppendEntriesResponse;
use openraft::raft::InstallSnapshotRequest;
use openraft::raft::InstallSnapshotResponse;
use openraft::raft::VoteRequest;
use openraft::raft::VoteResponse;

use crate::app::App;
use crate::typ::RaftError;
use crate::NodeId;
use crate::TypeConfig;

#[post("/raft-vote")]
pub async fn vote(app: Data<App>, req: Json<VoteRequest<NodeId>>) -> Json<Result<VoteResponse<NodeId>, RaftError>> {
    tracing::debug!(vote = %req.vote, "recv vote request");
    Json(app.raft.vote(req.0).await)
}

#[post("/raft-append")]
pub async fn append(
    app: Data<App>,
    req: Json<AppendEntriesRequest<TypeConfig>>,
) -> Json<Result<AppendEntriesResponse<NodeId>, RaftError>> {
    tracing::debug!(vote = %req.vote, entries = req.entries.len(), "recv append entries");
    Json(app.raft.append_entries(req.0).await)
}

#[post("/raft-snapshot")]
pub async fn snapshot(
    app: Data<App>,
    req: Json<InstallSnapshotRequest<TypeConfig>>,
) -> Json<Result<InstallSnapshotResponse<NodeId>, RaftError<InstallSnapshotError>>> {
    tracing::debug!(meta = ?req.meta, offset = req.offset, done = req.done, "recv snapshot chunk");
    Json(app.raft.install_snapshot(req.0).await)
}
