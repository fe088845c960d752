use actix_web::delete;
use actix_web::get;
use actix_web::post;
use actix_web::web::Data;
use actix_web::web::Json;
use serde::Deserialize;
use serde::Serialize;

use crate::app::App;
use crate::network::error::ApiError;
use crate::node::NodeInfo;
use crate::node::NodeRef;
use crate::typ::RaftMetrics;
use crate::Node;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Empty {}

// --- Cluster management

/// List the members this node knows of.
#[get("/nodes")]
pub async fn list_nodes(app: Data<App>) -> Json<Vec<NodeInfo>> {
    Json(app.cluster.list_nodes())
}

/// Add a node as a voter. Only the leader accepts it.
#[post("/nodes")]
pub async fn add_node(app: Data<App>, req: Json<Node>) -> Result<Json<Vec<NodeInfo>>, ApiError> {
    let node = req.0;
    node.validate().map_err(ApiError::BadRequest)?;

    app.cluster.add_node(node).await?;
    Ok(Json(app.cluster.list_nodes()))
}

/// Remove a node from the cluster. Only the leader accepts it.
#[delete("/nodes")]
pub async fn remove_node(app: Data<App>, req: Json<NodeRef>) -> Result<Json<Vec<NodeInfo>>, ApiError> {
    if req.id.trim().is_empty() {
        return Err(ApiError::BadRequest("node id must not be empty".to_string()));
    }

    app.cluster.remove_node(&req.id).await?;
    Ok(Json(app.cluster.list_nodes()))
}

/// Get the latest metrics of the consensus engine on this node.
#[get("/metrics")]
pub async fn metrics(app: Data<App>) -> Json<RaftMetrics> {
    Json(app.raft.metrics().borrow().clone())
}

/// Build a snapshot on this node now, without waiting for the log threshold.
#[post("/snapshot")]
pub async fn snapshot(app: Data<App>) -> Result<Json<Empty>, ApiError> {
    app.raft.trigger().snapshot().await.map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(Empty {}))
}
