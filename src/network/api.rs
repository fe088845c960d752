use actix_web::get;
use actix_web::post;
use actix_web::web::Data;
use actix_web::web::Json;
use serde::Deserialize;
use serde::Serialize;

use crate::app::App;
use crate::network::error::ApiError;
use crate::Event;

/// Where a committed event ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAppended {
    /// Index of the raft log entry carrying the event.
    pub log_index: u64,

    /// Position of the event in the event log.
    pub position: u64,
}

/// Append an event to the replicated event log.
///
/// Responds once the event is committed by a quorum and applied on this node.
#[post("/events")]
pub async fn submit_event(app: Data<App>, req: Json<Event>) -> Result<Json<EventAppended>, ApiError> {
    let resp = app.propose(&req.0).await?;
    let log_index = resp.log_id.index;

    match resp.data.position {
        Some(position) => Ok(Json(EventAppended { log_index, position })),
        None => Err(ApiError::Internal(format!(
            "event committed at log index {} was not applied",
            log_index
        ))),
    }
}

/// The events applied on this node, which may lag the leader on other nodes.
#[get("/events")]
pub async fn list_events(app: Data<App>) -> Json<Vec<Event>> {
    Json(app.fsm.events())
}
