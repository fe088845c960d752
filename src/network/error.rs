use actix_web::http::StatusCode;
use actix_web::web::JsonConfig;
use actix_web::HttpResponse;
use actix_web::ResponseError;
use serde::Deserialize;
use serde::Serialize;

use crate::error::MembershipError;
use crate::error::NotLeader;
use crate::error::ProposeError;

/// Raft RPCs carry whole log batches and snapshot chunks.
const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

/// The JSON body of every failed control plane request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOutput {
    pub status_code: u16,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_address: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    NotLeader(#[from] NotLeader),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Timeout(String),
}

impl ApiError {
    pub fn output(&self) -> ErrorOutput {
        let (leader_id, leader_address) = match self {
            ApiError::NotLeader(e) => (e.leader_id.clone(), e.leader_address.clone()),
            _ => (None, None),
        };

        ErrorOutput {
            status_code: self.status_code().as_u16(),
            message: self.to_string(),
            leader_id,
            leader_address,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotLeader(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.output())
    }
}

impl From<MembershipError> for ApiError {
    fn from(e: MembershipError) -> Self {
        match e {
            MembershipError::NotLeader(e) => ApiError::NotLeader(e),
            MembershipError::Unreachable { .. } | MembershipError::EngineRejected(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<ProposeError> for ApiError {
    fn from(e: ProposeError) -> Self {
        match e {
            ProposeError::NotLeader(e) => ApiError::NotLeader(e),
            ProposeError::Encode(_) => ApiError::BadRequest(e.to_string()),
            ProposeError::Rejected(_) => ApiError::Internal(e.to_string()),
            ProposeError::Timeout(_) => ApiError::Timeout(e.to_string()),
        }
    }
}

/// Body extractor config: any body that fails to decode is answered with a 400 [`ErrorOutput`].
pub fn json_config() -> JsonConfig {
    JsonConfig::default()
        .limit(MAX_BODY_SIZE)
        .error_handler(|err, _req| ApiError::BadRequest(format!("invalid request body: {}", err)).into())
}
