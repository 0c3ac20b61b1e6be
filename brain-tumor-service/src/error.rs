use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use session_store::StoreError;
use thiserror::Error;
use tracing::{error, warn};

use crate::collaborators::{ClassifierError, DecodeError, GenerationError};

/// Failures surfaced at the HTTP boundary.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Store(e) => match e {
                StoreError::InvalidInput(_) | StoreError::NotFound(_) => StatusCode::BAD_REQUEST,
                StoreError::CapacityExceeded { .. } => StatusCode::SERVICE_UNAVAILABLE,
                StoreError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServiceError::Decode(e) => match e {
                DecodeError::Empty | DecodeError::Unsupported(_) => StatusCode::BAD_REQUEST,
                DecodeError::Timeout(_) | DecodeError::Failed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ServiceError::Generation(GenerationError::TooLarge { .. }) => StatusCode::BAD_REQUEST,
            ServiceError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Classifier(ClassifierError::InvalidImage(_)) => StatusCode::BAD_REQUEST,
            ServiceError::Classifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Server faults keep their root cause in the logs only.
    fn public_message(&self) -> String {
        match self {
            ServiceError::Store(StoreError::NotFound(_)) => {
                "Invalid or expired session ID".to_string()
            }
            ServiceError::Store(StoreError::CapacityExceeded { .. }) => {
                "Session store is at capacity, please retry later".to_string()
            }
            ServiceError::Decode(DecodeError::Timeout(_) | DecodeError::Failed(_)) => {
                "Failed to process the uploaded document".to_string()
            }
            ServiceError::Generation(_) => "Failed to generate an answer".to_string(),
            ServiceError::Classifier(ClassifierError::Upstream(_) | ClassifierError::Malformed(_)) => {
                "Failed to classify the image".to_string()
            }
            ServiceError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        } else {
            warn!("Rejected request with {}: {}", status, self);
        }

        let body = Json(json!({
            "success": false,
            "message": self.public_message()
        }));
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(e: anyhow::Error) -> Self {
        ServiceError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            ServiceError::from(StoreError::NotFound("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::from(DecodeError::Unsupported("gif".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidInput("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn server_faults_and_capacity() {
        assert_eq!(
            ServiceError::from(StoreError::CapacityExceeded {
                required: 10,
                limit: 5
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::from(GenerationError::Timeout(Duration::from_secs(1))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::from(DecodeError::Failed("poppler".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn server_fault_messages_hide_root_cause() {
        let err = ServiceError::from(GenerationError::Upstream("secret upstream detail".into()));
        assert!(!err.public_message().contains("secret"));

        let err = ServiceError::from(StoreError::NotFound("abc".into()));
        assert_eq!(err.public_message(), "Invalid or expired session ID");
    }
}
