use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::{ledger::VoteError, store::StoreError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Method not allowed")]
    MethodNotSupported,

    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error("Store unavailable")]
    StoreUnavailable(#[from] StoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Vote(error) => match error {
                VoteError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                VoteError::NotFound(_) => StatusCode::NOT_FOUND,
                VoteError::AlreadyVotedForOption | VoteError::AlreadyVotedInNomination => {
                    StatusCode::CONFLICT
                }
                VoteError::VotingClosed => StatusCode::FORBIDDEN,
                VoteError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            AppError::MalformedPayload => "invalid_request",
            AppError::MethodNotSupported => "method_not_supported",
            AppError::StoreUnavailable(_) => "store_unavailable",
            AppError::Vote(error) => error.reason(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::StoreUnavailable(e) | AppError::Vote(VoteError::Store(e)) => {
                warn!("Store failure: {e}");
                "Store unavailable".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "reason": self.reason(),
        });

        (self.status(), Json(body)).into_response()
    }
}
