use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;
use crate::schedule::ScheduleError;
use crate::status::CancellationDenied;

/// Problems with a creation request. Any of these aborts creation before
/// anything is written.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("move-in start {start} is after move-in end {end}")]
    InvertedMoveIn {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
    #[error("'{field}': {source}")]
    DayIndex {
        field: &'static str,
        source: ScheduleError,
    },
    #[error("malformed request body: {0}")]
    Body(String),
    #[error("listing {0} not found")]
    ListingNotFound(Uuid),
    #[error("guest {0} not found")]
    GuestNotFound(Uuid),
    #[error("host {0} not found")]
    HostNotFound(Uuid),
}

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("proposal {0} not found")]
    NotFound(Uuid),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Cancellation(#[from] CancellationDenied),
    #[error("proposal {0} kept changing, try again")]
    Contended(Uuid),
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("worker task failed: {0}")]
    Task(String),
}

impl ProposalError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProposalError::Validation(_) => StatusCode::BAD_REQUEST,
            ProposalError::NotFound(_) => StatusCode::NOT_FOUND,
            ProposalError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProposalError::Cancellation(_) | ProposalError::Contended(_) => StatusCode::CONFLICT,
            ProposalError::Store(_) | ProposalError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProposalError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ProposalStatus;

    #[test]
    fn maps_errors_to_http_statuses() {
        let cases = [
            (ProposalError::from(ValidationError::MissingField("guest_id")), StatusCode::BAD_REQUEST),
            (ProposalError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (ProposalError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (
                ProposalError::from(CancellationDenied::AlreadyTerminal(
                    ProposalStatus::CancelledByGuest,
                )),
                StatusCode::CONFLICT,
            ),
            (ProposalError::Contended(Uuid::nil()), StatusCode::CONFLICT),
            (
                ProposalError::from(StoreError::Corrupt("bad".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn validation_messages_name_the_field() {
        let err = ValidationError::InvalidField {
            field: "proposed_nightly_price",
            reason: "must be a non-negative amount".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for 'proposed_nightly_price': must be a non-negative amount"
        );
    }
}
