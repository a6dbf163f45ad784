use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::usecases::subscriptions::SubscriptionError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::Validation(err) => AppError::BadRequest(err.to_string()),
            SubscriptionError::NotFound => AppError::NotFound("Subscription not found".to_string()),
            SubscriptionError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(_) => {
                // Don't leak internal error detail to client
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use crates::domain::value_objects::subscriptions::ValidationError;

    #[test]
    fn subscription_errors_map_to_status_codes() {
        let cases = [
            (
                SubscriptionError::Validation(ValidationError::MissingField("price")),
                StatusCode::BAD_REQUEST,
            ),
            (SubscriptionError::NotFound, StatusCode::NOT_FOUND),
            (
                SubscriptionError::Internal(anyhow!("pool timed out")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status_code(), expected);
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }

    #[test]
    fn validation_message_names_the_field() {
        let err = AppError::from(SubscriptionError::Validation(ValidationError::MissingField(
            "start_date",
        )));
        match err {
            AppError::BadRequest(msg) => assert!(msg.contains("start_date"), "got: {msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
