use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;

use crate::artifacts::ArtifactError;
use crate::mail::MailError;
use crate::orders::OrderStoreError;
use crate::submission::SubmissionError;

pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "internal server error";

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "resource not found")
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Logs the cause and answers with a generic message; details of storage,
    /// rendering or transport failures never reach the client.
    pub fn internal<E: Display>(error: E) -> Self {
        error!(error = %error, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<diesel::result::Error> for AppError {
    fn from(value: diesel::result::Error) -> Self {
        match value {
            diesel::result::Error::NotFound => AppError::not_found(),
            _ => AppError::internal(value),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(format!("{value:#}"))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        AppError::internal(format!("background task failed: {value}"))
    }
}

impl From<OrderStoreError> for AppError {
    fn from(value: OrderStoreError) -> Self {
        match value {
            OrderStoreError::NotFound(folio) => {
                AppError::new(StatusCode::NOT_FOUND, format!("order {folio} not found"))
            }
            OrderStoreError::DuplicateFolio(folio) => {
                AppError::conflict(format!("folio {folio} already exists"))
            }
            OrderStoreError::Conflict { .. } => {
                AppError::conflict("could not assign a folio, please retry")
            }
            OrderStoreError::Database(err) => AppError::internal(err),
        }
    }
}

impl From<ArtifactError> for AppError {
    fn from(value: ArtifactError) -> Self {
        match value {
            ArtifactError::NotFound(folio) => AppError::new(
                StatusCode::NOT_FOUND,
                format!("no document stored for order {folio}"),
            ),
            other => AppError::internal(other),
        }
    }
}

impl From<MailError> for AppError {
    fn from(value: MailError) -> Self {
        match value {
            MailError::InvalidAddress(address) => {
                AppError::bad_request(format!("invalid email address: {address}"))
            }
            MailError::Artifact(err) => AppError::from(err),
            other => AppError::internal(other),
        }
    }
}

impl From<SubmissionError> for AppError {
    fn from(value: SubmissionError) -> Self {
        match value {
            SubmissionError::Validation(err) => AppError::bad_request(err.to_string()),
            SubmissionError::Store(err) => AppError::from(err),
            other => AppError::internal(other),
        }
    }
}
