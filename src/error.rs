// error.rs
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::{header, HeaderValue, StatusCode};
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Poll not found")]
    PollNotFound,

    #[error("Option not found for this poll")]
    OptionNotFound,

    #[error("User has already voted in this poll")]
    DuplicateVote,

    #[error("Vote could not be committed after {attempts} attempts")]
    Conflict { attempts: u32 },

    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateVote => StatusCode::BAD_REQUEST,
            AppError::PollNotFound | AppError::OptionNotFound => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) | AppError::Config(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let detail = match &self {
            AppError::Storage(e) => {
                error!(error = %e, "storage failure");
                "Internal server error".to_string()
            }
            AppError::Config(_) | AppError::Io(_) => {
                error!(error = %self, "internal failure");
                "Internal server error".to_string()
            }
            AppError::Conflict { .. } => "Vote could not be recorded, try again".to_string(),
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        if matches!(self, AppError::Conflict { .. }) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
