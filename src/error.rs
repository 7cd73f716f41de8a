use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db;
use crate::forms::ValidationError;
use crate::uploads::UploadError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Upload(#[from] UploadError),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    /// Storage errors for a missing row become a 404 for `what`.
    pub fn from_store(what: &'static str) -> impl Fn(rusqlite::Error) -> ApiError {
        move |err| {
            if db::is_not_found(&err) {
                ApiError::NotFound(what)
            } else {
                ApiError::Storage(err)
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upload(UploadError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upload(UploadError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upload(UploadError::NotAnImage(_)) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Upload(UploadError::Empty) => StatusCode::BAD_REQUEST,
            ApiError::Upload(UploadError::Http(_) | UploadError::Service(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Storage(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("request failed: {self}");
            match &self {
                ApiError::Upload(UploadError::NotConfigured) => self.to_string(),
                ApiError::Upload(_) => "image upload failed".to_string(),
                _ => "internal error".to_string(),
            }
        } else {
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
