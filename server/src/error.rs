//! HTTP error responses
//!
//! Every failure is returned as JSON `{"error": message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// The model failed to load at startup
    ModelNotLoaded,
    /// The request carried no `file` field
    NoFile,
    /// The multipart body could not be read
    Multipart(StatusCode, String),
    /// Decoding or inference failed
    Prediction(String),
    /// The blocking worker panicked or was cancelled
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFile => StatusCode::BAD_REQUEST,
            ApiError::Multipart(status, _) => *status,
            ApiError::ModelNotLoaded | ApiError::Prediction(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::ModelNotLoaded => "Model not loaded".to_string(),
            ApiError::NoFile => "No file uploaded".to_string(),
            ApiError::Multipart(_, msg) | ApiError::Prediction(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}
