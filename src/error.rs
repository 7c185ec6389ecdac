use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors raised by the `/auth` routes and the auth extractor.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    DuplicateUser,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No token, authorization denied")]
    Unauthorized,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Insufficient role")]
    Forbidden,

    #[error("Server error")]
    Storage(#[from] anyhow::Error),
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct MsgBody {
    pub msg: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::DuplicateUser => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Storage(e) => {
                error!(error = %format!("{e:#}"), "auth storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(MsgBody { msg: self.to_string() })).into_response()
    }
}

/// Errors raised by the feedback and upload routes.
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("{0}")]
    Validation(String),

    #[error("Image exceeds the {limit} byte upload limit")]
    PayloadTooLarge { limit: usize },

    #[error("Request body exceeds the {limit} byte limit")]
    FormTooLarge { limit: usize },

    #[error("Feedback not found")]
    NotFound,

    #[error("Failed to store feedback")]
    Storage(#[from] anyhow::Error),
}

impl From<JsonRejection> for FeedbackError {
    fn from(rejection: JsonRejection) -> Self {
        FeedbackError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for FeedbackError {
    fn from(rejection: QueryRejection) -> Self {
        FeedbackError::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for FeedbackError {
    fn from(rejection: MultipartRejection) -> Self {
        FeedbackError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for FeedbackError {
    fn from(rejection: PathRejection) -> Self {
        FeedbackError::Validation(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for FeedbackError {
    fn into_response(self) -> Response {
        let status = match &self {
            FeedbackError::Validation(_) => StatusCode::BAD_REQUEST,
            FeedbackError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FeedbackError::FormTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            FeedbackError::NotFound => StatusCode::NOT_FOUND,
            FeedbackError::Storage(e) => {
                error!(error = %format!("{e:#}"), "feedback storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
