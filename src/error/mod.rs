//! Unified error handling for Rollcall Core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Failures resolving or retiring a confirmation key
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationError {
    #[error("The confirmation link is malformed.")]
    Malformed,

    #[error("We couldn't find your confirmation link in the system.")]
    NotFound,

    #[error("The confirmation link has expired or been deactivated.")]
    Expired,

    #[error("The confirmation link has already been revoked.")]
    AlreadyRevoked,

    /// Never shown to callers; see [`ConfirmationError::external`]
    #[error("We couldn't find your confirmation link in the system.")]
    WrongKind,
}

impl ConfirmationError {
    /// Collapse kinds that must not leak to callers.
    ///
    /// A key of the wrong kind looks exactly like a missing key.
    pub fn external(self) -> Self {
        match self {
            Self::WrongKind => Self::NotFound,
            other => other,
        }
    }
}

/// Per-address rejection inside an invitation batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteeError {
    pub email: String,
    pub reason: String,
    /// The address belongs to a deactivated account
    pub deactivated: bool,
}

/// A failed (or partially failed) invitation batch
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct InvitationError {
    pub message: String,
    pub errors: Vec<InviteeError>,
    /// Some invitations were sent despite the error
    pub sent_invitations: bool,
    pub license_limit_reached: bool,
}

impl InvitationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
            sent_invitations: false,
            license_limit_reached: false,
        }
    }

    pub fn with_errors(mut self, errors: Vec<InviteeError>) -> Self {
        self.errors = errors;
        self
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Confirmation error: {0}")]
    Confirmation(#[from] ConfirmationError),

    #[error("Invitation error: {0}")]
    Invitation(#[from] InvitationError),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut details = None;
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg.clone()),
            AppError::Confirmation(e) => match e.external() {
                ConfirmationError::AlreadyRevoked => {
                    (StatusCode::BAD_REQUEST, "already_revoked", e.to_string())
                }
                ConfirmationError::Malformed => {
                    (StatusCode::NOT_FOUND, "confirmation_malformed", e.to_string())
                }
                ConfirmationError::Expired => {
                    (StatusCode::NOT_FOUND, "confirmation_expired", e.to_string())
                }
                ConfirmationError::NotFound | ConfirmationError::WrongKind => (
                    StatusCode::NOT_FOUND,
                    "confirmation_not_found",
                    ConfirmationError::NotFound.to_string(),
                ),
            },
            AppError::Invitation(e) => {
                details = serde_json::to_value(e).ok();
                (StatusCode::BAD_REQUEST, "invitation_failed", e.message.clone())
            }
            AppError::AlreadyRegistered(email) => (
                StatusCode::CONFLICT,
                "already_registered",
                format!("{} already has an account", email),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Jwt(e) => {
                tracing::error!("JWT error: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "jwt_error",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
