//! Bearer token authentication
//!
//! `AuthUser` only proves a token is valid. Handlers load the account
//! itself, so deactivations take effect before the token expires.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::jwt::AccessClaims;
use crate::state::HasServices;

/// Caller identity taken from a verified access token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: UserId,
}

impl AuthUser {
    pub fn from_claims(claims: &AccessClaims) -> Result<Self, AuthError> {
        let user_id = claims
            .sub
            .parse()
            .map_err(|_| AuthError::InvalidToken("Invalid user ID in token".to_string()))?;
        Ok(Self { user_id })
    }
}

/// Authentication errors
#[derive(Debug, Clone)]
pub enum AuthError {
    MissingToken,
    InvalidHeader(String),
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::MissingToken => "Missing authorization token",
            AuthError::InvalidHeader(_) => "Invalid authorization header",
            AuthError::InvalidToken(_) => "Invalid token",
        };
        tracing::debug!(reason = ?self, "Rejected request authentication");

        let body = serde_json::json!({
            "error": "unauthorized",
            "message": message,
        });

        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}

fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader("Invalid header encoding".to_string()))?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AuthError::InvalidHeader("Authorization header must use Bearer scheme".to_string())
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: HasServices + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = state
            .jwt_manager()
            .verify_access_token(token)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        AuthUser::from_claims(&claims)
    }
}
