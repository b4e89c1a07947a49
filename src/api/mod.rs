//! REST API shared utilities

pub mod health;
pub mod invitation;
pub mod metrics;
pub mod registration;

use crate::domain::UserAccount;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::repository::UserRepository;
use crate::state::HasServices;
use serde::{Deserialize, Serialize};

/// Success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Message response (for delete, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The account behind a verified token.
///
/// Unknown, deactivated and placeholder accounts cannot act.
pub(crate) async fn load_actor<S: HasServices>(state: &S, auth: &AuthUser) -> Result<UserAccount> {
    let user = state.user_repo().find_by_id(auth.user_id).await?;
    match user {
        Some(user) if user.is_active && !user.is_mirror_dummy => Ok(user),
        _ => Err(AppError::Unauthorized("Account is not active".to_string())),
    }
}
