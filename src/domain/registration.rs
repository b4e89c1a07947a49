//! Registration domain types

use super::common::{ConfirmationId, InviteId, RealmId, StreamId, UserId};
use super::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to join a realm through a multi-use link
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct JoinRequest {
    /// Subdomain of the realm the link was opened on
    #[validate(length(min = 1, max = 64))]
    pub realm: String,
    #[validate(length(min = 1, max = 254))]
    pub email: String,
}

/// Self-service signup request for realms that do not require invitations
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 64))]
    pub realm: String,
    #[validate(length(min = 1, max = 254))]
    pub email: String,
}

/// Query for previewing a registration link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrationQuery {
    pub realm: String,
}

/// What the registration form needs to show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPreview {
    pub email: String,
    pub realm_id: RealmId,
    pub realm_name: String,
}

/// Final step of a registration
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CompleteRegistrationInput {
    pub realm: String,
    pub key: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
}

/// The account created by a completed registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub user_id: UserId,
    pub realm_id: RealmId,
    pub email: String,
}

/// Everything a completed registration writes, committed as one unit
#[derive(Debug, Clone)]
pub struct NewRegistration {
    /// Key consumed by this registration
    pub confirmation_id: ConfirmationId,
    pub invite_id: InviteId,
    pub realm_id: RealmId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub stream_ids: Vec<StreamId>,
    /// Mirror placeholder to activate instead of creating a new account
    pub mirror_dummy: Option<UserId>,
    pub at: DateTime<Utc>,
}
