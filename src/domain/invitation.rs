//! Invitation domain types

use super::common::{InviteId, MultiuseInviteId, RealmId, StreamId, UserId};
use super::role::InviteAs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Upper bound for a caller-chosen link validity (30 days)
pub const MAX_INVITE_VALIDITY_MINUTES: i64 = 30 * 24 * 60;

/// A registration waiting for its confirmation link to be used.
///
/// Created for each emailed invitation, for each multi-use link redemption
/// and for self-service signups (`referred_by` is then `None`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingInvite {
    pub id: InviteId,
    pub realm_id: RealmId,
    pub email: String,
    pub referred_by: Option<UserId>,
    pub invited_as: InviteAs,
    #[sqlx(json)]
    pub stream_ids: Vec<StreamId>,
    pub multiuse_invite_id: Option<MultiuseInviteId>,
    /// Validity used when the invitation email is sent again
    pub invite_expires_in_minutes: Option<i64>,
    pub created_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl PendingInvite {
    /// Emailed by a member, as opposed to a signup or link redemption
    pub fn is_email_invitation(&self) -> bool {
        self.referred_by.is_some() && self.multiuse_invite_id.is_none()
    }
}

impl Default for PendingInvite {
    fn default() -> Self {
        Self {
            id: InviteId::new_v4(),
            realm_id: RealmId::new_v4(),
            email: String::new(),
            referred_by: None,
            invited_as: InviteAs::default(),
            stream_ids: Vec::new(),
            multiuse_invite_id: None,
            invite_expires_in_minutes: None,
            created_user_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Fields for a new pending invite
#[derive(Debug, Clone, PartialEq)]
pub struct NewPendingInvite {
    pub realm_id: RealmId,
    pub email: String,
    pub referred_by: Option<UserId>,
    pub invited_as: InviteAs,
    pub stream_ids: Vec<StreamId>,
    pub multiuse_invite_id: Option<MultiuseInviteId>,
    pub invite_expires_in_minutes: Option<i64>,
}

/// A reusable invitation link not bound to an email address
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MultiuseInvite {
    pub id: MultiuseInviteId,
    pub realm_id: RealmId,
    pub referred_by: UserId,
    pub invited_as: InviteAs,
    #[sqlx(json)]
    pub stream_ids: Vec<StreamId>,
    pub created_at: DateTime<Utc>,
}

impl Default for MultiuseInvite {
    fn default() -> Self {
        Self {
            id: MultiuseInviteId::new_v4(),
            realm_id: RealmId::new_v4(),
            referred_by: UserId::new_v4(),
            invited_as: InviteAs::default(),
            stream_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Distinguishes an omitted field (`None`) from an explicit `null` (`Some(None)`)
fn deserialize_explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn default_invite_as() -> i32 {
    InviteAs::Member.code()
}

/// Input for inviting users by email
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct InviteUsersInput {
    /// Comma or newline separated addresses, optionally as `Name <addr>`
    #[validate(length(max = 100_000))]
    pub invitee_emails: String,
    #[serde(default)]
    pub stream_ids: Vec<StreamId>,
    /// Omitted: server default. `null`: never expires.
    #[serde(
        default,
        deserialize_with = "deserialize_explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub invite_expires_in_minutes: Option<Option<i64>>,
    #[serde(default = "default_invite_as")]
    pub invite_as: i32,
}

/// Input for creating a multi-use invitation link
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateMultiuseInput {
    #[serde(default)]
    pub stream_ids: Vec<StreamId>,
    #[serde(
        default,
        deserialize_with = "deserialize_explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub invite_expires_in_minutes: Option<Option<i64>>,
    #[serde(default = "default_invite_as")]
    pub invite_as: i32,
}

/// Resolve the requested validity against the server default.
///
/// Returns `Err` when an explicit value is outside `1..=MAX_INVITE_VALIDITY_MINUTES`.
pub fn resolve_link_validity(
    requested: Option<Option<i64>>,
    default_minutes: i64,
) -> Result<Option<i64>, String> {
    match requested {
        None => Ok(Some(default_minutes)),
        Some(None) => Ok(None),
        Some(Some(minutes)) if (1..=MAX_INVITE_VALIDITY_MINUTES).contains(&minutes) => {
            Ok(Some(minutes))
        }
        Some(Some(_)) => Err("Invalid invite_expires_in_minutes".to_string()),
    }
}

/// One row of the open-invitations listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InviteListItem {
    pub id: uuid::Uuid,
    pub invited_by_user_id: Option<UserId>,
    /// Unix timestamp of the invitation
    pub invited: i64,
    /// Unix timestamp, or null when the link never expires
    pub expiry_date: Option<i64>,
    pub invited_as: InviteAs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_multiuse: bool,
}

/// Result of a successful invite batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteUsersResponse {
    pub invited: Vec<String>,
}

/// Result of creating a multi-use link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiuseLinkResponse {
    pub invite_link: String,
}
