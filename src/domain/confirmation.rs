//! Confirmation link domain types

use super::common::{mysql_string_enum, ConfirmationId, ObjectId, RealmId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a confirmation key unlocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    UserRegistration,
    Invitation,
    EmailChange,
    MultiuseInvite,
    RealmCreation,
}

impl ConfirmationKind {
    /// Multi-use keys are never marked used; they stay valid until revoked or expired.
    pub fn is_multi_use(&self) -> bool {
        matches!(self, Self::MultiuseInvite)
    }
}

impl std::str::FromStr for ConfirmationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_registration" => Ok(Self::UserRegistration),
            "invitation" => Ok(Self::Invitation),
            "email_change" => Ok(Self::EmailChange),
            "multiuse_invite" => Ok(Self::MultiuseInvite),
            "realm_creation" => Ok(Self::RealmCreation),
            _ => Err(format!("Unknown confirmation kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ConfirmationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UserRegistration => "user_registration",
            Self::Invitation => "invitation",
            Self::EmailChange => "email_change",
            Self::MultiuseInvite => "multiuse_invite",
            Self::RealmCreation => "realm_creation",
        };
        f.write_str(s)
    }
}

mysql_string_enum!(ConfirmationKind);

/// Confirmation status. `Used` and `Revoked` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    #[default]
    Pending,
    Used,
    Revoked,
}

impl std::str::FromStr for ConfirmationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "used" => Ok(Self::Used),
            "revoked" => Ok(Self::Revoked),
            _ => Err(format!("Unknown confirmation status: {}", s)),
        }
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Used => write!(f, "used"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

mysql_string_enum!(ConfirmationStatus);

/// Stored confirmation. Only the SHA-256 digest of the key is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Confirmation {
    pub id: ConfirmationId,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub kind: ConfirmationKind,
    pub object_id: ObjectId,
    pub realm_id: RealmId,
    pub status: ConfirmationStatus,
    pub created_at: DateTime<Utc>,
    /// None means the link never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Confirmation {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Pending and not expired
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConfirmationStatus::Pending && !self.is_expired_at(now)
    }
}

impl Default for Confirmation {
    fn default() -> Self {
        Self {
            id: ConfirmationId::new_v4(),
            key_hash: String::new(),
            kind: ConfirmationKind::Invitation,
            object_id: ObjectId::new_v4(),
            realm_id: RealmId::new_v4(),
            status: ConfirmationStatus::default(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }
}

/// A freshly issued confirmation together with its plain key.
///
/// The key only exists here; it is handed to the caller for the link and never stored.
#[derive(Debug, Clone)]
pub struct IssuedConfirmation {
    pub confirmation: Confirmation,
    pub key: String,
}
