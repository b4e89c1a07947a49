//! Roles, invite policies and the role an invitation grants

use super::common::mysql_string_enum;
use serde::{Deserialize, Serialize};

/// Role of a user inside a realm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Moderator,
    #[default]
    Member,
    Guest,
}

impl Role {
    /// Owners and administrators
    pub fn is_realm_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "member" => Ok(Self::Member),
            "guest" => Ok(Self::Guest),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Moderator => write!(f, "moderator"),
            Self::Member => write!(f, "member"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

mysql_string_enum!(Role);

/// Realm setting controlling who may send invitations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvitePolicy {
    Nobody,
    AdminsOnly,
    ModeratorsOnly,
    #[default]
    MembersOnly,
    FullMembersOnly,
}

impl std::str::FromStr for InvitePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nobody" => Ok(Self::Nobody),
            "admins_only" => Ok(Self::AdminsOnly),
            "moderators_only" => Ok(Self::ModeratorsOnly),
            "members_only" => Ok(Self::MembersOnly),
            "full_members_only" => Ok(Self::FullMembersOnly),
            _ => Err(format!("Unknown invite policy: {}", s)),
        }
    }
}

impl std::fmt::Display for InvitePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Nobody => "nobody",
            Self::AdminsOnly => "admins_only",
            Self::ModeratorsOnly => "moderators_only",
            Self::MembersOnly => "members_only",
            Self::FullMembersOnly => "full_members_only",
        };
        f.write_str(s)
    }
}

mysql_string_enum!(InvitePolicy);

/// Role granted to whoever accepts an invitation.
///
/// Serialized as the integer codes used by API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "i32", into = "i32")]
pub enum InviteAs {
    RealmOwner,
    RealmAdmin,
    Moderator,
    #[default]
    Member,
    GuestUser,
}

impl InviteAs {
    pub fn code(&self) -> i32 {
        match self {
            Self::RealmOwner => 100,
            Self::RealmAdmin => 200,
            Self::Moderator => 300,
            Self::Member => 400,
            Self::GuestUser => 600,
        }
    }

    /// Role the new account is created with
    pub fn role(&self) -> Role {
        match self {
            Self::RealmOwner => Role::Owner,
            Self::RealmAdmin => Role::Admin,
            Self::Moderator => Role::Moderator,
            Self::Member => Role::Member,
            Self::GuestUser => Role::Guest,
        }
    }
}

impl TryFrom<i32> for InviteAs {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            100 => Ok(Self::RealmOwner),
            200 => Ok(Self::RealmAdmin),
            300 => Ok(Self::Moderator),
            400 => Ok(Self::Member),
            600 => Ok(Self::GuestUser),
            _ => Err("Invalid invite_as".to_string()),
        }
    }
}

impl From<InviteAs> for i32 {
    fn from(value: InviteAs) -> Self {
        value.code()
    }
}

impl sqlx::Type<sqlx::MySql> for InviteAs {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <i32 as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <i32 as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for InviteAs {
    fn decode(value: sqlx::mysql::MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let code: i32 = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        InviteAs::try_from(code).map_err(|e| e.into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for InviteAs {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <i32 as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&self.code(), buf)
    }
}
