//! User account domain types

use super::common::{RealmId, UserId};
use super::role::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A member of a realm
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAccount {
    pub id: UserId,
    pub realm_id: RealmId,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    /// Placeholder account created by a mirroring integration; may still be invited
    pub is_mirror_dummy: bool,
    pub date_joined: DateTime<Utc>,
}

impl Default for UserAccount {
    fn default() -> Self {
        Self {
            id: UserId::new_v4(),
            realm_id: RealmId::new_v4(),
            email: String::new(),
            full_name: String::new(),
            role: Role::default(),
            is_active: true,
            is_mirror_dummy: false,
            date_joined: Utc::now(),
        }
    }
}
