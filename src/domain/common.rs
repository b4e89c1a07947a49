//! Common types for domain models

use uuid::Uuid;

/// Declares a typed identifier stored as CHAR(36) in MySQL.
///
/// sqlx's uuid feature expects BINARY(16), so each id encodes through `String`.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl sqlx::Type<sqlx::MySql> for $name {
            fn type_info() -> sqlx::mysql::MySqlTypeInfo {
                <String as sqlx::Type<sqlx::MySql>>::type_info()
            }

            fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::MySql> for $name {
            fn decode(
                value: sqlx::mysql::MySqlValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <String as sqlx::Decode<sqlx::MySql>>::decode(value)?;
                Ok(Self(Uuid::parse_str(&s)?))
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::MySql> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<u8>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <String as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&self.0.to_string(), buf)
            }
        }
    };
}

/// Stores an enum with `FromStr`/`Display` impls as a VARCHAR column.
macro_rules! mysql_string_enum {
    ($name:ty) => {
        impl sqlx::Type<sqlx::MySql> for $name {
            fn type_info() -> sqlx::mysql::MySqlTypeInfo {
                <String as sqlx::Type<sqlx::MySql>>::type_info()
            }

            fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::MySql> for $name {
            fn decode(
                value: sqlx::mysql::MySqlValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::MySql> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<u8>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                let s = self.to_string();
                <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&s.as_str(), buf)
            }
        }
    };
}

pub(crate) use mysql_string_enum;

string_id!(
    /// Realm (organization) identifier
    RealmId
);
string_id!(UserId);
string_id!(StreamId);
string_id!(
    /// Pending invite / registration request identifier
    InviteId
);
string_id!(MultiuseInviteId);
string_id!(ConfirmationId);
string_id!(ScheduledEmailId);
string_id!(
    /// Id of whatever record a confirmation points at
    ObjectId
);

impl From<InviteId> for ObjectId {
    fn from(id: InviteId) -> Self {
        ObjectId(id.0)
    }
}

impl From<MultiuseInviteId> for ObjectId {
    fn from(id: MultiuseInviteId) -> Self {
        ObjectId(id.0)
    }
}

impl From<ObjectId> for InviteId {
    fn from(id: ObjectId) -> Self {
        InviteId(id.0)
    }
}

impl From<ObjectId> for MultiuseInviteId {
    fn from(id: ObjectId) -> Self {
        MultiuseInviteId(id.0)
    }
}
