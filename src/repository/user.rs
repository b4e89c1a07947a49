//! User account repository

use crate::domain::{
    ConfirmationKind, ConfirmationStatus, NewRegistration, RealmId, UserAccount, UserId,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>>;

    /// Case-insensitive lookup of an account in a realm
    async fn find_by_email(&self, realm_id: RealmId, email: &str) -> Result<Option<UserAccount>>;

    /// Consume the registration key and create (or activate) the account in one
    /// transaction. Returns `None` when the key was no longer pending, in which
    /// case nothing is written.
    async fn register(&self, registration: &NewRegistration) -> Result<Option<UserAccount>>;

    /// Active accounts that occupy a license seat
    async fn count_billable(&self, realm_id: RealmId) -> Result<u64>;
}

pub struct UserRepositoryImpl {
    pool: MySqlPool,
}

impl UserRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, realm_id, email, full_name, role, is_active, is_mirror_dummy, date_joined";

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, realm_id: RealmId, email: &str) -> Result<Option<UserAccount>> {
        let user = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {} FROM users WHERE realm_id = ? AND LOWER(email) = LOWER(?)",
            USER_COLUMNS
        ))
        .bind(realm_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn register(&self, registration: &NewRegistration) -> Result<Option<UserAccount>> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE confirmations
            SET status = ?
            WHERE id = ? AND status = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(ConfirmationStatus::Used)
        .bind(registration.confirmation_id)
        .bind(ConfirmationStatus::Pending)
        .bind(registration.at)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        let user_id = match registration.mirror_dummy {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE users
                    SET full_name = ?, role = ?, is_active = TRUE, is_mirror_dummy = FALSE, date_joined = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&registration.full_name)
                .bind(registration.role)
                .bind(registration.at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let id = UserId::new_v4();
                sqlx::query(
                    r#"
                    INSERT INTO users (id, realm_id, email, full_name, role, is_active, is_mirror_dummy, date_joined)
                    VALUES (?, ?, ?, ?, ?, TRUE, FALSE, ?)
                    "#,
                )
                .bind(id)
                .bind(registration.realm_id)
                .bind(&registration.email)
                .bind(&registration.full_name)
                .bind(registration.role)
                .bind(registration.at)
                .execute(&mut *tx)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                        AppError::AlreadyRegistered(registration.email.clone())
                    }
                    e => e.into(),
                })?;
                id
            }
        };

        for stream_id in &registration.stream_ids {
            sqlx::query("INSERT IGNORE INTO subscriptions (user_id, stream_id) VALUES (?, ?)")
                .bind(user_id)
                .bind(*stream_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE pending_invites SET created_user_id = ? WHERE id = ?")
            .bind(user_id)
            .bind(registration.invite_id)
            .execute(&mut *tx)
            .await?;

        // Other open invites for the same address in this realm are retired
        sqlx::query(
            r#"
            UPDATE confirmations c
            JOIN pending_invites p ON c.object_id = p.id
            SET c.status = ?
            WHERE p.realm_id = ? AND LOWER(p.email) = LOWER(?) AND p.id <> ?
              AND c.kind IN (?, ?) AND c.status = ?
            "#,
        )
        .bind(ConfirmationStatus::Revoked)
        .bind(registration.realm_id)
        .bind(&registration.email)
        .bind(registration.invite_id)
        .bind(ConfirmationKind::Invitation)
        .bind(ConfirmationKind::UserRegistration)
        .bind(ConfirmationStatus::Pending)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM scheduled_emails WHERE realm_id = ? AND LOWER(address) = LOWER(?)")
            .bind(registration.realm_id)
            .bind(&registration.email)
            .execute(&mut *tx)
            .await?;

        let user = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(user))
    }

    async fn count_billable(&self, realm_id: RealmId) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE realm_id = ? AND is_active = TRUE AND role <> 'guest'",
        )
        .bind(realm_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.max(0) as u64)
    }
}
