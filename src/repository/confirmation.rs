//! Confirmation repository

use crate::domain::{
    Confirmation, ConfirmationId, ConfirmationKind, ConfirmationStatus, ObjectId, RealmId,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfirmationRepository: Send + Sync {
    /// Persist a new confirmation
    async fn create(&self, confirmation: &Confirmation) -> Result<()>;

    /// Whether any confirmation already uses this key digest
    async fn key_hash_exists(&self, key_hash: &str) -> Result<bool>;

    async fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<Confirmation>>;

    /// All confirmations for a target, oldest first
    async fn list_for_object(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<Vec<Confirmation>>;

    /// Pending, unexpired confirmations of `kind` in a realm
    async fn list_open_in_realm(
        &self,
        realm_id: RealmId,
        kind: ConfirmationKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Confirmation>>;

    /// Atomically move a pending, unexpired confirmation to `used`.
    ///
    /// Returns false when another caller got there first or the key expired.
    async fn mark_used_if_pending(&self, id: ConfirmationId, now: DateTime<Utc>) -> Result<bool>;

    /// Move every pending confirmation of a target to `revoked`; returns rows changed
    async fn revoke_pending_for_object(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<u64>;
}

pub struct ConfirmationRepositoryImpl {
    pool: MySqlPool,
}

impl ConfirmationRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const CONFIRMATION_COLUMNS: &str =
    "id, key_hash, kind, object_id, realm_id, status, created_at, expires_at";

#[async_trait]
impl ConfirmationRepository for ConfirmationRepositoryImpl {
    async fn create(&self, confirmation: &Confirmation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO confirmations (id, key_hash, kind, object_id, realm_id, status, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(confirmation.id)
        .bind(&confirmation.key_hash)
        .bind(confirmation.kind)
        .bind(confirmation.object_id)
        .bind(confirmation.realm_id)
        .bind(confirmation.status)
        .bind(confirmation.created_at)
        .bind(confirmation.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn key_hash_exists(&self, key_hash: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM confirmations WHERE key_hash = ?")
            .bind(key_hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0 > 0)
    }

    async fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<Confirmation>> {
        let confirmation = sqlx::query_as::<_, Confirmation>(&format!(
            "SELECT {} FROM confirmations WHERE key_hash = ?",
            CONFIRMATION_COLUMNS
        ))
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(confirmation)
    }

    async fn list_for_object(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<Vec<Confirmation>> {
        let confirmations = sqlx::query_as::<_, Confirmation>(&format!(
            r#"
            SELECT {}
            FROM confirmations
            WHERE kind = ? AND object_id = ?
            ORDER BY created_at ASC
            "#,
            CONFIRMATION_COLUMNS
        ))
        .bind(kind)
        .bind(object_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(confirmations)
    }

    async fn list_open_in_realm(
        &self,
        realm_id: RealmId,
        kind: ConfirmationKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Confirmation>> {
        let confirmations = sqlx::query_as::<_, Confirmation>(&format!(
            r#"
            SELECT {}
            FROM confirmations
            WHERE realm_id = ? AND kind = ? AND status = 'pending'
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY created_at ASC
            "#,
            CONFIRMATION_COLUMNS
        ))
        .bind(realm_id)
        .bind(kind)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(confirmations)
    }

    async fn mark_used_if_pending(&self, id: ConfirmationId, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE confirmations
            SET status = ?
            WHERE id = ? AND status = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
        )
        .bind(ConfirmationStatus::Used)
        .bind(id)
        .bind(ConfirmationStatus::Pending)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_pending_for_object(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE confirmations SET status = ? WHERE kind = ? AND object_id = ? AND status = ?",
        )
        .bind(ConfirmationStatus::Revoked)
        .bind(kind)
        .bind(object_id)
        .bind(ConfirmationStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
