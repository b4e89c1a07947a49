//! Pending invite and multi-use link repository

use crate::domain::{
    InviteAs, InviteId, MultiuseInvite, MultiuseInviteId, NewPendingInvite, PendingInvite,
    RealmId, StreamId, UserId,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn create_pending(&self, input: &NewPendingInvite) -> Result<PendingInvite>;

    async fn find_pending(&self, id: InviteId) -> Result<Option<PendingInvite>>;

    /// Emailed invitations in a realm, optionally only those sent by one user
    async fn list_email_invites(
        &self,
        realm_id: RealmId,
        referred_by: Option<UserId>,
    ) -> Result<Vec<PendingInvite>>;

    async fn create_multiuse(
        &self,
        realm_id: RealmId,
        referred_by: UserId,
        invited_as: InviteAs,
        stream_ids: &[StreamId],
    ) -> Result<MultiuseInvite>;

    async fn find_multiuse(&self, id: MultiuseInviteId) -> Result<Option<MultiuseInvite>>;

    /// Multi-use links in a realm, optionally only those created by one user
    async fn list_multiuse(
        &self,
        realm_id: RealmId,
        referred_by: Option<UserId>,
    ) -> Result<Vec<MultiuseInvite>>;
}

pub struct InvitationRepositoryImpl {
    pool: MySqlPool,
}

impl InvitationRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const PENDING_COLUMNS: &str = "id, realm_id, email, referred_by, invited_as, stream_ids, \
     multiuse_invite_id, invite_expires_in_minutes, created_user_id, created_at";

const MULTIUSE_COLUMNS: &str = "id, realm_id, referred_by, invited_as, stream_ids, created_at";

fn stream_ids_json(stream_ids: &[StreamId]) -> Result<String> {
    serde_json::to_string(stream_ids).map_err(|e| AppError::Internal(e.into()))
}

#[async_trait]
impl InvitationRepository for InvitationRepositoryImpl {
    async fn create_pending(&self, input: &NewPendingInvite) -> Result<PendingInvite> {
        let id = InviteId::new_v4();
        let stream_ids = stream_ids_json(&input.stream_ids)?;

        sqlx::query(
            r#"
            INSERT INTO pending_invites (id, realm_id, email, referred_by, invited_as, stream_ids,
                multiuse_invite_id, invite_expires_in_minutes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(id)
        .bind(input.realm_id)
        .bind(&input.email)
        .bind(input.referred_by)
        .bind(input.invited_as)
        .bind(&stream_ids)
        .bind(input.multiuse_invite_id)
        .bind(input.invite_expires_in_minutes)
        .execute(&self.pool)
        .await?;

        self.find_pending(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create pending invite")))
    }

    async fn find_pending(&self, id: InviteId) -> Result<Option<PendingInvite>> {
        let invite = sqlx::query_as::<_, PendingInvite>(&format!(
            "SELECT {} FROM pending_invites WHERE id = ?",
            PENDING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invite)
    }

    async fn list_email_invites(
        &self,
        realm_id: RealmId,
        referred_by: Option<UserId>,
    ) -> Result<Vec<PendingInvite>> {
        let invites = if let Some(referred_by) = referred_by {
            sqlx::query_as::<_, PendingInvite>(&format!(
                r#"
                SELECT {}
                FROM pending_invites
                WHERE realm_id = ? AND referred_by = ? AND multiuse_invite_id IS NULL
                ORDER BY created_at ASC
                "#,
                PENDING_COLUMNS
            ))
            .bind(realm_id)
            .bind(referred_by)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, PendingInvite>(&format!(
                r#"
                SELECT {}
                FROM pending_invites
                WHERE realm_id = ? AND referred_by IS NOT NULL AND multiuse_invite_id IS NULL
                ORDER BY created_at ASC
                "#,
                PENDING_COLUMNS
            ))
            .bind(realm_id)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(invites)
    }

    async fn create_multiuse(
        &self,
        realm_id: RealmId,
        referred_by: UserId,
        invited_as: InviteAs,
        stream_ids: &[StreamId],
    ) -> Result<MultiuseInvite> {
        let id = MultiuseInviteId::new_v4();
        let stream_ids = stream_ids_json(stream_ids)?;

        sqlx::query(
            r#"
            INSERT INTO multiuse_invites (id, realm_id, referred_by, invited_as, stream_ids, created_at)
            VALUES (?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(id)
        .bind(realm_id)
        .bind(referred_by)
        .bind(invited_as)
        .bind(&stream_ids)
        .execute(&self.pool)
        .await?;

        self.find_multiuse(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create multiuse invite")))
    }

    async fn find_multiuse(&self, id: MultiuseInviteId) -> Result<Option<MultiuseInvite>> {
        let invite = sqlx::query_as::<_, MultiuseInvite>(&format!(
            "SELECT {} FROM multiuse_invites WHERE id = ?",
            MULTIUSE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(invite)
    }

    async fn list_multiuse(
        &self,
        realm_id: RealmId,
        referred_by: Option<UserId>,
    ) -> Result<Vec<MultiuseInvite>> {
        let invites = if let Some(referred_by) = referred_by {
            sqlx::query_as::<_, MultiuseInvite>(&format!(
                "SELECT {} FROM multiuse_invites WHERE realm_id = ? AND referred_by = ? ORDER BY created_at ASC",
                MULTIUSE_COLUMNS
            ))
            .bind(realm_id)
            .bind(referred_by)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, MultiuseInvite>(&format!(
                "SELECT {} FROM multiuse_invites WHERE realm_id = ? ORDER BY created_at ASC",
                MULTIUSE_COLUMNS
            ))
            .bind(realm_id)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(invites)
    }
}
