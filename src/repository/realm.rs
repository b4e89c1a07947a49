//! Realm, stream and invite-count repository

use crate::domain::{Realm, RealmId, Stream, StreamId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RealmRepository: Send + Sync {
    async fn find_by_id(&self, id: RealmId) -> Result<Option<Realm>>;

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Realm>>;

    /// Streams of `realm_id` among `ids`; unknown or foreign ids are left out
    async fn find_streams(&self, realm_id: RealmId, ids: &[StreamId]) -> Result<Vec<Stream>>;

    /// Atomically claim `count` invitations against the realm's count since
    /// `since`. Returns `None`, recording nothing, when the claim would pass
    /// `limit`.
    async fn reserve_invites(
        &self,
        realm_id: RealmId,
        count: u32,
        limit: Option<u64>,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>>;

    /// Replace a reservation's count with the number actually sent
    async fn settle_invites(&self, reservation: u64, sent: u32) -> Result<()>;

    async fn count_invites_sent_since(
        &self,
        realm_id: RealmId,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// Invitations sent since `since` by realms created after `created_after`
    /// that run on the default daily limit
    async fn count_new_realm_invites_since(
        &self,
        since: DateTime<Utc>,
        created_after: DateTime<Utc>,
    ) -> Result<u64>;
}

pub struct RealmRepositoryImpl {
    pool: MySqlPool,
}

impl RealmRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const REALM_COLUMNS: &str = "id, name, subdomain, invite_to_realm_policy, invite_required, \
     emails_restricted_to_domains, allowed_domains, disallow_disposable_email_addresses, \
     waiting_period_threshold_days, max_invites, created_at";

#[async_trait]
impl RealmRepository for RealmRepositoryImpl {
    async fn find_by_id(&self, id: RealmId) -> Result<Option<Realm>> {
        let realm = sqlx::query_as::<_, Realm>(&format!(
            "SELECT {} FROM realms WHERE id = ?",
            REALM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(realm)
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Realm>> {
        let realm = sqlx::query_as::<_, Realm>(&format!(
            "SELECT {} FROM realms WHERE subdomain = ?",
            REALM_COLUMNS
        ))
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(realm)
    }

    async fn find_streams(&self, realm_id: RealmId, ids: &[StreamId]) -> Result<Vec<Stream>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, realm_id, name, invite_only FROM streams WHERE realm_id = ? AND id IN ({})",
            placeholders
        );

        let mut query = sqlx::query_as::<_, Stream>(&sql).bind(realm_id);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn reserve_invites(
        &self,
        realm_id: RealmId,
        count: u32,
        limit: Option<u64>,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        // Serializes reservations for one realm
        sqlx::query("SELECT id FROM realms WHERE id = ? FOR UPDATE")
            .bind(realm_id)
            .execute(&mut *tx)
            .await?;

        if let Some(limit) = limit {
            let row: (Option<i64>,) = sqlx::query_as(
                "SELECT CAST(SUM(count) AS SIGNED) FROM realm_invite_counts WHERE realm_id = ? AND sent_at >= ?",
            )
            .bind(realm_id)
            .bind(since)
            .fetch_one(&mut *tx)
            .await?;

            let sent = row.0.unwrap_or(0).max(0) as u64;
            if sent.saturating_add(count as u64) > limit {
                return Ok(None);
            }
        }

        let result =
            sqlx::query("INSERT INTO realm_invite_counts (realm_id, sent_at, count) VALUES (?, ?, ?)")
                .bind(realm_id)
                .bind(at)
                .bind(count)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(Some(result.last_insert_id()))
    }

    async fn settle_invites(&self, reservation: u64, sent: u32) -> Result<()> {
        if sent == 0 {
            sqlx::query("DELETE FROM realm_invite_counts WHERE id = ?")
                .bind(reservation)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("UPDATE realm_invite_counts SET count = ? WHERE id = ?")
                .bind(sent)
                .bind(reservation)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    async fn count_invites_sent_since(
        &self,
        realm_id: RealmId,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT CAST(SUM(count) AS SIGNED) FROM realm_invite_counts WHERE realm_id = ? AND sent_at >= ?",
        )
        .bind(realm_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.unwrap_or(0).max(0) as u64)
    }

    async fn count_new_realm_invites_since(
        &self,
        since: DateTime<Utc>,
        created_after: DateTime<Utc>,
    ) -> Result<u64> {
        let row: (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT CAST(SUM(c.count) AS SIGNED)
            FROM realm_invite_counts c
            JOIN realms r ON r.id = c.realm_id
            WHERE c.sent_at >= ? AND r.created_at >= ? AND r.max_invites IS NULL
            "#,
        )
        .bind(since)
        .bind(created_after)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0.unwrap_or(0).max(0) as u64)
    }
}
