//! Scheduled email repository

use crate::domain::{ConfirmationId, NewScheduledEmail, ScheduledEmail, ScheduledEmailId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScheduledEmailRepository: Send + Sync {
    async fn create(&self, input: &NewScheduledEmail) -> Result<ScheduledEmail>;

    /// Jobs whose time has come, earliest first
    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledEmail>>;

    async fn list_for_confirmation(&self, id: ConfirmationId) -> Result<Vec<ScheduledEmail>>;

    async fn delete(&self, id: ScheduledEmailId) -> Result<()>;

    /// Count a failed delivery and move the job to `retry_at`
    async fn record_failed_attempt(
        &self,
        id: ScheduledEmailId,
        retry_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn delete_for_confirmations(&self, ids: &[ConfirmationId]) -> Result<u64>;
}

pub struct ScheduledEmailRepositoryImpl {
    pool: MySqlPool,
}

impl ScheduledEmailRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

const SCHEDULED_COLUMNS: &str = "id, realm_id, confirmation_id, address, kind, scheduled_at, \
     subject, html_body, text_body, attempts";

#[async_trait]
impl ScheduledEmailRepository for ScheduledEmailRepositoryImpl {
    async fn create(&self, input: &NewScheduledEmail) -> Result<ScheduledEmail> {
        let email = ScheduledEmail {
            id: ScheduledEmailId::new_v4(),
            realm_id: input.realm_id,
            confirmation_id: input.confirmation_id,
            address: input.address.clone(),
            kind: input.kind,
            scheduled_at: input.scheduled_at,
            subject: input.subject.clone(),
            html_body: input.html_body.clone(),
            text_body: input.text_body.clone(),
            attempts: 0,
        };

        sqlx::query(
            r#"
            INSERT INTO scheduled_emails (id, realm_id, confirmation_id, address, kind, scheduled_at,
                subject, html_body, text_body)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(email.id)
        .bind(email.realm_id)
        .bind(email.confirmation_id)
        .bind(&email.address)
        .bind(email.kind)
        .bind(email.scheduled_at)
        .bind(&email.subject)
        .bind(&email.html_body)
        .bind(&email.text_body)
        .execute(&self.pool)
        .await?;

        Ok(email)
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledEmail>> {
        let emails = sqlx::query_as::<_, ScheduledEmail>(&format!(
            "SELECT {} FROM scheduled_emails WHERE scheduled_at <= ? ORDER BY scheduled_at ASC LIMIT ?",
            SCHEDULED_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(emails)
    }

    async fn list_for_confirmation(&self, id: ConfirmationId) -> Result<Vec<ScheduledEmail>> {
        let emails = sqlx::query_as::<_, ScheduledEmail>(&format!(
            "SELECT {} FROM scheduled_emails WHERE confirmation_id = ?",
            SCHEDULED_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(emails)
    }

    async fn delete(&self, id: ScheduledEmailId) -> Result<()> {
        sqlx::query("DELETE FROM scheduled_emails WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: ScheduledEmailId,
        retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scheduled_emails SET attempts = attempts + 1, scheduled_at = ? WHERE id = ?",
        )
        .bind(retry_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_for_confirmations(&self, ids: &[ConfirmationId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM scheduled_emails WHERE confirmation_id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}
