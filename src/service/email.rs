//! Email sending and scheduled delivery

use crate::domain::{
    ConfirmationId, EmailAddress, EmailMessage, EmailSendResult, NewScheduledEmail, RealmId,
    ScheduledEmail, ScheduledEmailKind,
};
use crate::email::{EmailProvider, EmailTemplate, RenderedEmail, TemplateEngine};
use crate::error::{AppError, Result};
use crate::repository::ScheduledEmailRepository;
use crate::telemetry::metrics;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Jobs fetched per delivery pass
pub const DELIVERY_BATCH: i64 = 100;

/// Failed sends after which a job is dropped
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Wait before the first retry; doubles with each further failure
const RETRY_BASE_MINUTES: i64 = 5;

/// Outcome of one [`EmailService::deliver_due`] pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Failed and rescheduled
    pub failed: usize,
    /// Failed for the last allowed time and removed
    pub dropped: usize,
}

pub struct EmailService<S: ScheduledEmailRepository> {
    provider: Arc<dyn EmailProvider>,
    scheduled_repo: Arc<S>,
}

impl<S: ScheduledEmailRepository> EmailService<S> {
    pub fn new(provider: Arc<dyn EmailProvider>, scheduled_repo: Arc<S>) -> Self {
        Self {
            provider,
            scheduled_repo,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Render `template` and send it immediately
    pub async fn send_now(
        &self,
        template: EmailTemplate,
        to: &str,
        context: &TemplateEngine,
    ) -> Result<EmailSendResult> {
        let rendered = context.render_template(template);
        self.deliver(to, &rendered).await
    }

    /// Render `template` now and store it for delivery at `at`
    pub async fn schedule(
        &self,
        realm_id: RealmId,
        confirmation_id: Option<ConfirmationId>,
        kind: ScheduledEmailKind,
        to: &str,
        context: &TemplateEngine,
        at: DateTime<Utc>,
    ) -> Result<ScheduledEmail> {
        let rendered = context.render_template(template_for(kind));
        let job = self
            .scheduled_repo
            .create(&NewScheduledEmail {
                realm_id,
                confirmation_id,
                address: to.to_string(),
                kind,
                scheduled_at: at,
                subject: rendered.subject,
                html_body: rendered.html_body,
                text_body: rendered.text_body,
            })
            .await?;

        metrics::record_scheduled_email("scheduled");
        tracing::debug!(job_id = %job.id, scheduled_at = %at, %kind, "Scheduled email");
        Ok(job)
    }

    /// Drop reminders tied to these confirmations
    pub async fn cancel_for_confirmations(&self, ids: &[ConfirmationId]) -> Result<u64> {
        let cancelled = self.scheduled_repo.delete_for_confirmations(ids).await?;
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled scheduled emails");
        }
        Ok(cancelled)
    }

    /// Send and remove every job whose time has come.
    ///
    /// A job that fails to send is pushed back with exponential backoff so it
    /// cannot hold up the jobs behind it, and dropped after
    /// [`MAX_DELIVERY_ATTEMPTS`] failures.
    pub async fn deliver_due(&self, now: DateTime<Utc>) -> Result<DeliveryReport> {
        let mut report = DeliveryReport::default();

        for job in self.scheduled_repo.list_due(now, DELIVERY_BATCH).await? {
            let rendered = RenderedEmail {
                subject: job.subject.clone(),
                html_body: job.html_body.clone(),
                text_body: job.text_body.clone(),
            };

            match self.deliver(&job.address, &rendered).await {
                Ok(_) => {
                    self.scheduled_repo.delete(job.id).await?;
                    metrics::record_scheduled_email("delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    let attempts = job.attempts + 1;
                    if attempts >= MAX_DELIVERY_ATTEMPTS {
                        self.scheduled_repo.delete(job.id).await?;
                        tracing::warn!(
                            job_id = %job.id,
                            attempts,
                            error = %e,
                            "Scheduled email dropped after repeated failures"
                        );
                        metrics::record_scheduled_email("dropped");
                        report.dropped += 1;
                    } else {
                        let retry_at = now + retry_delay(attempts);
                        self.scheduled_repo
                            .record_failed_attempt(job.id, retry_at)
                            .await?;
                        tracing::warn!(
                            job_id = %job.id,
                            attempts,
                            %retry_at,
                            error = %e,
                            "Scheduled email delivery failed"
                        );
                        metrics::record_scheduled_email("failed");
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    async fn deliver(&self, to: &str, rendered: &RenderedEmail) -> Result<EmailSendResult> {
        let message = EmailMessage::new(
            EmailAddress::new(to),
            &rendered.subject,
            &rendered.html_body,
        )
        .with_text_body(&rendered.text_body);

        self.provider.send(&message).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Email send via {} failed: {}",
                self.provider.provider_name(),
                e
            ))
        })
    }
}

/// Backoff after the `attempts`-th failure
fn retry_delay(attempts: u32) -> Duration {
    Duration::minutes(RETRY_BASE_MINUTES << attempts.saturating_sub(1).min(10))
}

fn template_for(kind: ScheduledEmailKind) -> EmailTemplate {
    match kind {
        ScheduledEmailKind::InvitationReminder => EmailTemplate::InvitationReminder,
    }
}
