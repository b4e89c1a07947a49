//! Email domain types: outgoing messages and scheduled deliveries

use super::common::{mysql_string_enum, ConfirmationId, RealmId, ScheduledEmailId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// SMTP configuration for email sending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct SmtpConfig {
    #[validate(length(min = 1, max = 255))]
    pub host: String,
    /// Typically 587 for STARTTLS, 25 for unencrypted relays
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    #[validate(email)]
    pub from_email: String,
    pub from_name: Option<String>,
}

/// Email address with optional display name
#[derive(Debug, Clone, PartialEq)]
pub struct EmailAddress {
    pub email: String,
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }
}

/// Email message to be sent
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: Vec<EmailAddress>,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

impl EmailMessage {
    pub fn new(to: EmailAddress, subject: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            to: vec![to],
            subject: subject.into(),
            html_body: html_body.into(),
            text_body: None,
        }
    }

    pub fn with_text_body(mut self, text_body: impl Into<String>) -> Self {
        self.text_body = Some(text_body.into());
        self
    }
}

/// Result of sending an email
#[derive(Debug)]
pub struct EmailSendResult {
    pub message_id: Option<String>,
}

impl EmailSendResult {
    pub fn success(message_id: Option<String>) -> Self {
        Self { message_id }
    }
}

/// Kinds of deferred emails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledEmailKind {
    InvitationReminder,
}

impl std::str::FromStr for ScheduledEmailKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invitation_reminder" => Ok(Self::InvitationReminder),
            _ => Err(format!("Unknown scheduled email kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ScheduledEmailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvitationReminder => write!(f, "invitation_reminder"),
        }
    }
}

mysql_string_enum!(ScheduledEmailKind);

/// A rendered email waiting for its delivery time.
///
/// Jobs are keyed by the confirmation they remind about so that redeeming or
/// revoking that confirmation can cancel them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledEmail {
    pub id: ScheduledEmailId,
    pub realm_id: RealmId,
    pub confirmation_id: Option<ConfirmationId>,
    pub address: String,
    pub kind: ScheduledEmailKind,
    pub scheduled_at: DateTime<Utc>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    /// Failed delivery attempts so far
    pub attempts: u32,
}

/// Fields for a new scheduled email
#[derive(Debug, Clone)]
pub struct NewScheduledEmail {
    pub realm_id: RealmId,
    pub confirmation_id: Option<ConfirmationId>,
    pub address: String,
    pub kind: ScheduledEmailKind,
    pub scheduled_at: DateTime<Utc>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Domain part of an address, if it has one
pub fn email_domain(address: &str) -> Option<&str> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}
