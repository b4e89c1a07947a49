//! Email provider trait and error types

use crate::domain::{EmailMessage, EmailSendResult};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailProviderError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Transport that hands a rendered message to the outside world
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<EmailSendResult, EmailProviderError>;

    fn provider_name(&self) -> &'static str;
}

/// Provider used when no SMTP relay is configured.
///
/// Messages are written to the log and reported as sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<EmailSendResult, EmailProviderError> {
        let recipients: Vec<&str> = message.to.iter().map(|a| a.email.as_str()).collect();
        tracing::info!(
            to = ?recipients,
            subject = %message.subject,
            "SMTP not configured, email not delivered"
        );
        Ok(EmailSendResult::success(None))
    }

    fn provider_name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EmailAddress;

    #[tokio::test]
    async fn test_mock_email_provider() {
        let mut mock = MockEmailProvider::new();

        mock.expect_provider_name().returning(|| "mock");
        mock.expect_send()
            .returning(|_| Ok(EmailSendResult::success(Some("msg-123".to_string()))));

        assert_eq!(mock.provider_name(), "mock");

        let message = EmailMessage::new(
            EmailAddress::new("test@example.com"),
            "Test",
            "<p>Hello</p>",
        );
        let result = mock.send(&message).await.unwrap();
        assert_eq!(result.message_id.as_deref(), Some("msg-123"));
    }

    #[tokio::test]
    async fn test_log_provider_reports_success() {
        let provider = LogEmailProvider;
        let message = EmailMessage::new(EmailAddress::new("a@example.com"), "Hi", "<p>Hi</p>");

        let result = provider.send(&message).await.unwrap();
        assert!(result.message_id.is_none());
        assert_eq!(provider.provider_name(), "log");
    }

    #[test]
    fn test_email_provider_error_display() {
        let err = EmailProviderError::SendFailed("recipient rejected".to_string());
        assert_eq!(err.to_string(), "Send failed: recipient rejected");
    }
}
