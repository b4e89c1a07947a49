//! SMTP email provider using lettre

use super::provider::{EmailProvider, EmailProviderError};
use crate::domain::{EmailAddress, EmailMessage, EmailSendResult, SmtpConfig};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

pub struct SmtpEmailProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: EmailAddress,
}

impl SmtpEmailProvider {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, EmailProviderError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| EmailProviderError::InvalidConfiguration(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = EmailAddress {
            email: config.from_email.clone(),
            name: config.from_name.clone(),
        };
        mailbox(&from)?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build(&self, message: &EmailMessage) -> Result<Message, EmailProviderError> {
        if message.to.is_empty() {
            return Err(EmailProviderError::InvalidConfiguration(
                "No recipients specified".to_string(),
            ));
        }

        let mut builder = Message::builder()
            .from(mailbox(&self.from)?)
            .subject(&message.subject);
        for address in &message.to {
            builder = builder.to(mailbox(address)?);
        }

        let built = match &message.text_body {
            Some(text_body) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_HTML)
                .body(message.html_body.clone()),
        };

        built.map_err(|e| EmailProviderError::SendFailed(e.to_string()))
    }
}

fn mailbox(address: &EmailAddress) -> Result<Mailbox, EmailProviderError> {
    let raw = match &address.name {
        Some(name) => format!("{} <{}>", name, address.email),
        None => address.email.clone(),
    };
    raw.parse().map_err(|e| {
        EmailProviderError::InvalidConfiguration(format!("Invalid address {}: {}", raw, e))
    })
}

fn classify(error: lettre::transport::smtp::Error) -> EmailProviderError {
    let message = error.to_string();
    if message.contains("authentication") || message.contains("AUTH") {
        EmailProviderError::AuthenticationFailed(message)
    } else if message.contains("connection") || message.contains("timeout") {
        EmailProviderError::ConnectionError(message)
    } else {
        EmailProviderError::SendFailed(message)
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, message: &EmailMessage) -> Result<EmailSendResult, EmailProviderError> {
        let email = self.build(message)?;
        let response = self.transport.send(email).await.map_err(classify)?;
        let message_id = response.message().next().map(|s| s.to_string());
        Ok(EmailSendResult::success(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}
