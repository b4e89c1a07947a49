//! Outgoing email: provider abstraction, SMTP adapter and templates

pub mod provider;
pub mod smtp;
pub mod templates;

pub use provider::{EmailProvider, EmailProviderError, LogEmailProvider};
pub use smtp::SmtpEmailProvider;
pub use templates::{EmailTemplate, RenderedEmail, TemplateEngine};
