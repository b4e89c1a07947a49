//! Configuration management for Rollcall Core

use crate::domain::SmtpConfig;
use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Public base URL used when building confirmation links
    pub app_base_url: String,
    /// Database configuration
    pub database: DatabaseConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// Outgoing email configuration
    pub email: EmailConfig,
    /// Invitation rules and limits
    pub invitations: InvitationConfig,
    /// Logging and metrics
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub access_token_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Sender for invitations and confirmation emails
    pub noreply_address: String,
    pub noreply_name: Option<String>,
    /// None disables SMTP; messages are only logged
    pub smtp: Option<SmtpConfig>,
    /// How often due reminder emails are delivered
    pub reminder_poll_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct InvitationConfig {
    /// Default validity of emailed invitation links
    pub invitation_link_validity_minutes: i64,
    /// Validity of registration confirmation links
    pub confirmation_link_validity_minutes: i64,
    /// Daily invitation ceiling for realms without their own limit
    pub default_realm_daily_max: u32,
    /// Non-admin accounts younger than this may not invite
    pub min_user_age_days: i64,
    /// Realms younger than this share the aggregate limits below
    pub new_realm_days: i64,
    /// `(days, count)` windows applied across all new realms
    pub new_realm_limit_days: Vec<(i64, u32)>,
    /// Daily limits only apply on servers with open realm creation
    pub open_realm_creation: bool,
    /// System bot addresses that can never be invited
    pub cross_realm_bot_emails: Vec<String>,
    /// Domains rejected when a realm disallows disposable addresses
    pub disposable_email_domains: Vec<String>,
    /// Billable seats per realm; None means unlimited
    pub license_limit: Option<u64>,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            invitation_link_validity_minutes: 10 * 24 * 60,
            confirmation_link_validity_minutes: 24 * 60,
            default_realm_daily_max: 100,
            min_user_age_days: 3,
            new_realm_days: 7,
            new_realm_limit_days: vec![(1, 100)],
            open_realm_creation: false,
            cross_realm_bot_emails: default_cross_realm_bots(),
            disposable_email_domains: default_disposable_domains(),
            license_limit: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "pretty"
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            metrics_enabled: false,
        }
    }
}

fn default_cross_realm_bots() -> Vec<String> {
    vec![
        "notification-bot@rollcall.local".to_string(),
        "welcome-bot@rollcall.local".to_string(),
    ]
}

fn default_disposable_domains() -> Vec<String> {
    [
        "mailinator.com",
        "guerrillamail.com",
        "10minutemail.com",
        "trashmail.com",
        "yopmail.com",
        "tempmail.com",
    ]
    .iter()
    .map(|d| d.to_string())
    .collect()
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|s| s.to_lowercase() == "true")
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = InvitationConfig::default();

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            app_base_url: {
                let raw = env::var("APP_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string());
                url::Url::parse(&raw).context("Invalid APP_BASE_URL")?;
                raw.trim_end_matches('/').to_string()
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").context("JWT_SECRET is required")?,
                issuer: env::var("JWT_ISSUER")
                    .unwrap_or_else(|_| "https://rollcall.local".to_string()),
                access_token_ttl_secs: env::var("JWT_ACCESS_TOKEN_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            },
            email: {
                let noreply_address = env::var("NOREPLY_EMAIL_ADDRESS")
                    .unwrap_or_else(|_| "noreply@rollcall.local".to_string());
                let noreply_name = env::var("NOREPLY_EMAIL_NAME").ok();
                let smtp = match env::var("SMTP_HOST") {
                    Ok(host) => Some(SmtpConfig {
                        host,
                        port: env::var("SMTP_PORT")
                            .unwrap_or_else(|_| "587".to_string())
                            .parse()
                            .context("Invalid SMTP_PORT")?,
                        username: env::var("SMTP_USERNAME").ok(),
                        password: env::var("SMTP_PASSWORD").ok(),
                        use_tls: env::var("SMTP_USE_TLS")
                            .map(|s| s.to_lowercase() != "false")
                            .unwrap_or(true),
                        from_email: noreply_address.clone(),
                        from_name: noreply_name.clone(),
                    }),
                    Err(_) => None,
                };
                EmailConfig {
                    noreply_address,
                    noreply_name,
                    smtp,
                    reminder_poll_interval_secs: env::var("REMINDER_POLL_INTERVAL_SECS")
                        .unwrap_or_else(|_| "60".to_string())
                        .parse()
                        .unwrap_or(60),
                }
            },
            invitations: InvitationConfig {
                invitation_link_validity_minutes: env::var("INVITATION_LINK_VALIDITY_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.invitation_link_validity_minutes),
                confirmation_link_validity_minutes: env::var(
                    "CONFIRMATION_LINK_DEFAULT_VALIDITY_MINUTES",
                )
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confirmation_link_validity_minutes),
                default_realm_daily_max: env::var("INVITES_DEFAULT_REALM_DAILY_MAX")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.default_realm_daily_max),
                min_user_age_days: env::var("INVITES_MIN_USER_AGE_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.min_user_age_days),
                new_realm_days: env::var("INVITES_NEW_REALM_DAYS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.new_realm_days),
                new_realm_limit_days: match env::var("INVITES_NEW_REALM_LIMIT_DAYS") {
                    Ok(raw) => serde_json::from_str(&raw)
                        .context("INVITES_NEW_REALM_LIMIT_DAYS must be a JSON list of [days, count]")?,
                    Err(_) => defaults.new_realm_limit_days,
                },
                open_realm_creation: env_flag("OPEN_REALM_CREATION"),
                cross_realm_bot_emails: env::var("CROSS_REALM_BOT_EMAILS")
                    .map(|s| parse_list(&s))
                    .unwrap_or(defaults.cross_realm_bot_emails),
                disposable_email_domains: env::var("DISPOSABLE_EMAIL_DOMAINS")
                    .map(|s| parse_list(&s))
                    .unwrap_or(defaults.disposable_email_domains),
                license_limit: env::var("REALM_LICENSE_LIMIT")
                    .ok()
                    .map(|s| s.parse())
                    .transpose()
                    .context("Invalid REALM_LICENSE_LIMIT")?,
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
                metrics_enabled: env_flag("METRICS_ENABLED"),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Absolute URL for a path on the public site
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}/{}", self.app_base_url, path.trim_start_matches('/'))
    }
}
