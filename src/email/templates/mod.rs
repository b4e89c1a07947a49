//! Email templates
//!
//! Variables are written `{{name}}`. Values are HTML-escaped when rendered
//! into the HTML body and inserted verbatim into the subject and text body.

use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref PLACEHOLDER: regex::Regex = regex::Regex::new(r"\{\{(\w+)\}\}").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    /// Sent to each invitee
    Invitation,
    /// Sent two days later if the invitation is still open
    InvitationReminder,
    /// Sent after a signup or multi-use link redemption
    ConfirmRegistration,
}

impl EmailTemplate {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Invitation => "{{inviter_name}} invited you to join {{realm_name}}",
            Self::InvitationReminder => "Reminder: {{inviter_name}} invited you to join {{realm_name}}",
            Self::ConfirmRegistration => "Activate your {{realm_name}} account",
        }
    }

    pub fn html_body(&self) -> &'static str {
        match self {
            Self::Invitation => INVITATION_HTML,
            Self::InvitationReminder => INVITATION_REMINDER_HTML,
            Self::ConfirmRegistration => CONFIRM_REGISTRATION_HTML,
        }
    }

    pub fn text_body(&self) -> &'static str {
        match self {
            Self::Invitation => INVITATION_TEXT,
            Self::InvitationReminder => INVITATION_REMINDER_TEXT,
            Self::ConfirmRegistration => CONFIRM_REGISTRATION_TEXT,
        }
    }
}

/// Variable substitution for [`EmailTemplate`]s
#[derive(Debug, Default, Clone)]
pub struct TemplateEngine {
    variables: HashMap<String, String>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Substitute raw values. Unknown placeholders are left as they are.
    pub fn render(&self, template: &str) -> String {
        self.substitute(template, |value| value.to_string())
    }

    /// Substitute HTML-escaped values
    pub fn render_html(&self, template: &str) -> String {
        self.substitute(template, escape_html)
    }

    pub fn render_template(&self, template: EmailTemplate) -> RenderedEmail {
        RenderedEmail {
            subject: self.render(template.subject()),
            html_body: self.render_html(&LAYOUT.replace("{{content}}", template.html_body())),
            text_body: self.render(template.text_body()),
        }
    }

    // Single pass, so a value that itself looks like a placeholder is never expanded.
    fn substitute(&self, template: &str, encode: impl Fn(&str) -> String) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &regex::Captures| {
                match self.variables.get(&caps[1]) {
                    Some(value) => encode(value),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Shared page shell. `{{content}}` is filled in before variables are substituted.
const LAYOUT: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; line-height: 1.6; color: #333; background-color: #f5f5f5; }
        .container { max-width: 600px; margin: 40px auto; padding: 40px; background: #ffffff; border-radius: 8px; }
        .button { display: inline-block; background-color: #2563eb; color: #ffffff; padding: 14px 28px; text-decoration: none; border-radius: 6px; font-weight: 600; }
        .footer { font-size: 12px; color: #666; margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; }
    </style>
</head>
<body>
    <div class="container">
{{content}}
    </div>
</body>
</html>"#;

const INVITATION_HTML: &str = r#"        <p>Hi there,</p>
        <p><strong>{{inviter_name}}</strong> ({{inviter_email}}) wants you to join them on <strong>{{realm_name}}</strong>.</p>
        <p style="text-align: center; margin: 30px 0;">
            <a href="{{activate_url}}" class="button">Join {{realm_name}}</a>
        </p>
        <p style="font-size: 14px; color: #666;">{{expiry_text}}</p>
        <div class="footer">
            <p>If you weren't expecting this invitation, you can safely ignore this email.</p>
        </div>"#;

const INVITATION_TEXT: &str = r#"Hi there,

{{inviter_name}} ({{inviter_email}}) wants you to join them on {{realm_name}}.

To get started, visit:

{{activate_url}}

{{expiry_text}}

If you weren't expecting this invitation, you can safely ignore this email."#;

const INVITATION_REMINDER_HTML: &str = r#"        <p>Hi again,</p>
        <p>A couple of days ago, <strong>{{inviter_name}}</strong> ({{inviter_email}}) invited you to join <strong>{{realm_name}}</strong>. The invitation is still open.</p>
        <p style="text-align: center; margin: 30px 0;">
            <a href="{{activate_url}}" class="button">Join {{realm_name}}</a>
        </p>
        <p style="font-size: 14px; color: #666;">{{expiry_text}}</p>"#;

const INVITATION_REMINDER_TEXT: &str = r#"Hi again,

A couple of days ago, {{inviter_name}} ({{inviter_email}}) invited you to join {{realm_name}}. The invitation is still open.

{{activate_url}}

{{expiry_text}}"#;

const CONFIRM_REGISTRATION_HTML: &str = r#"        <p>Hi there,</p>
        <p>You recently signed up for <strong>{{realm_name}}</strong>. Confirm your email address to finish creating your account.</p>
        <p style="text-align: center; margin: 30px 0;">
            <a href="{{activate_url}}" class="button">Confirm and log in</a>
        </p>
        <div class="footer">
            <p>If you didn't request this, you can safely ignore this email.</p>
        </div>"#;

const CONFIRM_REGISTRATION_TEXT: &str = r#"Hi there,

You recently signed up for {{realm_name}}. Confirm your email address to finish creating your account:

{{activate_url}}

If you didn't request this, you can safely ignore this email."#;
