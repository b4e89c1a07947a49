//! Realm and stream domain types

use super::common::{RealmId, StreamId};
use super::role::InvitePolicy;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An organization; every user, stream and invitation belongs to exactly one
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Realm {
    pub id: RealmId,
    pub name: String,
    pub subdomain: String,
    pub invite_to_realm_policy: InvitePolicy,
    /// Signups need an invitation or multi-use link
    pub invite_required: bool,
    pub emails_restricted_to_domains: bool,
    #[sqlx(json)]
    pub allowed_domains: Vec<String>,
    pub disallow_disposable_email_addresses: bool,
    pub waiting_period_threshold_days: i64,
    /// Per-realm daily invite ceiling; None falls back to the server default
    pub max_invites: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Realm {
    pub fn effective_max_invites(&self, default_max: u32) -> u32 {
        self.max_invites.unwrap_or(default_max)
    }

    pub fn is_newer_than(&self, days: i64, now: DateTime<Utc>) -> bool {
        self.created_at > now - Duration::days(days)
    }

    /// Whether `domain` may sign up when the realm restricts domains.
    ///
    /// Subdomains of an allowed domain are accepted too.
    pub fn allows_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.allowed_domains.iter().any(|allowed| {
            let allowed = allowed.to_lowercase();
            domain == allowed || domain.ends_with(&format!(".{}", allowed))
        })
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self {
            id: RealmId::new_v4(),
            name: String::new(),
            subdomain: String::new(),
            invite_to_realm_policy: InvitePolicy::default(),
            invite_required: true,
            emails_restricted_to_domains: false,
            allowed_domains: Vec::new(),
            disallow_disposable_email_addresses: true,
            waiting_period_threshold_days: 0,
            max_invites: None,
            created_at: Utc::now(),
        }
    }
}

/// A channel users can be subscribed to when they join
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stream {
    pub id: StreamId,
    pub realm_id: RealmId,
    pub name: String,
    pub invite_only: bool,
}
