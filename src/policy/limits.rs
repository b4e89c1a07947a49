//! Daily invitation limits

use crate::config::InvitationConfig;
use crate::domain::Realm;
use crate::error::{InvitationError, Result};
use crate::repository::RealmRepository;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const INVITE_LIMIT_MESSAGE: &str = "To protect users, we limit the number of invitations \
     you can send in one day. Because you have reached the limit, no invitations were sent.";

pub fn limit_reached() -> InvitationError {
    InvitationError::new(INVITE_LIMIT_MESSAGE)
}

/// Sending `batch` more on top of `already_sent` would pass `limit`.
pub fn exceeds(already_sent: u64, batch: usize, limit: u64) -> bool {
    already_sent.saturating_add(batch as u64) > limit
}

/// Young realms on the default limit also share the server-wide windows.
///
/// Realms given a higher ceiling by an operator are exempt.
pub fn subject_to_new_realm_limits(
    realm: &Realm,
    config: &InvitationConfig,
    now: DateTime<Utc>,
) -> bool {
    realm.is_newer_than(config.new_realm_days, now)
        && realm.effective_max_invites(config.default_realm_daily_max)
            <= config.default_realm_daily_max
}

/// Enforces daily invitation ceilings against the realm's send history
pub struct InviteLimiter<R: RealmRepository> {
    realms: Arc<R>,
    config: InvitationConfig,
}

impl<R: RealmRepository> InviteLimiter<R> {
    pub fn new(realms: Arc<R>, config: InvitationConfig) -> Self {
        Self { realms, config }
    }

    /// Fail if sending `num_invitees` more would pass a daily limit.
    ///
    /// Limits only apply on servers with open realm creation.
    pub async fn check(&self, realm: &Realm, num_invitees: usize, now: DateTime<Utc>) -> Result<()> {
        if !self.config.open_realm_creation {
            return Ok(());
        }

        let realm_max = realm.effective_max_invites(self.config.default_realm_daily_max) as u64;
        let sent_today = self
            .realms
            .count_invites_sent_since(realm.id, now - Duration::days(1))
            .await?;
        if exceeds(sent_today, num_invitees, realm_max) {
            tracing::warn!(realm_id = %realm.id, sent_today, num_invitees, "Realm invite limit reached");
            return Err(limit_reached().into());
        }

        if !subject_to_new_realm_limits(realm, &self.config, now) {
            return Ok(());
        }

        let new_realms_since = now - Duration::days(self.config.new_realm_days);
        for &(days, count) in &self.config.new_realm_limit_days {
            let sent = self
                .realms
                .count_new_realm_invites_since(now - Duration::days(days), new_realms_since)
                .await?;
            if exceeds(sent, num_invitees, count as u64) {
                tracing::warn!(days, count, sent, "Server-wide new realm invite limit reached");
                return Err(limit_reached().into());
            }
        }

        Ok(())
    }

    /// Claim `num_invitees` against the realm's daily limit before sending.
    ///
    /// The claim is checked and recorded atomically, so concurrent batches
    /// cannot pass the limit together. Settle it with the number actually sent.
    pub async fn reserve(
        &self,
        realm: &Realm,
        num_invitees: usize,
        now: DateTime<Utc>,
    ) -> Result<InviteReservation> {
        let limit = self
            .config
            .open_realm_creation
            .then(|| realm.effective_max_invites(self.config.default_realm_daily_max) as u64);
        let count = u32::try_from(num_invitees).map_err(|_| limit_reached())?;

        match self
            .realms
            .reserve_invites(realm.id, count, limit, now - Duration::days(1), now)
            .await?
        {
            Some(id) => Ok(InviteReservation { id, count }),
            None => {
                tracing::warn!(realm_id = %realm.id, num_invitees, "Realm invite limit reached");
                Err(limit_reached().into())
            }
        }
    }

    /// Record how many of a reservation's invitations went out
    pub async fn settle(&self, reservation: InviteReservation, sent: usize) -> Result<()> {
        let sent = (sent as u32).min(reservation.count);
        if sent == reservation.count {
            return Ok(());
        }
        self.realms.settle_invites(reservation.id, sent).await
    }
}

/// Invitations claimed against a realm's daily limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InviteReservation {
    id: u64,
    count: u32,
}
