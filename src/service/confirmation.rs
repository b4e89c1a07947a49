//! Confirmation key lifecycle: issue, resolve, revoke

use crate::domain::{
    Confirmation, ConfirmationId, ConfirmationKind, ConfirmationStatus, IssuedConfirmation,
    ObjectId, RealmId,
};
use crate::error::{AppError, ConfirmationError, Result};
use crate::repository::ConfirmationRepository;
use crate::telemetry::metrics;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Random bytes per key; 15 bytes encode to exactly 24 base32 characters.
const KEY_BYTES: usize = 15;
pub const KEY_LENGTH: usize = 24;

/// Upper bound on regenerations after a digest collision
const MAX_KEY_ATTEMPTS: usize = 5;

lazy_static::lazy_static! {
    static ref KEY_FORMAT: regex::Regex = regex::Regex::new(r"^[a-z0-9]{24}$").unwrap();
}

/// Generate a fresh lowercase base32 key
pub fn generate_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes).to_lowercase()
}

/// SHA-256 hex digest under which a key is stored
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

pub fn is_well_formed_key(key: &str) -> bool {
    KEY_FORMAT.is_match(key)
}

pub struct ConfirmationManager<R: ConfirmationRepository> {
    repo: Arc<R>,
}

impl<R: ConfirmationRepository> ConfirmationManager<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Issue a new key for `object_id`. `validity_minutes = None` never expires.
    pub async fn issue(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
        realm_id: RealmId,
        validity_minutes: Option<i64>,
    ) -> Result<IssuedConfirmation> {
        let now = Utc::now();

        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = generate_key();
            let key_hash = hash_key(&key);
            if self.repo.key_hash_exists(&key_hash).await? {
                tracing::warn!("Confirmation key collision, regenerating");
                continue;
            }

            let confirmation = Confirmation {
                id: ConfirmationId::new_v4(),
                key_hash,
                kind,
                object_id,
                realm_id,
                status: ConfirmationStatus::Pending,
                created_at: now,
                expires_at: validity_minutes.map(|minutes| now + Duration::minutes(minutes)),
            };
            self.repo.create(&confirmation).await?;

            tracing::debug!(
                confirmation_id = %confirmation.id,
                %kind,
                %object_id,
                "Issued confirmation"
            );
            return Ok(IssuedConfirmation { confirmation, key });
        }

        Err(anyhow::anyhow!("Could not generate a unique confirmation key").into())
    }

    /// Look up a key and check that it may still be used.
    ///
    /// With `mark_used`, single-use kinds are consumed by one conditional
    /// update in storage; whoever loses a race sees `Expired`. Multi-use keys
    /// are never consumed.
    pub async fn resolve(
        &self,
        key: &str,
        accepted_kinds: &[ConfirmationKind],
        mark_used: bool,
    ) -> Result<Confirmation> {
        let result = self
            .resolve_at(key, accepted_kinds, mark_used, Utc::now())
            .await;
        match &result {
            Ok(_) => metrics::record_confirmation("ok"),
            Err(AppError::Confirmation(err)) => metrics::record_confirmation(result_label(*err)),
            Err(_) => {}
        }
        result
    }

    async fn resolve_at(
        &self,
        key: &str,
        accepted_kinds: &[ConfirmationKind],
        mark_used: bool,
        now: DateTime<Utc>,
    ) -> Result<Confirmation> {
        if !is_well_formed_key(key) {
            return Err(ConfirmationError::Malformed.into());
        }

        let mut confirmation = self
            .repo
            .find_by_key_hash(&hash_key(key))
            .await?
            .ok_or(ConfirmationError::NotFound)?;

        if !accepted_kinds.contains(&confirmation.kind) {
            tracing::debug!(kind = %confirmation.kind, "Confirmation key of unexpected kind");
            return Err(ConfirmationError::WrongKind.external().into());
        }

        if !confirmation.is_open_at(now) {
            return Err(ConfirmationError::Expired.into());
        }

        if mark_used && !confirmation.kind.is_multi_use() {
            if !self.repo.mark_used_if_pending(confirmation.id, now).await? {
                return Err(ConfirmationError::Expired.into());
            }
            confirmation.status = ConfirmationStatus::Used;
        }

        Ok(confirmation)
    }

    /// Revoke every pending key of a target. Returns how many were revoked.
    pub async fn revoke(&self, kind: ConfirmationKind, object_id: ObjectId) -> Result<u64> {
        let revoked = self.repo.revoke_pending_for_object(kind, object_id).await?;
        if revoked > 0 {
            tracing::info!(%kind, %object_id, revoked, "Revoked confirmations");
            return Ok(revoked);
        }

        let existing = self.repo.list_for_object(kind, object_id).await?;
        if existing.is_empty() {
            Err(ConfirmationError::NotFound.into())
        } else if existing
            .iter()
            .any(|c| c.status == ConfirmationStatus::Revoked)
        {
            Err(ConfirmationError::AlreadyRevoked.into())
        } else {
            Err(ConfirmationError::Expired.into())
        }
    }

    /// Most recent confirmation for a target
    pub async fn latest_for(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<Option<Confirmation>> {
        Ok(self.repo.list_for_object(kind, object_id).await?.pop())
    }

    pub async fn all_for(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<Vec<Confirmation>> {
        self.repo.list_for_object(kind, object_id).await
    }

    /// Pending, unexpired confirmations of `kind` in a realm
    pub async fn list_open(
        &self,
        realm_id: RealmId,
        kind: ConfirmationKind,
    ) -> Result<Vec<Confirmation>> {
        self.repo.list_open_in_realm(realm_id, kind, Utc::now()).await
    }
}

fn result_label(error: ConfirmationError) -> &'static str {
    match error {
        ConfirmationError::Malformed => "malformed",
        ConfirmationError::NotFound | ConfirmationError::WrongKind => "not_found",
        ConfirmationError::Expired => "expired",
        ConfirmationError::AlreadyRevoked => "revoked",
    }
}
