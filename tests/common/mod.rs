//! Shared test infrastructure
//!
//! In-memory repositories and a capturing mail transport so services and
//! HTTP handlers can be exercised without MySQL or SMTP.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use rollcall_core::config::{
    Config, DatabaseConfig, EmailConfig, InvitationConfig, JwtConfig, TelemetryConfig,
};
use rollcall_core::domain::{
    Confirmation, ConfirmationId, ConfirmationKind, ConfirmationStatus, EmailMessage,
    EmailSendResult, InviteAs, InviteId, InvitePolicy, MultiuseInvite, MultiuseInviteId,
    NewPendingInvite, NewRegistration, NewScheduledEmail, ObjectId, PendingInvite, Realm,
    RealmId, Role, ScheduledEmail, ScheduledEmailId, Stream, StreamId, UserAccount, UserId,
};
use rollcall_core::email::{EmailProvider, EmailProviderError};
use rollcall_core::error::{AppError, Result};
use rollcall_core::jwt::JwtManager;
use rollcall_core::repository::{
    ConfirmationRepository, InvitationRepository, RealmRepository, ScheduledEmailRepository,
    UserRepository,
};
use rollcall_core::server::build_router;
use rollcall_core::service::{
    ConfirmationManager, EmailService, InvitationService, LicenseSeatChecker,
    RegistrationService, SeatChecker, UnlimitedSeats,
};
use rollcall_core::state::HasServices;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tower::ServiceExt;

pub const BASE_URL: &str = "https://chat.example.com";
pub const SUBDOMAIN: &str = "elsinore";

lazy_static::lazy_static! {
    static ref CONFIRM_LINK: regex::Regex =
        regex::Regex::new(r"/accounts/do_confirm/([a-z0-9]{24})").unwrap();
    static ref JOIN_LINK: regex::Regex = regex::Regex::new(r"/join/([a-z0-9]{24})/").unwrap();
}

// ============================================================================
// Test Configuration
// ============================================================================

pub fn test_config() -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        app_base_url: BASE_URL.to_string(),
        database: DatabaseConfig {
            url: "mysql://root@localhost:3306/rollcall_test".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "test-secret-key-for-rollcall-tests".to_string(),
            issuer: "https://rollcall.test".to_string(),
            access_token_ttl_secs: 3600,
        },
        email: EmailConfig {
            noreply_address: "noreply@chat.example.com".to_string(),
            noreply_name: Some("Rollcall".to_string()),
            smtp: None,
            reminder_poll_interval_secs: 60,
        },
        invitations: InvitationConfig::default(),
        telemetry: TelemetryConfig::default(),
    }
}

/// Key embedded in a `/accounts/do_confirm/<key>` link
pub fn confirmation_key_in(text: &str) -> Option<String> {
    CONFIRM_LINK.captures(text).map(|c| c[1].to_string())
}

/// Key embedded in a `/join/<key>/` link
pub fn join_key_in(link: &str) -> Option<String> {
    JOIN_LINK.captures(link).map(|c| c[1].to_string())
}

// ============================================================================
// Test Repositories
// ============================================================================

#[derive(Default)]
pub struct TestRealmRepository {
    realms: RwLock<Vec<Realm>>,
    streams: RwLock<Vec<Stream>>,
    sent: RwLock<Vec<InviteCount>>,
    next_count_id: AtomicU64,
}

struct InviteCount {
    id: u64,
    realm_id: RealmId,
    count: u32,
    at: DateTime<Utc>,
}

impl TestRealmRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_realm(&self, realm: Realm) {
        self.realms.write().await.push(realm);
    }

    pub async fn update_realm(&self, realm: Realm) {
        let mut realms = self.realms.write().await;
        if let Some(existing) = realms.iter_mut().find(|r| r.id == realm.id) {
            *existing = realm;
        }
    }

    pub async fn add_stream(&self, stream: Stream) {
        self.streams.write().await.push(stream);
    }

    pub async fn total_recorded(&self, realm_id: RealmId) -> u64 {
        self.sent
            .read()
            .await
            .iter()
            .filter(|row| row.realm_id == realm_id)
            .map(|row| row.count as u64)
            .sum()
    }
}

#[async_trait]
impl RealmRepository for TestRealmRepository {
    async fn find_by_id(&self, id: RealmId) -> Result<Option<Realm>> {
        Ok(self.realms.read().await.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Realm>> {
        Ok(self
            .realms
            .read()
            .await
            .iter()
            .find(|r| r.subdomain == subdomain)
            .cloned())
    }

    async fn find_streams(&self, realm_id: RealmId, ids: &[StreamId]) -> Result<Vec<Stream>> {
        Ok(self
            .streams
            .read()
            .await
            .iter()
            .filter(|s| s.realm_id == realm_id && ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn reserve_invites(
        &self,
        realm_id: RealmId,
        count: u32,
        limit: Option<u64>,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let mut sent = self.sent.write().await;
        if let Some(limit) = limit {
            let already: u64 = sent
                .iter()
                .filter(|row| row.realm_id == realm_id && row.at >= since)
                .map(|row| row.count as u64)
                .sum();
            if already + count as u64 > limit {
                return Ok(None);
            }
        }
        let id = self.next_count_id.fetch_add(1, Ordering::SeqCst);
        sent.push(InviteCount {
            id,
            realm_id,
            count,
            at,
        });
        Ok(Some(id))
    }

    async fn settle_invites(&self, reservation: u64, sent: u32) -> Result<()> {
        let mut rows = self.sent.write().await;
        if sent == 0 {
            rows.retain(|row| row.id != reservation);
        } else if let Some(row) = rows.iter_mut().find(|row| row.id == reservation) {
            row.count = sent;
        }
        Ok(())
    }

    async fn count_invites_sent_since(
        &self,
        realm_id: RealmId,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self
            .sent
            .read()
            .await
            .iter()
            .filter(|row| row.realm_id == realm_id && row.at >= since)
            .map(|row| row.count as u64)
            .sum())
    }

    async fn count_new_realm_invites_since(
        &self,
        since: DateTime<Utc>,
        created_after: DateTime<Utc>,
    ) -> Result<u64> {
        let realms = self.realms.read().await;
        Ok(self
            .sent
            .read()
            .await
            .iter()
            .filter(|row| {
                row.at >= since
                    && realms.iter().any(|r| {
                        r.id == row.realm_id
                            && r.created_at > created_after
                            && r.max_invites.is_none()
                    })
            })
            .map(|row| row.count as u64)
            .sum())
    }
}

/// Users plus the other stores a registration writes to, so a registration
/// commits or fails as one unit
pub struct TestUserRepository {
    users: RwLock<Vec<UserAccount>>,
    subscriptions: RwLock<Vec<(UserId, StreamId)>>,
    confirmations: Arc<TestConfirmationRepository>,
    invitations: Arc<TestInvitationRepository>,
    scheduled: Arc<TestScheduledEmailRepository>,
    failing: AtomicBool,
}

impl TestUserRepository {
    pub fn new(
        confirmations: Arc<TestConfirmationRepository>,
        invitations: Arc<TestInvitationRepository>,
        scheduled: Arc<TestScheduledEmailRepository>,
    ) -> Self {
        Self {
            users: RwLock::new(Vec::new()),
            subscriptions: RwLock::new(Vec::new()),
            confirmations,
            invitations,
            scheduled,
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following account write fail
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn add_user(&self, user: UserAccount) {
        self.users.write().await.push(user);
    }

    pub async fn all(&self) -> Vec<UserAccount> {
        self.users.read().await.clone()
    }

    pub async fn subscriptions_of(&self, user_id: UserId) -> Vec<StreamId> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, stream)| *stream)
            .collect()
    }

}

#[async_trait]
impl UserRepository for TestUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserAccount>> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, realm_id: RealmId, email: &str) -> Result<Option<UserAccount>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.realm_id == realm_id && u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn register(&self, registration: &NewRegistration) -> Result<Option<UserAccount>> {
        // Held throughout so the key is claimed once
        let mut confirmations = self.confirmations.rows.write().await;
        let open = confirmations
            .iter()
            .any(|c| c.id == registration.confirmation_id && c.is_open_at(registration.at));
        if !open {
            return Ok(None);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("users table unavailable")));
        }

        let user = {
            let mut users = self.users.write().await;
            match registration.mirror_dummy {
                Some(id) => {
                    let user = users.iter_mut().find(|u| u.id == id).ok_or_else(|| {
                        AppError::NotFound("User not found".to_string())
                    })?;
                    user.full_name = registration.full_name.clone();
                    user.role = registration.role;
                    user.is_active = true;
                    user.is_mirror_dummy = false;
                    user.date_joined = registration.at;
                    user.clone()
                }
                None => {
                    if users.iter().any(|u| {
                        u.realm_id == registration.realm_id
                            && u.email.eq_ignore_ascii_case(&registration.email)
                    }) {
                        return Err(AppError::AlreadyRegistered(registration.email.clone()));
                    }
                    let user = UserAccount {
                        id: UserId::new_v4(),
                        realm_id: registration.realm_id,
                        email: registration.email.clone(),
                        full_name: registration.full_name.clone(),
                        role: registration.role,
                        is_active: true,
                        is_mirror_dummy: false,
                        date_joined: registration.at,
                    };
                    users.push(user.clone());
                    user
                }
            }
        };

        {
            let mut subscriptions = self.subscriptions.write().await;
            for stream_id in &registration.stream_ids {
                if !subscriptions.contains(&(user.id, *stream_id)) {
                    subscriptions.push((user.id, *stream_id));
                }
            }
        }

        let siblings: HashSet<ObjectId> = {
            let mut pending = self.invitations.pending.write().await;
            for invite in pending.iter_mut() {
                if invite.id == registration.invite_id {
                    invite.created_user_id = Some(user.id);
                }
            }
            pending
                .iter()
                .filter(|p| {
                    p.id != registration.invite_id
                        && p.realm_id == registration.realm_id
                        && p.email.eq_ignore_ascii_case(&registration.email)
                })
                .map(|p| ObjectId::from(p.id))
                .collect()
        };

        for row in confirmations.iter_mut() {
            if row.id == registration.confirmation_id {
                row.status = ConfirmationStatus::Used;
            } else if siblings.contains(&row.object_id)
                && matches!(
                    row.kind,
                    ConfirmationKind::Invitation | ConfirmationKind::UserRegistration
                )
                && row.status == ConfirmationStatus::Pending
            {
                row.status = ConfirmationStatus::Revoked;
            }
        }

        self.scheduled.jobs.write().await.retain(|job| {
            !(job.realm_id == registration.realm_id
                && job.address.eq_ignore_ascii_case(&registration.email))
        });

        Ok(Some(user))
    }

    async fn count_billable(&self, realm_id: RealmId) -> Result<u64> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| {
                u.realm_id == realm_id && u.is_active && !u.is_mirror_dummy && !u.role.is_guest()
            })
            .count() as u64)
    }
}

#[derive(Default)]
pub struct TestInvitationRepository {
    pending: RwLock<Vec<PendingInvite>>,
    multiuse: RwLock<Vec<MultiuseInvite>>,
    /// Pending invites created before writes start failing
    fail_after: Mutex<Option<usize>>,
    created: AtomicUsize,
}

impl TestInvitationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `count` more pending invites be created, then fail every write
    pub fn fail_after(&self, count: usize) {
        if let Ok(mut fail_after) = self.fail_after.lock() {
            *fail_after = Some(self.created.load(Ordering::SeqCst) + count);
        }
    }

    pub async fn all_pending(&self) -> Vec<PendingInvite> {
        self.pending.read().await.clone()
    }

    pub async fn pending_for(&self, email: &str) -> Vec<PendingInvite> {
        self.pending
            .read()
            .await
            .iter()
            .filter(|p| p.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl InvitationRepository for TestInvitationRepository {
    async fn create_pending(&self, input: &NewPendingInvite) -> Result<PendingInvite> {
        let limit = self.fail_after.lock().ok().and_then(|limit| *limit);
        if limit.is_some_and(|limit| self.created.load(Ordering::SeqCst) >= limit) {
            return Err(AppError::Internal(anyhow::anyhow!("pending_invites unavailable")));
        }
        self.created.fetch_add(1, Ordering::SeqCst);

        let invite = PendingInvite {
            id: InviteId::new_v4(),
            realm_id: input.realm_id,
            email: input.email.clone(),
            referred_by: input.referred_by,
            invited_as: input.invited_as,
            stream_ids: input.stream_ids.clone(),
            multiuse_invite_id: input.multiuse_invite_id,
            invite_expires_in_minutes: input.invite_expires_in_minutes,
            created_user_id: None,
            created_at: Utc::now(),
        };
        self.pending.write().await.push(invite.clone());
        Ok(invite)
    }

    async fn find_pending(&self, id: InviteId) -> Result<Option<PendingInvite>> {
        Ok(self.pending.read().await.iter().find(|p| p.id == id).cloned())
    }

    async fn list_email_invites(
        &self,
        realm_id: RealmId,
        referred_by: Option<UserId>,
    ) -> Result<Vec<PendingInvite>> {
        Ok(self
            .pending
            .read()
            .await
            .iter()
            .filter(|p| p.realm_id == realm_id && p.is_email_invitation())
            .filter(|p| referred_by.is_none() || p.referred_by == referred_by)
            .cloned()
            .collect())
    }

    async fn create_multiuse(
        &self,
        realm_id: RealmId,
        referred_by: UserId,
        invited_as: InviteAs,
        stream_ids: &[StreamId],
    ) -> Result<MultiuseInvite> {
        let link = MultiuseInvite {
            id: MultiuseInviteId::new_v4(),
            realm_id,
            referred_by,
            invited_as,
            stream_ids: stream_ids.to_vec(),
            created_at: Utc::now(),
        };
        self.multiuse.write().await.push(link.clone());
        Ok(link)
    }

    async fn find_multiuse(&self, id: MultiuseInviteId) -> Result<Option<MultiuseInvite>> {
        Ok(self.multiuse.read().await.iter().find(|m| m.id == id).cloned())
    }

    async fn list_multiuse(
        &self,
        realm_id: RealmId,
        referred_by: Option<UserId>,
    ) -> Result<Vec<MultiuseInvite>> {
        Ok(self
            .multiuse
            .read()
            .await
            .iter()
            .filter(|m| m.realm_id == realm_id)
            .filter(|m| referred_by.map_or(true, |id| m.referred_by == id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct TestConfirmationRepository {
    rows: RwLock<Vec<Confirmation>>,
}

impl TestConfirmationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Confirmation> {
        self.rows.read().await.clone()
    }

    /// Move every expiry of a target into the past
    pub async fn expire_object(&self, object_id: ObjectId) {
        let past = Utc::now() - Duration::minutes(1);
        for row in self.rows.write().await.iter_mut() {
            if row.object_id == object_id {
                row.expires_at = Some(past);
            }
        }
    }
}

#[async_trait]
impl ConfirmationRepository for TestConfirmationRepository {
    async fn create(&self, confirmation: &Confirmation) -> Result<()> {
        self.rows.write().await.push(confirmation.clone());
        Ok(())
    }

    async fn key_hash_exists(&self, key_hash: &str) -> Result<bool> {
        Ok(self.rows.read().await.iter().any(|c| c.key_hash == key_hash))
    }

    async fn find_by_key_hash(&self, key_hash: &str) -> Result<Option<Confirmation>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|c| c.key_hash == key_hash)
            .cloned())
    }

    async fn list_for_object(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<Vec<Confirmation>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|c| c.kind == kind && c.object_id == object_id)
            .cloned()
            .collect())
    }

    async fn list_open_in_realm(
        &self,
        realm_id: RealmId,
        kind: ConfirmationKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Confirmation>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|c| c.realm_id == realm_id && c.kind == kind && c.is_open_at(now))
            .cloned()
            .collect())
    }

    async fn mark_used_if_pending(&self, id: ConfirmationId, now: DateTime<Utc>) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|c| c.id == id) {
            Some(row) if row.is_open_at(now) => {
                row.status = ConfirmationStatus::Used;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_pending_for_object(
        &self,
        kind: ConfirmationKind,
        object_id: ObjectId,
    ) -> Result<u64> {
        let mut revoked = 0;
        for row in self.rows.write().await.iter_mut() {
            if row.kind == kind
                && row.object_id == object_id
                && row.status == ConfirmationStatus::Pending
            {
                row.status = ConfirmationStatus::Revoked;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[derive(Default)]
pub struct TestScheduledEmailRepository {
    jobs: RwLock<Vec<ScheduledEmail>>,
}

impl TestScheduledEmailRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ScheduledEmail> {
        self.jobs.read().await.clone()
    }

    pub async fn push(&self, job: ScheduledEmail) {
        self.jobs.write().await.push(job);
    }

    pub async fn for_address(&self, address: &str) -> Vec<ScheduledEmail> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|job| job.address.eq_ignore_ascii_case(address))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ScheduledEmailRepository for TestScheduledEmailRepository {
    async fn create(&self, input: &NewScheduledEmail) -> Result<ScheduledEmail> {
        let job = ScheduledEmail {
            id: ScheduledEmailId::new_v4(),
            realm_id: input.realm_id,
            confirmation_id: input.confirmation_id,
            address: input.address.clone(),
            kind: input.kind,
            scheduled_at: input.scheduled_at,
            subject: input.subject.clone(),
            html_body: input.html_body.clone(),
            text_body: input.text_body.clone(),
            attempts: 0,
        };
        self.jobs.write().await.push(job.clone());
        Ok(job)
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<ScheduledEmail>> {
        let mut due: Vec<ScheduledEmail> = self
            .jobs
            .read()
            .await
            .iter()
            .filter(|job| job.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|job| job.scheduled_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn list_for_confirmation(&self, id: ConfirmationId) -> Result<Vec<ScheduledEmail>> {
        Ok(self
            .jobs
            .read()
            .await
            .iter()
            .filter(|job| job.confirmation_id == Some(id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: ScheduledEmailId) -> Result<()> {
        self.jobs.write().await.retain(|job| job.id != id);
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: ScheduledEmailId,
        retry_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(job) = self.jobs.write().await.iter_mut().find(|job| job.id == id) {
            job.attempts += 1;
            job.scheduled_at = retry_at;
        }
        Ok(())
    }

    async fn delete_for_confirmations(&self, ids: &[ConfirmationId]) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|job| !job.confirmation_id.is_some_and(|id| ids.contains(&id)));
        Ok((before - jobs.len()) as u64)
    }

}

// ============================================================================
// Mail Transport
// ============================================================================

/// Records every message instead of sending it
#[derive(Default)]
pub struct CapturingEmailProvider {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
    rejected: Mutex<HashSet<String>>,
}

impl CapturingEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail
    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every following send to `address` fail
    pub fn reject(&self, address: &str) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.insert(address.to_ascii_lowercase());
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to.iter().any(|to| to.email.eq_ignore_ascii_case(address)))
            .collect()
    }

    /// Confirmation key from the most recent email to `address`
    pub fn last_key_for(&self, address: &str) -> Option<String> {
        self.sent_to(address).last().and_then(|message| {
            let text = message.text_body.as_deref().unwrap_or(&message.html_body);
            confirmation_key_in(text)
        })
    }
}

#[async_trait]
impl EmailProvider for CapturingEmailProvider {
    async fn send(&self, message: &EmailMessage) -> std::result::Result<EmailSendResult, EmailProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmailProviderError::SendFailed("relay unavailable".to_string()));
        }
        let rejected = self.rejected.lock().is_ok_and(|rejected| {
            message
                .to
                .iter()
                .any(|to| rejected.contains(&to.email.to_ascii_lowercase()))
        });
        if rejected {
            return Err(EmailProviderError::SendFailed("mailbox unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(EmailSendResult::success(Some(format!(
            "<{}@test>",
            uuid::Uuid::new_v4()
        ))))
    }

    fn provider_name(&self) -> &'static str {
        "capture"
    }
}

// ============================================================================
// Test State
// ============================================================================

pub type TestInvitationService = InvitationService<
    TestRealmRepository,
    TestUserRepository,
    TestInvitationRepository,
    TestConfirmationRepository,
    TestScheduledEmailRepository,
>;

pub type TestRegistrationService = RegistrationService<
    TestRealmRepository,
    TestUserRepository,
    TestInvitationRepository,
    TestConfirmationRepository,
    TestScheduledEmailRepository,
>;

#[derive(Clone)]
pub struct TestAppState {
    pub config: Arc<Config>,
    pub jwt_manager: JwtManager,
    pub user_repo: Arc<TestUserRepository>,
    pub invitation_service: Arc<TestInvitationService>,
    pub registration_service: Arc<TestRegistrationService>,
}

impl HasServices for TestAppState {
    type RealmRepo = TestRealmRepository;
    type UserRepo = TestUserRepository;
    type InvitationRepo = TestInvitationRepository;
    type ConfirmationRepo = TestConfirmationRepository;
    type ScheduledEmailRepo = TestScheduledEmailRepository;

    fn config(&self) -> &Config {
        &self.config
    }

    fn jwt_manager(&self) -> &JwtManager {
        &self.jwt_manager
    }

    fn user_repo(&self) -> &TestUserRepository {
        &self.user_repo
    }

    fn invitation_service(&self) -> &TestInvitationService {
        &self.invitation_service
    }

    fn registration_service(&self) -> &TestRegistrationService {
        &self.registration_service
    }

    async fn check_ready(&self) -> bool {
        true
    }
}

/// A realm with one stream, an owner and an established member, wired to
/// in-memory storage.
pub struct TestHarness {
    pub config: Config,
    pub realms: Arc<TestRealmRepository>,
    pub users: Arc<TestUserRepository>,
    pub invitations: Arc<TestInvitationRepository>,
    pub confirmations: Arc<TestConfirmationRepository>,
    pub scheduled: Arc<TestScheduledEmailRepository>,
    pub mailer: Arc<CapturingEmailProvider>,
    pub manager: Arc<ConfirmationManager<TestConfirmationRepository>>,
    pub email_service: Arc<EmailService<TestScheduledEmailRepository>>,
    pub state: TestAppState,
    pub realm: Realm,
    pub stream: Stream,
    pub owner: UserAccount,
    pub member: UserAccount,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_invitations(invitations: InvitationConfig) -> Self {
        let mut config = test_config();
        config.invitations = invitations;
        Self::with_config(config).await
    }

    pub async fn with_config(config: Config) -> Self {
        let realms = Arc::new(TestRealmRepository::new());
        let invitations = Arc::new(TestInvitationRepository::new());
        let confirmations = Arc::new(TestConfirmationRepository::new());
        let scheduled = Arc::new(TestScheduledEmailRepository::new());
        let users = Arc::new(TestUserRepository::new(
            confirmations.clone(),
            invitations.clone(),
            scheduled.clone(),
        ));
        let mailer = Arc::new(CapturingEmailProvider::new());

        let realm = Realm {
            name: "Elsinore".to_string(),
            subdomain: SUBDOMAIN.to_string(),
            invite_to_realm_policy: InvitePolicy::MembersOnly,
            created_at: Utc::now() - Duration::days(365),
            ..Default::default()
        };
        realms.add_realm(realm.clone()).await;

        let stream = Stream {
            id: StreamId::new_v4(),
            realm_id: realm.id,
            name: "general".to_string(),
            invite_only: false,
        };
        realms.add_stream(stream.clone()).await;

        let owner = established_user(&realm, "iago@elsinore.example", "Iago", Role::Owner);
        let member = established_user(&realm, "hamlet@elsinore.example", "King Hamlet", Role::Member);
        users.add_user(owner.clone()).await;
        users.add_user(member.clone()).await;

        let manager = Arc::new(ConfirmationManager::new(confirmations.clone()));
        let provider: Arc<dyn EmailProvider> = mailer.clone();
        let email_service = Arc::new(EmailService::new(provider, scheduled.clone()));
        let seats: Arc<dyn SeatChecker> = match config.invitations.license_limit {
            Some(licenses) => Arc::new(LicenseSeatChecker::new(users.clone(), licenses)),
            None => Arc::new(UnlimitedSeats),
        };

        let invitation_service = Arc::new(InvitationService::new(
            realms.clone(),
            users.clone(),
            invitations.clone(),
            manager.clone(),
            email_service.clone(),
            seats.clone(),
            config.invitations.clone(),
            config.app_base_url.clone(),
        ));
        let registration_service = Arc::new(RegistrationService::new(
            realms.clone(),
            users.clone(),
            invitations.clone(),
            manager.clone(),
            email_service.clone(),
            seats,
            config.invitations.clone(),
            config.app_base_url.clone(),
        ));

        let state = TestAppState {
            config: Arc::new(config.clone()),
            jwt_manager: JwtManager::new(config.jwt.clone()),
            user_repo: users.clone(),
            invitation_service,
            registration_service,
        };

        Self {
            config,
            realms,
            users,
            invitations,
            confirmations,
            scheduled,
            mailer,
            manager,
            email_service,
            state,
            realm,
            stream,
            owner,
            member,
        }
    }

    pub fn invitation_service(&self) -> &TestInvitationService {
        &self.state.invitation_service
    }

    pub fn registration_service(&self) -> &TestRegistrationService {
        &self.state.registration_service
    }

    /// Add an account that joined long enough ago to invite others
    pub async fn add_user(&self, email: &str, role: Role) -> UserAccount {
        let user = established_user(&self.realm, email, email, role);
        self.users.add_user(user.clone()).await;
        user
    }

    pub async fn update_realm(&mut self, update: impl FnOnce(&mut Realm)) {
        update(&mut self.realm);
        self.realms.update_realm(self.realm.clone()).await;
    }

    pub fn token_for(&self, user: &UserAccount) -> String {
        self.state
            .jwt_manager
            .create_access_token(user.id)
            .expect("token")
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), None)
    }
}

pub fn established_user(realm: &Realm, email: &str, full_name: &str, role: Role) -> UserAccount {
    UserAccount {
        id: UserId::new_v4(),
        realm_id: realm.id,
        email: email.to_string(),
        full_name: full_name.to_string(),
        role,
        is_active: true,
        is_mirror_dummy: false,
        date_joined: Utc::now() - Duration::days(100),
    }
}

// ============================================================================
// HTTP Helpers
// ============================================================================

pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn get_json(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    send_json(app, Method::GET, uri, token, None).await
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_json(app, Method::POST, uri, token, Some(body)).await
}

pub async fn delete_json(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    send_json(app, Method::DELETE, uri, token, None).await
}
