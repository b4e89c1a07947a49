//! Email invitations and multi-use invite links

use crate::config::InvitationConfig;
use crate::domain::{
    ConfirmationKind, CreateMultiuseInput, InviteAs, InviteId, InviteListItem, InviteUsersInput,
    InviteUsersResponse, MultiuseInviteId, MultiuseLinkResponse, NewPendingInvite, ObjectId,
    PendingInvite, Realm, RealmId, ScheduledEmailKind, StreamId, UserAccount,
    resolve_link_validity,
};
use crate::email::{EmailTemplate, TemplateEngine};
use crate::error::{AppError, ConfirmationError, InvitationError, InviteeError, Result};
use crate::invitee::parse_invitee_emails;
use crate::policy::{self, email::check_address_for_realm, limits::InviteLimiter};
use crate::repository::{
    ConfirmationRepository, InvitationRepository, RealmRepository, ScheduledEmailRepository,
    UserRepository,
};
use crate::service::confirmation::ConfirmationManager;
use crate::service::email::EmailService;
use crate::service::seats::{check_invite_seats, SeatChecker};
use crate::telemetry::metrics;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

const NO_SUCH_INVITATION: &str = "No such invitation";

/// Reminders go out this long after the invitation
const REMINDER_DELAY_DAYS: i64 = 2;

/// Links living shorter than this get no reminder
const REMINDER_MIN_VALIDITY_DAYS: i64 = 4;

/// Whether an invitation valid for `validity_minutes` gets a reminder email
pub fn reminder_due(validity_minutes: Option<i64>) -> bool {
    match validity_minutes {
        None => true,
        Some(minutes) => minutes >= REMINDER_MIN_VALIDITY_DAYS * 24 * 60,
    }
}

/// Human-readable validity for the invitation email
pub fn describe_validity(validity_minutes: Option<i64>) -> String {
    let Some(minutes) = validity_minutes else {
        return "This invitation does not expire.".to_string();
    };
    let (amount, unit) = if minutes % (24 * 60) == 0 {
        (minutes / (24 * 60), "day")
    } else if minutes % 60 == 0 {
        (minutes / 60, "hour")
    } else {
        (minutes, "minute")
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("This invitation expires in {} {}{}.", amount, unit, plural)
}

pub struct InvitationService<R, U, I, C, S>
where
    R: RealmRepository,
    U: UserRepository,
    I: InvitationRepository,
    C: ConfirmationRepository,
    S: ScheduledEmailRepository,
{
    realm_repo: Arc<R>,
    user_repo: Arc<U>,
    invitation_repo: Arc<I>,
    confirmations: Arc<ConfirmationManager<C>>,
    email_service: Arc<EmailService<S>>,
    seats: Arc<dyn SeatChecker>,
    limiter: InviteLimiter<R>,
    settings: InvitationConfig,
    /// Base URL for links in emails (e.g., "https://chat.example.com")
    app_base_url: String,
}

impl<R, U, I, C, S> InvitationService<R, U, I, C, S>
where
    R: RealmRepository,
    U: UserRepository,
    I: InvitationRepository,
    C: ConfirmationRepository,
    S: ScheduledEmailRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        realm_repo: Arc<R>,
        user_repo: Arc<U>,
        invitation_repo: Arc<I>,
        confirmations: Arc<ConfirmationManager<C>>,
        email_service: Arc<EmailService<S>>,
        seats: Arc<dyn SeatChecker>,
        settings: InvitationConfig,
        app_base_url: String,
    ) -> Self {
        Self {
            limiter: InviteLimiter::new(realm_repo.clone(), settings.clone()),
            realm_repo,
            user_repo,
            invitation_repo,
            confirmations,
            email_service,
            seats,
            settings,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Invite a batch of addresses to the actor's realm.
    ///
    /// Validation failures abort the whole batch. Addresses that already
    /// have accounts are skipped and reported as a partial failure, as are
    /// the addresses left over when a storage failure stops the batch after
    /// some invitations went out.
    pub async fn invite(
        &self,
        actor: &UserAccount,
        input: InviteUsersInput,
    ) -> Result<InviteUsersResponse> {
        input.validate()?;
        let now = Utc::now();
        let realm = self.realm_of(actor).await?;

        policy::require_invite_to_realm(&realm, actor, now)?;
        let invite_as = InviteAs::try_from(input.invite_as).map_err(AppError::BadRequest)?;
        policy::require_invite_as_authority(actor.role, invite_as)?;
        policy::require_account_age(actor, self.settings.min_user_age_days, now)?;

        let validity = resolve_link_validity(
            input.invite_expires_in_minutes,
            self.settings.invitation_link_validity_minutes,
        )
        .map_err(AppError::BadRequest)?;

        let emails = parse_invitee_emails(&input.invitee_emails);
        if emails.is_empty() {
            return Err(
                InvitationError::new("You must specify at least one email address.").into(),
            );
        }

        if input.stream_ids.is_empty() {
            return Err(InvitationError::new(
                "You must specify at least one stream for invitees to join.",
            )
            .into());
        }
        if let Some(missing) = self.first_missing_stream(&realm, &input.stream_ids).await? {
            return Err(InvitationError::new(format!(
                "Stream does not exist with id: {}. No invites were sent.",
                missing
            ))
            .into());
        }

        self.limiter.check(&realm, emails.len(), now).await?;

        let invalid: Vec<InviteeError> = emails
            .iter()
            .filter_map(|email| {
                check_address_for_realm(&realm, email, &self.settings.disposable_email_domains)
                    .err()
                    .map(|rejection| InviteeError {
                        email: email.clone(),
                        reason: rejection.invite_reason().to_string(),
                        deactivated: false,
                    })
            })
            .collect();
        if !invalid.is_empty() {
            return Err(InvitationError::new(
                "Some emails did not validate, so we didn't send any invitations.",
            )
            .with_errors(invalid)
            .into());
        }

        let mut skipped = Vec::new();
        let mut invitees = Vec::new();
        for email in emails {
            match self.existing_account_error(&realm, &email).await? {
                Some(error) => skipped.push(error),
                None => invitees.push(email),
            }
        }
        if invitees.is_empty() {
            return Err(InvitationError::new("We weren't able to invite anyone.")
                .with_errors(skipped)
                .into());
        }

        if invite_as != InviteAs::GuestUser {
            check_invite_seats(self.seats.as_ref(), &realm, invitees.len()).await?;
        }

        let reservation = self.limiter.reserve(&realm, invitees.len(), now).await?;
        let mut sent = 0;
        let mut stopped = None;
        for email in &invitees {
            let outcome = self
                .invite_one(&realm, actor, email, invite_as, &input.stream_ids, validity, now)
                .await;
            match outcome {
                Ok(()) => sent += 1,
                Err(e) => {
                    stopped = Some(e);
                    break;
                }
            }
        }
        self.limiter.settle(reservation, sent).await?;

        if sent > 0 {
            metrics::record_invites_sent("email", sent as u64);
        }
        tracing::info!(
            realm_id = %realm.id,
            inviter = %actor.id,
            count = sent,
            skipped = skipped.len(),
            "Sent invitations"
        );

        if let Some(e) = stopped {
            tracing::error!(realm_id = %realm.id, sent, error = %e, "Invitation batch stopped early");
            if sent == 0 {
                return Err(e);
            }
            let unsent = invitees[sent..].iter().map(|email| InviteeError {
                email: email.clone(),
                reason: "Could not send an invitation.".to_string(),
                deactivated: false,
            });
            return Err(InvitationError {
                message: "Some invitations could not be sent. We did send invitations to \
                          everyone else!"
                    .to_string(),
                errors: skipped.into_iter().chain(unsent).collect(),
                sent_invitations: true,
                license_limit_reached: false,
            }
            .into());
        }

        if !skipped.is_empty() {
            return Err(InvitationError {
                message: "Some of those addresses are already using the service, so we \
                          didn't send them an invitation. We did send invitations to everyone else!"
                    .to_string(),
                errors: skipped,
                sent_invitations: true,
                license_limit_reached: false,
            }
            .into());
        }

        Ok(InviteUsersResponse { invited: invitees })
    }

    /// Create a reusable link; administrators only.
    pub async fn create_multiuse_link(
        &self,
        actor: &UserAccount,
        input: CreateMultiuseInput,
    ) -> Result<MultiuseLinkResponse> {
        let realm = self.realm_of(actor).await?;
        let invite_as = InviteAs::try_from(input.invite_as).map_err(AppError::BadRequest)?;
        policy::require_multiuse_authority(actor.role, invite_as)?;

        let validity = resolve_link_validity(
            input.invite_expires_in_minutes,
            self.settings.invitation_link_validity_minutes,
        )
        .map_err(AppError::BadRequest)?;

        if let Some(missing) = self.first_missing_stream(&realm, &input.stream_ids).await? {
            return Err(AppError::BadRequest(format!(
                "Invalid stream ID {}. No invites were sent.",
                missing
            )));
        }

        let link = self
            .invitation_repo
            .create_multiuse(realm.id, actor.id, invite_as, &input.stream_ids)
            .await?;
        let issued = self
            .confirmations
            .issue(
                ConfirmationKind::MultiuseInvite,
                link.id.into(),
                realm.id,
                validity,
            )
            .await?;

        metrics::record_invites_sent("multiuse", 1);
        tracing::info!(realm_id = %realm.id, link_id = %link.id, "Created multi-use invite link");

        Ok(MultiuseLinkResponse {
            invite_link: format!("{}/join/{}/", self.app_base_url, issued.key),
        })
    }

    /// Open invitations visible to the actor: all of them for administrators,
    /// otherwise the ones the actor sent.
    pub async fn list_open(&self, actor: &UserAccount) -> Result<Vec<InviteListItem>> {
        let referred_by = (!actor.role.is_realm_admin()).then_some(actor.id);

        let open_invites = self
            .open_expiries(actor.realm_id, ConfirmationKind::Invitation)
            .await?;
        let open_links = self
            .open_expiries(actor.realm_id, ConfirmationKind::MultiuseInvite)
            .await?;

        let mut items = Vec::new();

        for invite in self
            .invitation_repo
            .list_email_invites(actor.realm_id, referred_by)
            .await?
        {
            if let Some(expiry) = open_invites.get(&ObjectId::from(invite.id)) {
                items.push(InviteListItem {
                    id: invite.id.as_uuid(),
                    invited_by_user_id: invite.referred_by,
                    invited: invite.created_at.timestamp(),
                    expiry_date: expiry.map(|at| at.timestamp()),
                    invited_as: invite.invited_as,
                    email: Some(invite.email),
                    is_multiuse: false,
                });
            }
        }

        for link in self
            .invitation_repo
            .list_multiuse(actor.realm_id, referred_by)
            .await?
        {
            if let Some(expiry) = open_links.get(&ObjectId::from(link.id)) {
                items.push(InviteListItem {
                    id: link.id.as_uuid(),
                    invited_by_user_id: Some(link.referred_by),
                    invited: link.created_at.timestamp(),
                    expiry_date: expiry.map(|at| at.timestamp()),
                    invited_as: link.invited_as,
                    email: None,
                    is_multiuse: true,
                });
            }
        }

        Ok(items)
    }

    /// Revoke an emailed invitation and cancel its reminders
    pub async fn revoke_invite(&self, actor: &UserAccount, id: InviteId) -> Result<()> {
        let invite = self.email_invite_in_realm(actor, id).await?;
        policy::require_manage_invite(actor, invite.referred_by, invite.invited_as)?;

        let object_id = ObjectId::from(invite.id);
        match self
            .confirmations
            .revoke(ConfirmationKind::Invitation, object_id)
            .await
        {
            Ok(_) => {}
            Err(AppError::Confirmation(_)) => {
                return Err(AppError::NotFound(NO_SUCH_INVITATION.to_string()))
            }
            Err(e) => return Err(e),
        }

        let ids: Vec<_> = self
            .confirmations
            .all_for(ConfirmationKind::Invitation, object_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.email_service.cancel_for_confirmations(&ids).await?;

        tracing::info!(invite_id = %invite.id, actor = %actor.id, "Revoked invitation");
        Ok(())
    }

    /// Revoke a multi-use link
    pub async fn revoke_multiuse(&self, actor: &UserAccount, id: MultiuseInviteId) -> Result<()> {
        let link = self
            .invitation_repo
            .find_multiuse(id)
            .await?
            .filter(|link| link.realm_id == actor.realm_id)
            .ok_or_else(|| AppError::NotFound(NO_SUCH_INVITATION.to_string()))?;
        policy::require_multiuse_authority(actor.role, link.invited_as)?;

        match self
            .confirmations
            .revoke(ConfirmationKind::MultiuseInvite, link.id.into())
            .await
        {
            Ok(_) => {
                tracing::info!(link_id = %link.id, actor = %actor.id, "Revoked multi-use link");
                Ok(())
            }
            Err(AppError::Confirmation(ConfirmationError::AlreadyRevoked)) => Err(
                AppError::BadRequest("Invitation has already been revoked".to_string()),
            ),
            Err(AppError::Confirmation(_)) => {
                Err(AppError::NotFound(NO_SUCH_INVITATION.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Send an open invitation again with a fresh key.
    ///
    /// Earlier keys stay valid until their own expiry; only their reminders
    /// are replaced.
    pub async fn resend_invite(&self, actor: &UserAccount, id: InviteId) -> Result<()> {
        let invite = self.email_invite_in_realm(actor, id).await?;
        policy::require_manage_invite(actor, invite.referred_by, invite.invited_as)?;

        let now = Utc::now();
        let previous = self
            .confirmations
            .all_for(ConfirmationKind::Invitation, invite.id.into())
            .await?;
        if !previous.iter().any(|c| c.is_open_at(now)) {
            return Err(AppError::NotFound(NO_SUCH_INVITATION.to_string()));
        }

        let realm = self.realm_of(actor).await?;
        self.limiter.check(&realm, 1, now).await?;

        let inviter = match invite.referred_by {
            Some(referrer) if referrer != actor.id => self
                .user_repo
                .find_by_id(referrer)
                .await?
                .unwrap_or_else(|| actor.clone()),
            _ => actor.clone(),
        };

        let previous_ids: Vec<_> = previous.iter().map(|c| c.id).collect();
        let reservation = self.limiter.reserve(&realm, 1, now).await?;
        let outcome = match self
            .email_service
            .cancel_for_confirmations(&previous_ids)
            .await
        {
            Ok(_) => self.issue_and_send(&realm, &inviter, &invite, now).await,
            Err(e) => Err(e),
        };
        self.limiter
            .settle(reservation, usize::from(outcome.is_ok()))
            .await?;
        outcome?;

        metrics::record_invites_sent("resend", 1);
        tracing::info!(invite_id = %invite.id, actor = %actor.id, "Resent invitation");
        Ok(())
    }

    async fn realm_of(&self, actor: &UserAccount) -> Result<Realm> {
        self.realm_repo
            .find_by_id(actor.realm_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Realm {} not found", actor.realm_id)))
    }

    async fn email_invite_in_realm(
        &self,
        actor: &UserAccount,
        id: InviteId,
    ) -> Result<PendingInvite> {
        self.invitation_repo
            .find_pending(id)
            .await?
            .filter(|invite| invite.realm_id == actor.realm_id && invite.is_email_invitation())
            .ok_or_else(|| AppError::NotFound(NO_SUCH_INVITATION.to_string()))
    }

    async fn first_missing_stream(
        &self,
        realm: &Realm,
        stream_ids: &[StreamId],
    ) -> Result<Option<StreamId>> {
        let found = self.realm_repo.find_streams(realm.id, stream_ids).await?;
        Ok(stream_ids
            .iter()
            .find(|id| !found.iter().any(|stream| stream.id == **id))
            .copied())
    }

    /// Why an address cannot be invited because of an existing account
    async fn existing_account_error(
        &self,
        realm: &Realm,
        email: &str,
    ) -> Result<Option<InviteeError>> {
        let already = |deactivated: bool, reason: &str| InviteeError {
            email: email.to_string(),
            reason: reason.to_string(),
            deactivated,
        };

        if self
            .settings
            .cross_realm_bot_emails
            .iter()
            .any(|bot| bot.eq_ignore_ascii_case(email))
        {
            return Ok(Some(already(false, "Already has an account.")));
        }

        Ok(
            match self.user_repo.find_by_email(realm.id, email).await? {
                Some(user) if user.is_mirror_dummy => None,
                Some(user) if user.is_active => Some(already(false, "Already has an account.")),
                Some(_) => Some(already(true, "Account has been deactivated.")),
                None => None,
            },
        )
    }

    /// Pending, unexpired keys of `kind` by target, with the latest expiry of each
    async fn open_expiries(
        &self,
        realm_id: RealmId,
        kind: ConfirmationKind,
    ) -> Result<HashMap<ObjectId, Option<DateTime<Utc>>>> {
        let mut expiries: HashMap<ObjectId, Option<DateTime<Utc>>> = HashMap::new();
        for confirmation in self.confirmations.list_open(realm_id, kind).await? {
            expiries
                .entry(confirmation.object_id)
                .and_modify(|current| {
                    *current = match (*current, confirmation.expires_at) {
                        (Some(a), Some(b)) => Some(a.max(b)),
                        _ => None,
                    }
                })
                .or_insert(confirmation.expires_at);
        }
        Ok(expiries)
    }

    /// Record one pending invitation and send it
    #[allow(clippy::too_many_arguments)]
    async fn invite_one(
        &self,
        realm: &Realm,
        actor: &UserAccount,
        email: &str,
        invite_as: InviteAs,
        stream_ids: &[StreamId],
        validity: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let invite = self
            .invitation_repo
            .create_pending(&NewPendingInvite {
                realm_id: realm.id,
                email: email.to_string(),
                referred_by: Some(actor.id),
                invited_as: invite_as,
                stream_ids: stream_ids.to_vec(),
                multiuse_invite_id: None,
                invite_expires_in_minutes: validity,
            })
            .await?;
        self.issue_and_send(realm, actor, &invite, now).await
    }

    /// Issue a key for `invite`, email it and schedule a reminder.
    ///
    /// Only failing to issue the key is an error; once it exists the email
    /// and reminder are best effort.
    async fn issue_and_send(
        &self,
        realm: &Realm,
        inviter: &UserAccount,
        invite: &PendingInvite,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let validity = invite.invite_expires_in_minutes;
        let issued = self
            .confirmations
            .issue(
                ConfirmationKind::Invitation,
                invite.id.into(),
                realm.id,
                validity,
            )
            .await?;

        let mut context = TemplateEngine::new();
        context
            .set("inviter_name", &inviter.full_name)
            .set("inviter_email", &inviter.email)
            .set("realm_name", &realm.name)
            .set(
                "activate_url",
                format!("{}/accounts/do_confirm/{}", self.app_base_url, issued.key),
            )
            .set("expiry_text", describe_validity(validity));

        if let Err(e) = self
            .email_service
            .send_now(EmailTemplate::Invitation, &invite.email, &context)
            .await
        {
            tracing::error!(invite_id = %invite.id, error = %e, "Failed to send invitation email");
        }

        if reminder_due(validity) {
            if let Err(e) = self
                .email_service
                .schedule(
                    realm.id,
                    Some(issued.confirmation.id),
                    ScheduledEmailKind::InvitationReminder,
                    &invite.email,
                    &context,
                    now + Duration::days(REMINDER_DELAY_DAYS),
                )
                .await
            {
                tracing::error!(invite_id = %invite.id, error = %e, "Failed to schedule invitation reminder");
            }
        }

        Ok(())
    }
}
