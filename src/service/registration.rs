//! Signups and registration completion from confirmation links

use crate::config::InvitationConfig;
use crate::domain::{
    CompleteRegistrationInput, Confirmation, ConfirmationKind, InviteAs, MultiuseInviteId,
    NewPendingInvite, NewRegistration, PendingInvite, Realm, RegisteredUser, RegistrationPreview,
    StreamId, UserId,
};
use crate::email::{EmailTemplate, TemplateEngine};
use crate::error::{AppError, ConfirmationError, Result};
use crate::policy::email::check_address_for_realm;
use crate::repository::{
    ConfirmationRepository, InvitationRepository, RealmRepository, ScheduledEmailRepository,
    UserRepository,
};
use crate::service::confirmation::{is_well_formed_key, ConfirmationManager};
use crate::service::email::EmailService;
use crate::service::seats::{check_join_seat, SeatChecker};
use crate::telemetry::metrics;
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

/// Keys that lead to the registration form
const REGISTRATION_KINDS: [ConfirmationKind; 2] = [
    ConfirmationKind::UserRegistration,
    ConfirmationKind::Invitation,
];

pub struct RegistrationService<R, U, I, C, S>
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
    settings: InvitationConfig,
    app_base_url: String,
}

impl<R, U, I, C, S> RegistrationService<R, U, I, C, S>
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

    /// Start a registration from a multi-use link.
    ///
    /// A garbled key in a realm open to everyone degrades to a plain signup.
    pub async fn join_via_multiuse(&self, subdomain: &str, key: &str, email: &str) -> Result<()> {
        let realm = self.realm_by_subdomain(subdomain).await?;

        if !is_well_formed_key(key) && !realm.invite_required {
            return self.start_registration(&realm, email, None).await;
        }

        let confirmation = self
            .confirmations
            .resolve(key, &[ConfirmationKind::MultiuseInvite], false)
            .await?;
        ensure_same_realm(&confirmation, &realm)?;

        let link = self
            .invitation_repo
            .find_multiuse(MultiuseInviteId::from(confirmation.object_id))
            .await?
            .ok_or(ConfirmationError::NotFound)?;

        self.start_registration(
            &realm,
            email,
            Some(LinkGrant {
                link_id: link.id,
                referred_by: link.referred_by,
                invited_as: link.invited_as,
                stream_ids: link.stream_ids,
            }),
        )
        .await
    }

    /// Self-service signup for realms that do not require an invitation
    pub async fn request_signup(&self, subdomain: &str, email: &str) -> Result<()> {
        let realm = self.realm_by_subdomain(subdomain).await?;
        if realm.invite_required {
            return Err(AppError::Forbidden(format!(
                "Please request an invite for {} from the organization administrator.",
                email
            )));
        }
        self.start_registration(&realm, email, None).await
    }

    /// What the registration form shows for a key, without consuming it
    pub async fn preview(&self, subdomain: &str, key: &str) -> Result<RegistrationPreview> {
        let realm = self.realm_by_subdomain(subdomain).await?;
        let (_, invite) = self.resolve_registration(&realm, key).await?;

        Ok(RegistrationPreview {
            email: invite.email,
            realm_id: realm.id,
            realm_name: realm.name,
        })
    }

    /// Create the account behind a registration key.
    ///
    /// All checks run before anything is written. The key is consumed in the
    /// same transaction that writes the account, so a rejected or failed
    /// attempt leaves the link usable.
    pub async fn complete(&self, input: CompleteRegistrationInput) -> Result<RegisteredUser> {
        input.validate()?;
        let realm = self.realm_by_subdomain(&input.realm).await?;
        let (confirmation, invite) = self.resolve_registration(&realm, &input.key).await?;

        check_address_for_realm(&realm, &invite.email, &self.settings.disposable_email_domains)
            .map_err(|rejection| AppError::BadRequest(rejection.signup_message(&realm.name)))?;

        let existing = self
            .user_repo
            .find_by_email(realm.id, &invite.email)
            .await?;
        let mirror_dummy = match existing {
            Some(user) if user.is_mirror_dummy => Some(user.id),
            Some(user) if user.is_active => {
                return Err(AppError::AlreadyRegistered(invite.email));
            }
            Some(_) => {
                return Err(AppError::BadRequest(
                    "Account has been deactivated.".to_string(),
                ));
            }
            None => None,
        };

        let role = invite.invited_as.role();
        if !role.is_guest() {
            check_join_seat(self.seats.as_ref(), &realm).await?;
        }

        // A concurrent attempt that consumed the key first wins.
        let user = self
            .user_repo
            .register(&NewRegistration {
                confirmation_id: confirmation.id,
                invite_id: invite.id,
                realm_id: realm.id,
                email: invite.email.clone(),
                full_name: input.full_name.clone(),
                role,
                stream_ids: invite.stream_ids.clone(),
                mirror_dummy,
                at: Utc::now(),
            })
            .await?
            .ok_or(ConfirmationError::Expired)?;

        let source = if invite.multiuse_invite_id.is_some() {
            "multiuse"
        } else if invite.referred_by.is_some() {
            "invitation"
        } else {
            "signup"
        };
        metrics::record_registration(source);
        tracing::info!(
            realm_id = %realm.id,
            user_id = %user.id,
            source,
            "Registration completed"
        );

        Ok(RegisteredUser {
            user_id: user.id,
            realm_id: realm.id,
            email: user.email,
        })
    }

    async fn realm_by_subdomain(&self, subdomain: &str) -> Result<Realm> {
        self.realm_repo
            .find_by_subdomain(subdomain)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No organization found for {}", subdomain)))
    }

    /// The pending registration behind a key, leaving the key unconsumed
    async fn resolve_registration(
        &self,
        realm: &Realm,
        key: &str,
    ) -> Result<(Confirmation, PendingInvite)> {
        let confirmation = self
            .confirmations
            .resolve(key, &REGISTRATION_KINDS, false)
            .await?;
        ensure_same_realm(&confirmation, realm)?;

        let invite = self
            .invitation_repo
            .find_pending(confirmation.object_id.into())
            .await?
            .ok_or(ConfirmationError::NotFound)?;
        Ok((confirmation, invite))
    }

    /// Validate the address, record a pending registration and email its key
    async fn start_registration(
        &self,
        realm: &Realm,
        email: &str,
        grant: Option<LinkGrant>,
    ) -> Result<()> {
        let email = email.trim();
        check_address_for_realm(realm, email, &self.settings.disposable_email_domains)
            .map_err(|rejection| AppError::BadRequest(rejection.signup_message(&realm.name)))?;

        if let Some(user) = self.user_repo.find_by_email(realm.id, email).await? {
            if user.is_active && !user.is_mirror_dummy {
                return Err(AppError::AlreadyRegistered(email.to_string()));
            }
        }

        let validity = Some(self.settings.confirmation_link_validity_minutes);
        let (referred_by, invited_as, stream_ids, multiuse_invite_id) = match grant {
            Some(grant) => (
                Some(grant.referred_by),
                grant.invited_as,
                grant.stream_ids,
                Some(grant.link_id),
            ),
            None => (None, InviteAs::Member, Vec::new(), None),
        };

        let invite = self
            .invitation_repo
            .create_pending(&NewPendingInvite {
                realm_id: realm.id,
                email: email.to_string(),
                referred_by,
                invited_as,
                stream_ids,
                multiuse_invite_id,
                invite_expires_in_minutes: validity,
            })
            .await?;
        let issued = self
            .confirmations
            .issue(
                ConfirmationKind::UserRegistration,
                invite.id.into(),
                realm.id,
                validity,
            )
            .await?;

        let mut context = TemplateEngine::new();
        context.set("realm_name", &realm.name).set(
            "activate_url",
            format!("{}/accounts/do_confirm/{}", self.app_base_url, issued.key),
        );
        self.email_service
            .send_now(EmailTemplate::ConfirmRegistration, email, &context)
            .await?;

        tracing::info!(realm_id = %realm.id, invite_id = %invite.id, "Registration confirmation sent");
        Ok(())
    }
}

/// What a multi-use link hands on to the registrations it starts
struct LinkGrant {
    link_id: MultiuseInviteId,
    referred_by: UserId,
    invited_as: InviteAs,
    stream_ids: Vec<StreamId>,
}

fn ensure_same_realm(confirmation: &Confirmation, realm: &Realm) -> Result<()> {
    if confirmation.realm_id != realm.id {
        return Err(ConfirmationError::NotFound.into());
    }
    Ok(())
}
