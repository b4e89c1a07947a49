//! Authorization rules for inviting users and managing invitations.

pub mod email;
pub mod limits;

use crate::domain::{InviteAs, InvitePolicy, Realm, Role, UserAccount, UserId};
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};

pub type PolicyResult<T> = std::result::Result<T, AppError>;

/// Whether a user with `role` passes the realm's invite policy.
pub fn can_invite_to_realm(policy: InvitePolicy, role: Role, is_provisional: bool) -> bool {
    if policy == InvitePolicy::Nobody {
        return false;
    }
    match role {
        Role::Owner | Role::Admin => true,
        Role::Moderator => !matches!(policy, InvitePolicy::AdminsOnly),
        Role::Guest => false,
        Role::Member => match policy {
            InvitePolicy::Nobody | InvitePolicy::AdminsOnly | InvitePolicy::ModeratorsOnly => {
                false
            }
            InvitePolicy::MembersOnly => true,
            InvitePolicy::FullMembersOnly => !is_provisional,
        },
    }
}

/// Members still inside the realm's waiting period are provisional.
pub fn is_provisional_member(
    date_joined: DateTime<Utc>,
    waiting_period_days: i64,
    now: DateTime<Utc>,
) -> bool {
    (now - date_joined).num_days() < waiting_period_days
}

/// Gate for sending email invitations at all.
pub fn require_invite_to_realm(
    realm: &Realm,
    actor: &UserAccount,
    now: DateTime<Utc>,
) -> PolicyResult<()> {
    if actor.role.is_guest() {
        return Err(AppError::Forbidden("Not allowed for guest users".to_string()));
    }
    let provisional =
        is_provisional_member(actor.date_joined, realm.waiting_period_threshold_days, now);
    if can_invite_to_realm(realm.invite_to_realm_policy, actor.role, provisional) {
        return Ok(());
    }
    if realm.invite_to_realm_policy == InvitePolicy::AdminsOnly {
        return Err(AppError::Forbidden(
            "Must be an organization administrator".to_string(),
        ));
    }
    Err(AppError::Forbidden("Insufficient permission".to_string()))
}

/// Only owners may grant ownership; only administrators may grant admin or moderator.
pub fn require_invite_as_authority(actor_role: Role, invite_as: InviteAs) -> PolicyResult<()> {
    match invite_as {
        InviteAs::RealmOwner if !actor_role.is_owner() => Err(AppError::Forbidden(
            "Must be an organization owner".to_string(),
        )),
        InviteAs::RealmAdmin | InviteAs::Moderator if !actor_role.is_realm_admin() => Err(
            AppError::Forbidden("Must be an organization administrator".to_string()),
        ),
        _ => Ok(()),
    }
}

/// Multi-use links can only be created or revoked by administrators.
pub fn require_multiuse_authority(actor_role: Role, invite_as: InviteAs) -> PolicyResult<()> {
    if !actor_role.is_realm_admin() {
        return Err(AppError::Forbidden(
            "Must be an organization administrator".to_string(),
        ));
    }
    require_invite_as_authority(actor_role, invite_as)
}

/// New non-admin accounts may not send invitations.
pub fn require_account_age(
    actor: &UserAccount,
    min_age_days: i64,
    now: DateTime<Utc>,
) -> PolicyResult<()> {
    if actor.role.is_realm_admin() || actor.date_joined <= now - Duration::days(min_age_days) {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Your account is too new to send invites for this organization. \
         Ask an organization admin, or a more experienced user."
            .to_string(),
    ))
}

/// Resend/revoke rights over an existing invitation.
///
/// Invitations granting ownership are managed by owners only; otherwise
/// administrators or the original inviter.
pub fn require_manage_invite(
    actor: &UserAccount,
    referred_by: Option<UserId>,
    invited_as: InviteAs,
) -> PolicyResult<()> {
    if invited_as == InviteAs::RealmOwner && !actor.role.is_owner() {
        return Err(AppError::Forbidden(
            "Must be an organization owner".to_string(),
        ));
    }
    if actor.role.is_realm_admin() || referred_by == Some(actor.id) {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Must be an organization administrator".to_string(),
    ))
}
