//! Application state traits for dependency injection
//!
//! Handlers are generic over [`HasServices`] so the same code runs against
//! the MySQL-backed `AppState` and the in-memory state used in tests.

use crate::config::Config;
use crate::jwt::JwtManager;
use crate::repository::{
    ConfirmationRepository, InvitationRepository, RealmRepository, ScheduledEmailRepository,
    UserRepository,
};
use crate::service::{InvitationService, RegistrationService};

pub trait HasServices: Clone + Send + Sync + 'static {
    type RealmRepo: RealmRepository + 'static;
    type UserRepo: UserRepository + 'static;
    type InvitationRepo: InvitationRepository + 'static;
    type ConfirmationRepo: ConfirmationRepository + 'static;
    type ScheduledEmailRepo: ScheduledEmailRepository + 'static;

    fn config(&self) -> &Config;

    fn jwt_manager(&self) -> &JwtManager;

    /// Used to load the acting account behind a bearer token
    fn user_repo(&self) -> &Self::UserRepo;

    fn invitation_service(
        &self,
    ) -> &InvitationService<
        Self::RealmRepo,
        Self::UserRepo,
        Self::InvitationRepo,
        Self::ConfirmationRepo,
        Self::ScheduledEmailRepo,
    >;

    fn registration_service(
        &self,
    ) -> &RegistrationService<
        Self::RealmRepo,
        Self::UserRepo,
        Self::InvitationRepo,
        Self::ConfirmationRepo,
        Self::ScheduledEmailRepo,
    >;

    /// Whether backing storage is reachable
    fn check_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}
