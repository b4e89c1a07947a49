//! Data access layer (Repository pattern)

pub mod confirmation;
pub mod invitation;
pub mod realm;
pub mod scheduled_email;
pub mod user;

pub use confirmation::ConfirmationRepository;
pub use invitation::InvitationRepository;
pub use realm::RealmRepository;
pub use scheduled_email::ScheduledEmailRepository;
pub use user::UserRepository;
