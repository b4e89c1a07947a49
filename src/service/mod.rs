//! Business logic layer

pub mod confirmation;
pub mod email;
pub mod invitation;
pub mod registration;
pub mod seats;

pub use confirmation::ConfirmationManager;
pub use email::{DeliveryReport, EmailService, DELIVERY_BATCH, MAX_DELIVERY_ATTEMPTS};
pub use invitation::InvitationService;
pub use registration::RegistrationService;
pub use seats::{LicenseSeatChecker, SeatChecker, UnlimitedSeats};
