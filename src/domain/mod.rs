//! Domain models for Rollcall Core

pub mod common;
pub mod confirmation;
pub mod email;
pub mod invitation;
pub mod realm;
pub mod registration;
pub mod role;
pub mod user;

pub use common::*;
pub use confirmation::*;
pub use email::*;
pub use invitation::*;
pub use realm::*;
pub use registration::*;
pub use role::*;
pub use user::*;
