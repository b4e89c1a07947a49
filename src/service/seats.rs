//! License seat checks

use crate::domain::Realm;
use crate::error::{AppError, InvitationError, Result};
use crate::repository::UserRepository;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of license seat availability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SeatChecker: Send + Sync {
    /// Unused seats, or None when the realm has no seat limit
    async fn available_seats(&self, realm: &Realm) -> Result<Option<u64>>;
}

/// Every realm has unlimited seats
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedSeats;

#[async_trait]
impl SeatChecker for UnlimitedSeats {
    async fn available_seats(&self, _realm: &Realm) -> Result<Option<u64>> {
        Ok(None)
    }
}

/// A fixed number of seats per realm, consumed by active non-guest accounts
pub struct LicenseSeatChecker<U: UserRepository> {
    users: Arc<U>,
    licenses: u64,
}

impl<U: UserRepository> LicenseSeatChecker<U> {
    pub fn new(users: Arc<U>, licenses: u64) -> Self {
        Self { users, licenses }
    }
}

#[async_trait]
impl<U: UserRepository + 'static> SeatChecker for LicenseSeatChecker<U> {
    async fn available_seats(&self, realm: &Realm) -> Result<Option<u64>> {
        let used = self.users.count_billable(realm.id).await?;
        Ok(Some(self.licenses.saturating_sub(used)))
    }
}

/// Fail an invitation batch that needs more seats than remain
pub async fn check_invite_seats(
    seats: &dyn SeatChecker,
    realm: &Realm,
    num_invitees: usize,
) -> Result<()> {
    let Some(available) = seats.available_seats(realm).await? else {
        return Ok(());
    };
    if num_invitees as u64 <= available {
        return Ok(());
    }

    let message = if num_invitees == 1 {
        "All licenses for this organization are currently in use. \
         Please buy more licenses before inviting new users."
            .to_string()
    } else {
        format!(
            "Your organization does not have enough unused licenses to invite {} users.",
            num_invitees
        )
    };
    let mut error = InvitationError::new(message);
    error.license_limit_reached = true;
    Err(error.into())
}

/// Fail a registration when the realm has no free seat
pub async fn check_join_seat(seats: &dyn SeatChecker, realm: &Realm) -> Result<()> {
    match seats.available_seats(realm).await? {
        Some(0) => Err(AppError::BadRequest(
            "New members cannot join this organization because all licenses are in use."
                .to_string(),
        )),
        _ => Ok(()),
    }
}
