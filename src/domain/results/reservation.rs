//! Reserve / CancelReservation outcomes, shared by every level

use serde::{Deserialize, Serialize};

use crate::domain::ids::ReservationId;
use crate::domain::reservation::Reservation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReservationResult {
    Success(Reservation),
    InvalidCredentials,
    AlreadyReserved,
    AlreadyInUse,
    OutOfService,
    Offline,
    NoEvsesAvailable,
    UnknownEvse,
    UnknownStation,
    Timeout,
    Canceled,
    Error(String),
}

impl ReservationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            Self::Success(r) => Some(r),
            _ => None,
        }
    }
}

variant_names!(ReservationResult {
    Success,
    InvalidCredentials,
    AlreadyReserved,
    AlreadyInUse,
    OutOfService,
    Offline,
    NoEvsesAvailable,
    UnknownEvse,
    UnknownStation,
    Timeout,
    Canceled,
    Error,
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReservationResult {
    /// `None` when there was nothing to cancel
    Success(Option<ReservationId>),
    UnknownReservationId,
    UnknownEvse,
    UnknownStation,
    OutOfService,
    Timeout,
    Canceled,
    Error(String),
}

impl CancelReservationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

variant_names!(CancelReservationResult {
    Success,
    UnknownReservationId,
    UnknownEvse,
    UnknownStation,
    OutOfService,
    Timeout,
    Canceled,
    Error,
});

from_interrupted!(ReservationResult, CancelReservationResult);
