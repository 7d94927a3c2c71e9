//! Reservation aggregate
//!
//! Contains the Reservation entity and the request/handling types around it.

pub mod model;

pub use model::{
    CancellationReason, Reservation, ReservationHandling, ReservationLevel, ReservationRequest,
    default_reservation_duration, expiry_after, DEFAULT_RESERVATION_SECS,
};
