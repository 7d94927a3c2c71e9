//! Closed result vocabularies for every operation family
//!
//! Outcomes are values, not errors. Each hierarchy level has its own
//! RemoteStart/RemoteStop vocabulary; moving a result one level up goes through
//! [`translate_results!`], a variant-for-variant mapping table whose generated
//! `match` is exhaustive, so adding a variant without mapping it fails to build.

/// Generates `From<$src> for $dst` mapping each listed variant to the
/// same-named variant of `$dst`, carrying its payload.
macro_rules! translate_results {
    ($src:ident => $dst:ident { $($variant:ident $(($payload:ident))?),* $(,)? }) => {
        impl From<$src> for $dst {
            fn from(result: $src) -> Self {
                match result {
                    $( $src::$variant $(($payload))? => $dst::$variant $(($payload))?, )*
                }
            }
        }
    };
}

/// Generates `as_str`/`Display` from the variant names.
macro_rules! variant_names {
    ($ty:ident { $($variant:ident),* $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant { .. } => stringify!($variant), )*
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Maps a lock wait that gave up onto the `Timeout`/`Canceled` variants.
macro_rules! from_interrupted {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<crate::support::Interrupted> for $ty {
                fn from(interrupted: crate::support::Interrupted) -> Self {
                    match interrupted {
                        crate::support::Interrupted::Timeout => $ty::Timeout,
                        crate::support::Interrupted::Canceled => $ty::Canceled,
                    }
                }
            }
        )*
    };
}

pub mod authorization;
pub mod remote_start;
pub mod remote_stop;
pub mod reservation;

pub use authorization::{AuthStartResult, AuthStopResult, SendCdrResult};
pub use remote_start::{RemoteStartEvseResult, RemoteStartPoolResult, RemoteStartStationResult};
pub use remote_stop::{
    RemoteStopEvseResult, RemoteStopPoolResult, RemoteStopStationResult, SessionStopped,
};
pub use reservation::{CancelReservationResult, ReservationResult};
