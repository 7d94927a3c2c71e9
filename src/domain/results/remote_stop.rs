//! RemoteStop outcomes per hierarchy level

use serde::{Deserialize, Serialize};

use crate::domain::ids::ReservationId;
use crate::domain::reservation::ReservationHandling;
use crate::domain::session::ChargeDetailRecord;

/// Payload of a successful stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStopped {
    pub charge_detail_record: ChargeDetailRecord,
    pub reservation_id: Option<ReservationId>,
    pub reservation_handling: ReservationHandling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStopEvseResult {
    Success(SessionStopped),
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStopStationResult {
    Success(SessionStopped),
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error(String),
    UnknownEvse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStopPoolResult {
    Success(SessionStopped),
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error(String),
    UnknownEvse,
    UnknownStation,
}

translate_results!(RemoteStopEvseResult => RemoteStopStationResult {
    Success(stopped),
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error(message),
});

translate_results!(RemoteStopStationResult => RemoteStopPoolResult {
    Success(stopped),
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error(message),
    UnknownEvse,
});

variant_names!(RemoteStopEvseResult {
    Success,
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error,
});

variant_names!(RemoteStopStationResult {
    Success,
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error,
    UnknownEvse,
});

variant_names!(RemoteStopPoolResult {
    Success,
    InvalidSessionId,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InternalUse,
    Unspecified,
    Error,
    UnknownEvse,
    UnknownStation,
});

from_interrupted!(RemoteStopEvseResult, RemoteStopStationResult, RemoteStopPoolResult);

impl RemoteStopEvseResult {
    pub fn stopped(&self) -> Option<&SessionStopped> {
        match self {
            Self::Success(s) => Some(s),
            _ => None,
        }
    }
}

impl RemoteStopStationResult {
    pub fn stopped(&self) -> Option<&SessionStopped> {
        match self {
            Self::Success(s) => Some(s),
            _ => None,
        }
    }
}

impl RemoteStopPoolResult {
    pub fn stopped(&self) -> Option<&SessionStopped> {
        match self {
            Self::Success(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_is_variant_for_variant() {
        for (evse, name) in [
            (RemoteStopEvseResult::InvalidSessionId, "InvalidSessionId"),
            (RemoteStopEvseResult::OutOfService, "OutOfService"),
            (RemoteStopEvseResult::Canceled, "Canceled"),
        ] {
            let pool = RemoteStopPoolResult::from(RemoteStopStationResult::from(evse));
            assert_eq!(pool.as_str(), name);
        }
    }
}
