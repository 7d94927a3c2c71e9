//! RemoteStart outcomes per hierarchy level

use serde::{Deserialize, Serialize};

use crate::domain::session::ChargingSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStartEvseResult {
    Success(ChargingSession),
    InvalidCredentials,
    AlreadyInUse,
    /// Held by a reservation the caller did not name
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStartStationResult {
    Success(ChargingSession),
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error(String),
    UnknownEvse,
    NoEvsesAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteStartPoolResult {
    Success(ChargingSession),
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error(String),
    UnknownEvse,
    NoEvsesAvailable,
    UnknownStation,
}

translate_results!(RemoteStartEvseResult => RemoteStartStationResult {
    Success(session),
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error(message),
});

translate_results!(RemoteStartStationResult => RemoteStartPoolResult {
    Success(session),
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error(message),
    UnknownEvse,
    NoEvsesAvailable,
});

variant_names!(RemoteStartEvseResult {
    Success,
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error,
});

variant_names!(RemoteStartStationResult {
    Success,
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error,
    UnknownEvse,
    NoEvsesAvailable,
});

variant_names!(RemoteStartPoolResult {
    Success,
    InvalidCredentials,
    AlreadyInUse,
    Reserved,
    OutOfService,
    Offline,
    Timeout,
    Canceled,
    UnknownOperator,
    InvalidSessionId,
    InternalUse,
    Unspecified,
    Error,
    UnknownEvse,
    NoEvsesAvailable,
    UnknownStation,
});

from_interrupted!(RemoteStartEvseResult, RemoteStartStationResult, RemoteStartPoolResult);

impl RemoteStartEvseResult {
    pub fn session(&self) -> Option<&ChargingSession> {
        match self {
            Self::Success(s) => Some(s),
            _ => None,
        }
    }
}

impl RemoteStartStationResult {
    pub fn session(&self) -> Option<&ChargingSession> {
        match self {
            Self::Success(s) => Some(s),
            _ => None,
        }
    }
}

impl RemoteStartPoolResult {
    pub fn session(&self) -> Option<&ChargingSession> {
        match self {
            Self::Success(s) => Some(s),
            _ => None,
        }
    }
}
