//! Provider-side authorization outcomes

use serde::{Deserialize, Serialize};

use crate::domain::ids::{ProviderId, SessionId};

pub const UNKNOWN_TOKEN: &str = "Unknown token";
pub const INVALID_TOKEN_FOR_SESSION: &str = "Invalid token for given session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStartResult {
    Authorized {
        session_id: SessionId,
        provider_id: ProviderId,
    },
    NotAuthorized {
        reason: String,
    },
    Blocked,
    Unspecified,
}

impl AuthStartResult {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthStopResult {
    Authorized {
        session_id: SessionId,
        provider_id: ProviderId,
    },
    NotAuthorized {
        reason: String,
    },
    InvalidSessionId,
    Blocked,
    Unspecified,
}

impl AuthStopResult {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendCdrResult {
    Forwarded { session_id: SessionId },
    InvalidSessionId,
}

variant_names!(AuthStartResult {
    Authorized,
    NotAuthorized,
    Blocked,
    Unspecified,
});

variant_names!(AuthStopResult {
    Authorized,
    NotAuthorized,
    InvalidSessionId,
    Blocked,
    Unspecified,
});

variant_names!(SendCdrResult {
    Forwarded,
    InvalidSessionId,
});
