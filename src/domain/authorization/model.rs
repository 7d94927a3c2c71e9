//! Authorization database entries and provider-side session info

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identification::Identification;
use crate::domain::ids::{ChargingProductId, OperatorId, SessionId};
use crate::support::DomainError;

/// Stored authorization result for a token / local identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenAuthStatus {
    Authorized,
    NotAuthorized,
    Blocked,
}

impl TokenAuthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorized => "Authorized",
            Self::NotAuthorized => "NotAuthorized",
            Self::Blocked => "Blocked",
        }
    }
}

impl std::fmt::Display for TokenAuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenAuthStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "authorized" | "accepted" => Ok(Self::Authorized),
            "notauthorized" | "invalid" => Ok(Self::NotAuthorized),
            "blocked" => Ok(Self::Blocked),
            other => Err(DomainError::Validation(format!(
                "unknown token status '{}'",
                other
            ))),
        }
    }
}

/// Who opened a provider-side session and who may stop it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub started_by: Identification,
    /// Always contains `started_by`
    pub permitted_stoppers: HashSet<Identification>,
    pub operator_id: Option<OperatorId>,
    pub charging_product: Option<ChargingProductId>,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(
        session_id: SessionId,
        started_by: Identification,
        operator_id: Option<OperatorId>,
        charging_product: Option<ChargingProductId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut permitted_stoppers = HashSet::new();
        permitted_stoppers.insert(started_by.clone());
        Self {
            session_id,
            started_by,
            permitted_stoppers,
            operator_id,
            charging_product,
            created_at,
        }
    }

    pub fn may_stop(&self, identification: &Identification) -> bool {
        self.permitted_stoppers.contains(identification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_may_always_stop() {
        let token = Identification::auth_token("T1").unwrap();
        let info = SessionInfo::new(
            SessionId::new("S1").unwrap(),
            token.clone(),
            None,
            None,
            Utc::now(),
        );
        assert!(info.may_stop(&token));
        assert!(!info.may_stop(&Identification::auth_token("T2").unwrap()));
    }

    #[test]
    fn token_status_parsing() {
        assert_eq!("Accepted".parse::<TokenAuthStatus>(), Ok(TokenAuthStatus::Authorized));
        assert_eq!("BLOCKED".parse::<TokenAuthStatus>(), Ok(TokenAuthStatus::Blocked));
        assert!("expired-ish".parse::<TokenAuthStatus>().is_err());
    }
}
