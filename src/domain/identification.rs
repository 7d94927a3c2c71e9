//! Requester identities

use serde::{Deserialize, Serialize};

use crate::support::DomainError;

/// Any form of requester identity checked against a whitelist or the
/// authorization registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Identification {
    /// RFID card / local auth token
    AuthToken(String),
    /// e-mobility account id used for remote (app) starts
    RemoteIdentification(String),
    Pin(String),
}

impl Identification {
    pub fn auth_token(token: impl Into<String>) -> Result<Self, DomainError> {
        non_empty(token.into(), "auth_token").map(Self::AuthToken)
    }

    pub fn remote(account: impl Into<String>) -> Result<Self, DomainError> {
        non_empty(account.into(), "e_mobility_account_id").map(Self::RemoteIdentification)
    }

    pub fn pin(pin: impl Into<String>) -> Result<Self, DomainError> {
        non_empty(pin.into(), "pin").map(Self::Pin)
    }

    pub fn value(&self) -> &str {
        match self {
            Self::AuthToken(v) | Self::RemoteIdentification(v) | Self::Pin(v) => v,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthToken(_) => "auth_token",
            Self::RemoteIdentification(_) => "remote",
            Self::Pin(_) => "pin",
        }
    }
}

impl std::fmt::Display for Identification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // PINs are never printed
            Self::Pin(_) => write!(f, "pin:***"),
            other => write!(f, "{}:{}", other.kind(), other.value()),
        }
    }
}

fn non_empty(value: String, field: &'static str) -> Result<String, DomainError> {
    if value.trim().is_empty() {
        Err(DomainError::empty(field))
    } else {
        Ok(value)
    }
}

/// Identifications a reservation may be consumed by, besides its requester.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedIdentifications {
    pub auth_tokens: Vec<String>,
    pub e_mobility_accounts: Vec<String>,
    pub pins: Vec<String>,
}

impl AllowedIdentifications {
    pub fn contains(&self, identification: &Identification) -> bool {
        match identification {
            Identification::AuthToken(t) => self.auth_tokens.iter().any(|a| a == t),
            Identification::RemoteIdentification(e) => {
                self.e_mobility_accounts.iter().any(|a| a == e)
            }
            Identification::Pin(p) => self.pins.iter().any(|a| a == p),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.auth_tokens.is_empty() && self.e_mobility_accounts.is_empty() && self.pins.is_empty()
    }
}
