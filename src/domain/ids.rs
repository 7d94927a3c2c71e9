//! Identifier newtypes
//!
//! All identifiers are opaque, non-empty strings. Constructors validate;
//! `From<&str>` is intentionally not provided so an empty id cannot slip in.

use serde::{Deserialize, Serialize};

use crate::support::DomainError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::empty($field));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

string_id!(
    /// A single addressable charging point (EVSE).
    EvseId,
    "evse_id"
);
string_id!(StationId, "station_id");
string_id!(PoolId, "pool_id");
string_id!(ProviderId, "provider_id");
string_id!(OperatorId, "operator_id");
string_id!(ChargingProductId, "charging_product_id");
string_id!(
    /// Generated as a UUID when the caller does not supply one.
    ReservationId,
    "reservation_id"
);
string_id!(
    /// Generated as a UUID when the caller does not supply one.
    SessionId,
    "session_id"
);

impl ReservationId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SessionId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
