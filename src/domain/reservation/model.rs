//! Reservation domain entity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identification::{AllowedIdentifications, Identification};
use crate::domain::ids::{ChargingProductId, EvseId, ProviderId, ReservationId};
use crate::support::errors::DomainError;

/// Default reservation length in seconds when the caller gives none.
pub const DEFAULT_RESERVATION_SECS: i64 = 15 * 60;

pub fn default_reservation_duration() -> Duration {
    Duration::seconds(DEFAULT_RESERVATION_SECS)
}

/// `start + duration`, rejecting non-positive durations and expiries past
/// the representable date range.
pub fn expiry_after(start: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>, DomainError> {
    if duration <= Duration::zero() {
        return Err(DomainError::Validation(format!(
            "reservation duration must be positive, got {}s",
            duration.num_seconds()
        )));
    }
    start.checked_add_signed(duration).ok_or_else(|| {
        DomainError::Validation(format!(
            "reservation duration of {}s is out of range",
            duration.num_seconds()
        ))
    })
}

/// Granularity at which a reservation was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationLevel {
    Evse,
    Station,
    Pool,
}

/// Why a reservation went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancellationReason {
    /// Cancelled on request of the provider or operator
    Deleted,
    /// Expiry sweep removed it
    Expired,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "Deleted",
            Self::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stop-time directive for the reservation a session came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReservationHandling {
    #[default]
    Close,
    KeepAlive(#[serde(with = "duration_secs")] Duration),
}

impl ReservationHandling {
    /// Keep-alive interval in whole seconds, as exposed to callers.
    pub fn keep_alive_secs(&self) -> Option<i64> {
        match self {
            Self::Close => None,
            Self::KeepAlive(d) => Some(d.num_seconds()),
        }
    }
}

/// Time-boxed lease on an EVSE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    /// Creation time, refreshed by an in-place update
    pub timestamp: DateTime<Utc>,
    /// Original start; never moved by updates
    pub start_time: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub expiry_time: DateTime<Utc>,
    pub level: ReservationLevel,
    pub evse_id: EvseId,
    pub provider_id: ProviderId,
    pub identification: Identification,
    pub charging_product: Option<ChargingProductId>,
    pub allowed: AllowedIdentifications,
}

impl Reservation {
    /// Whether `identification` may consume this reservation.
    pub fn permits(&self, identification: &Identification) -> bool {
        self.identification == *identification || self.allowed.contains(identification)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_time
    }

    /// Remaining lease time, zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expiry_time - now).max(Duration::zero())
    }

    /// Refresh an existing reservation in place: same id and start time,
    /// new timestamp, duration and expiry counted from `now`. Left untouched
    /// when the duration is rejected.
    pub fn renew(&mut self, now: DateTime<Utc>, duration: Duration) -> Result<(), DomainError> {
        self.expiry_time = expiry_after(now, duration)?;
        self.timestamp = now;
        self.duration = duration;
        Ok(())
    }
}

/// Everything a Reserve call carries, at any level of the hierarchy
#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    pub reservation_id: Option<ReservationId>,
    pub provider_id: ProviderId,
    pub identification: Identification,
    pub charging_product: Option<ChargingProductId>,
    pub allowed: AllowedIdentifications,
    pub level: ReservationLevel,
}

impl ReservationRequest {
    pub fn new(provider_id: ProviderId, identification: Identification) -> Self {
        Self {
            start_time: None,
            duration: None,
            reservation_id: None,
            provider_id,
            identification,
            charging_product: None,
            allowed: AllowedIdentifications::default(),
            level: ReservationLevel::Evse,
        }
    }

    pub fn with_id(mut self, id: ReservationId) -> Self {
        self.reservation_id = Some(id);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_product(mut self, product: ChargingProductId) -> Self {
        self.charging_product = Some(product);
        self
    }

    pub fn with_allowed(mut self, allowed: AllowedIdentifications) -> Self {
        self.allowed = allowed;
        self
    }

    pub(crate) fn at_level(mut self, level: ReservationLevel) -> Self {
        self.level = level;
        self
    }

    /// Build a fresh reservation on `evse_id`.
    pub fn into_reservation(
        self,
        evse_id: EvseId,
        now: DateTime<Utc>,
        default_duration: Duration,
    ) -> Result<Reservation, DomainError> {
        let start_time = self.start_time.unwrap_or(now);
        let duration = self.duration.unwrap_or(default_duration);
        let expiry_time = expiry_after(start_time, duration)?;
        Ok(Reservation {
            id: self.reservation_id.unwrap_or_else(ReservationId::random),
            timestamp: now,
            start_time,
            duration,
            expiry_time,
            level: self.level,
            evse_id,
            provider_id: self.provider_id,
            identification: self.identification,
            charging_product: self.charging_product,
            allowed: self.allowed,
        })
    }
}

pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| D::Error::custom(format!("duration of {}s is out of range", secs)))
    }
}

// ── Tests ──────────────────────────────────────────────────────
