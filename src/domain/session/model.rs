//! Charging session and charge detail record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identification::Identification;
use crate::domain::ids::{ChargingProductId, EvseId, ProviderId, ReservationId, SessionId};
use crate::domain::reservation::Reservation;

/// Session time window; `end` is set when the session stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTime {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl SessionTime {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { start, end: None }
    }
}

/// Live record of an in-progress charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingSession {
    pub id: SessionId,
    pub evse_id: EvseId,
    pub provider_id: ProviderId,
    pub identification: Identification,
    pub charging_product: Option<ChargingProductId>,
    /// The reservation this session was promoted from, if any
    pub reservation: Option<Reservation>,
    pub session_time: SessionTime,
}

impl ChargingSession {
    pub fn reservation_id(&self) -> Option<&ReservationId> {
        self.reservation.as_ref().map(|r| &r.id)
    }

    /// Close the session at `stopped_at` and produce its immutable record.
    ///
    /// Metering is not modelled: a zero-energy start/stop pair is recorded.
    pub fn into_charge_detail_record(self, stopped_at: DateTime<Utc>) -> ChargeDetailRecord {
        let start = self.session_time.start;
        let end = stopped_at.max(start);
        ChargeDetailRecord {
            session_id: self.id,
            evse_id: self.evse_id,
            reservation_id: self.reservation.map(|r| r.id),
            provider_id: self.provider_id,
            identification: self.identification,
            charging_product: self.charging_product,
            session_time: SessionTime {
                start,
                end: Some(end),
            },
            meter_values: vec![
                MeterValue {
                    timestamp: start,
                    energy_wh: 0.0,
                },
                MeterValue {
                    timestamp: end,
                    energy_wh: 0.0,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterValue {
    pub timestamp: DateTime<Utc>,
    pub energy_wh: f64,
}

/// Immutable closed-session summary handed to billing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeDetailRecord {
    pub session_id: SessionId,
    pub evse_id: EvseId,
    pub reservation_id: Option<ReservationId>,
    pub provider_id: ProviderId,
    pub identification: Identification,
    pub charging_product: Option<ChargingProductId>,
    pub session_time: SessionTime,
    pub meter_values: Vec<MeterValue>,
}

impl ChargeDetailRecord {
    pub fn energy_wh(&self) -> f64 {
        match (self.meter_values.first(), self.meter_values.last()) {
            (Some(first), Some(last)) => last.energy_wh - first.energy_wh,
            _ => 0.0,
        }
    }
}
