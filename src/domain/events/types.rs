//! Notification events
//!
//! Defines all event types that can be broadcasted to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::authorization::TokenAuthStatus;
use crate::domain::ids::{EvseId, PoolId, ReservationId, SessionId, StationId};
use crate::domain::reservation::{CancellationReason, Reservation};
use crate::domain::session::{ChargeDetailRecord, ChargingSession};
use crate::domain::status::{AdminStatus, EvseStatus, StationStatus};

/// Event types for notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    ReservationCreated(ReservationCreatedEvent),
    ReservationCancelled(ReservationCancelledEvent),
    SessionStarted(SessionStartedEvent),
    ChargeDetailRecordCreated(ChargeDetailRecordEvent),
    EvseAdminStatusChanged(EvseAdminStatusChangedEvent),
    EvseStatusChanged(EvseStatusChangedEvent),
    StationAdminStatusChanged(StationAdminStatusChangedEvent),
    StationStatusChanged(StationStatusChangedEvent),
    PoolAdminStatusChanged(PoolAdminStatusChangedEvent),
    AuthorizationResult(AuthorizationEvent),
    ChargeDetailRecordForwarded(ChargeDetailRecordForwardedEvent),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ReservationCreated(_) => "reservation_created",
            Event::ReservationCancelled(_) => "reservation_cancelled",
            Event::SessionStarted(_) => "session_started",
            Event::ChargeDetailRecordCreated(_) => "charge_detail_record_created",
            Event::EvseAdminStatusChanged(_) => "evse_admin_status_changed",
            Event::EvseStatusChanged(_) => "evse_status_changed",
            Event::StationAdminStatusChanged(_) => "station_admin_status_changed",
            Event::StationStatusChanged(_) => "station_status_changed",
            Event::PoolAdminStatusChanged(_) => "pool_admin_status_changed",
            Event::AuthorizationResult(_) => "authorization_result",
            Event::ChargeDetailRecordForwarded(_) => "charge_detail_record_forwarded",
        }
    }

    pub fn evse_id(&self) -> Option<&EvseId> {
        match self {
            Event::ReservationCreated(e) => Some(&e.reservation.evse_id),
            Event::ReservationCancelled(e) => Some(&e.evse_id),
            Event::SessionStarted(e) => Some(&e.session.evse_id),
            Event::ChargeDetailRecordCreated(e) => Some(&e.charge_detail_record.evse_id),
            Event::EvseAdminStatusChanged(e) => Some(&e.evse_id),
            Event::EvseStatusChanged(e) => Some(&e.evse_id),
            Event::StationAdminStatusChanged(_)
            | Event::StationStatusChanged(_)
            | Event::PoolAdminStatusChanged(_)
            | Event::AuthorizationResult(_)
            | Event::ChargeDetailRecordForwarded(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCreatedEvent {
    pub reservation: Reservation,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationCancelledEvent {
    pub evse_id: EvseId,
    pub reservation: Reservation,
    pub reason: CancellationReason,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartedEvent {
    pub session: ChargingSession,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeDetailRecordEvent {
    pub charge_detail_record: ChargeDetailRecord,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvseAdminStatusChangedEvent {
    pub evse_id: EvseId,
    pub old_status: AdminStatus,
    pub new_status: AdminStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvseStatusChangedEvent {
    pub evse_id: EvseId,
    pub old_status: EvseStatus,
    pub new_status: EvseStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationAdminStatusChangedEvent {
    pub station_id: StationId,
    pub old_status: AdminStatus,
    pub new_status: AdminStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationStatusChangedEvent {
    pub station_id: StationId,
    pub old_status: StationStatus,
    pub new_status: StationStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolAdminStatusChangedEvent {
    pub pool_id: PoolId,
    pub old_status: AdminStatus,
    pub new_status: AdminStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationEvent {
    pub operation: String,
    pub identification: String,
    pub session_id: Option<SessionId>,
    pub stored_status: Option<TokenAuthStatus>,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeDetailRecordForwardedEvent {
    pub session_id: SessionId,
    pub reservation_id: Option<ReservationId>,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper for sending events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventMessage {
    pub fn new(event: Event) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_type_tag() {
        let event = Event::PoolAdminStatusChanged(PoolAdminStatusChangedEvent {
            pool_id: PoolId::new("POOL-1").unwrap(),
            old_status: AdminStatus::Operational,
            new_status: AdminStatus::OutOfService,
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(EventMessage::new(event)).unwrap();
        assert_eq!(json["type"], "PoolAdminStatusChanged");
        assert_eq!(json["data"]["new_status"], "OutOfService");
        assert!(json["id"].is_string());
    }
}
