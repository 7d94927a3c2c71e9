//! RemoteStart / RemoteStop request payloads

use crate::domain::identification::Identification;
use crate::domain::ids::{ChargingProductId, ProviderId, ReservationId, SessionId};
use crate::domain::reservation::ReservationHandling;

#[derive(Debug, Clone)]
pub struct RemoteStartRequest {
    pub charging_product: Option<ChargingProductId>,
    /// Reservation to consume, if the EVSE is held for the caller
    pub reservation_id: Option<ReservationId>,
    /// Minted when absent
    pub session_id: Option<SessionId>,
    pub provider_id: ProviderId,
    pub identification: Identification,
}

impl RemoteStartRequest {
    pub fn new(provider_id: ProviderId, identification: Identification) -> Self {
        Self {
            charging_product: None,
            reservation_id: None,
            session_id: None,
            provider_id,
            identification,
        }
    }

    pub fn with_reservation(mut self, id: ReservationId) -> Self {
        self.reservation_id = Some(id);
        self
    }

    pub fn with_session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn with_product(mut self, product: ChargingProductId) -> Self {
        self.charging_product = Some(product);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RemoteStopRequest {
    pub session_id: SessionId,
    pub reservation_handling: ReservationHandling,
    pub provider_id: ProviderId,
    pub identification: Identification,
}

impl RemoteStopRequest {
    pub fn new(session_id: SessionId, provider_id: ProviderId, identification: Identification) -> Self {
        Self {
            session_id,
            reservation_handling: ReservationHandling::Close,
            provider_id,
            identification,
        }
    }

    pub fn with_handling(mut self, handling: ReservationHandling) -> Self {
        self.reservation_handling = handling;
        self
    }
}
