pub mod authorization;
pub mod events;
pub mod identification;
pub mod ids;
pub mod ports;
pub mod reservation;
pub mod results;
pub mod session;
pub mod status;

// Re-export commonly used types
pub use authorization::{SessionInfo, TokenAuthStatus};
pub use events::{Event, EventMessage};
pub use identification::{AllowedIdentifications, Identification};
pub use ids::{
    ChargingProductId, EvseId, OperatorId, PoolId, ProviderId, ReservationId, SessionId,
    StationId,
};
pub use reservation::{
    CancellationReason, Reservation, ReservationHandling, ReservationLevel, ReservationRequest,
};
pub use results::{
    AuthStartResult, AuthStopResult, CancelReservationResult, RemoteStartEvseResult,
    RemoteStartPoolResult, RemoteStartStationResult, RemoteStopEvseResult, RemoteStopPoolResult,
    RemoteStopStationResult, ReservationResult, SendCdrResult, SessionStopped,
};
pub use session::{
    ChargeDetailRecord, ChargingSession, MeterValue, RemoteStartRequest, RemoteStopRequest,
    SessionTime,
};
pub use status::{AdminStatus, EvseStatus, StationStatus, StatusSchedule, Timestamped};

// Re-export DomainError from support for convenience
pub use crate::support::errors::DomainError;
