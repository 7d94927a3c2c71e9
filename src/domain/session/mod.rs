//! Charging session aggregate

pub mod model;
pub mod request;

pub use model::{ChargeDetailRecord, ChargingSession, MeterValue, SessionTime};
pub use request::{RemoteStartRequest, RemoteStopRequest};
