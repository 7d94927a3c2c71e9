//! # Texnouz EVSE
//!
//! Reservation, remote start/stop and authorization engine for EV charging
//! infrastructure organised as pools, stations and EVSEs.
//!
//! ## Architecture
//!
//! - **domain**: identifiers, identifications, reservations, sessions,
//!   statuses, result types, events and ports
//! - **application**: per-EVSE engines, station and pool routing, the
//!   reservation expiry sweeper, the authorization registry and the event bus
//! - **config**: TOML configuration and static topology
//! - **server**: runtime wiring and graceful shutdown
//! - **support**: errors, cancellation, clocks and shutdown signals

pub mod application;
pub mod config;
pub mod domain;
pub mod server;
pub mod support;

pub use config::{default_config_path, AppConfig};

pub use application::{
    create_event_bus, AuthorizationRegistry, ChargingPool, ChargingStation, ChargingTarget, Evse,
    EventBus, SharedEventBus,
};
pub use domain::{DomainError, Event};
pub use support::{AppError, RequestContext};
