pub mod authorization;
pub mod charging;
pub mod events;

// Re-export key types for convenience
pub use authorization::{AuthorizationRegistry, SharedAuthorizationRegistry};
pub use charging::{
    build_pools, ChargingPool, ChargingStation, ChargingTarget, EngineSettings, Evse,
    EvseSnapshot, ExpirySweeper, SweepReport, SweeperHandle, Whitelists,
};
pub use events::{
    create_event_bus, spawn_notification_dispatcher, EventBus, EventSubscriber, LoggingSink,
    SharedEventBus,
};
