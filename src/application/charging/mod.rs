//! Charging hierarchy: EVSE engines, station and pool aggregators

pub mod evse;
pub mod expiry;
pub mod pool;
pub mod station;
pub mod topology;
pub mod whitelist;

pub use evse::{Evse, EvseSnapshot};
pub use expiry::{ExpirySweeper, SweepReport, SweeperHandle, DEFAULT_SWEEP_PERIOD};
pub use pool::{ChargingPool, ChargingTarget};
pub use station::ChargingStation;
pub use topology::{build_pools, EngineSettings};
pub use whitelist::{Whitelists, DEFAULT_WHITELIST};

/// Count one finished operation by name and outcome.
pub(crate) fn record_operation(operation: &'static str, result: &'static str) {
    metrics::counter!("evse_operations_total", "operation" => operation, "result" => result)
        .increment(1);
}
