//! Build the in-memory charging hierarchy from a topology provider

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use super::pool::ChargingPool;
use super::station::ChargingStation;
use super::whitelist::DEFAULT_WHITELIST;
use crate::application::events::SharedEventBus;
use crate::domain::ports::TopologyProvider;
use crate::domain::reservation::default_reservation_duration;
use crate::domain::DomainError;
use crate::support::SharedClock;

/// Settings shared by every engine in the hierarchy
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_reservation_duration: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_reservation_duration: default_reservation_duration(),
        }
    }
}

/// Instantiate pools, stations and EVSEs. EVSE and station ids must be
/// unique across the whole topology.
pub async fn build_pools(
    provider: &dyn TopologyProvider,
    settings: &EngineSettings,
    clock: SharedClock,
    events: SharedEventBus,
) -> Result<Vec<Arc<ChargingPool>>, DomainError> {
    let descriptors = provider.pools().await?;
    let mut pool_ids = HashSet::new();
    let mut station_ids = HashSet::new();
    let mut evse_ids = HashSet::new();
    let mut pools = Vec::with_capacity(descriptors.len());

    for pool_desc in descriptors {
        if !pool_ids.insert(pool_desc.id.clone()) {
            return Err(DomainError::Conflict(format!("duplicate pool id {}", pool_desc.id)));
        }
        let pool = Arc::new(ChargingPool::new(
            pool_desc.id,
            pool_desc.admin_status,
            clock.clone(),
            events.clone(),
        ));

        for station_desc in pool_desc.stations {
            if !station_ids.insert(station_desc.id.clone()) {
                return Err(DomainError::Conflict(format!(
                    "duplicate station id {}",
                    station_desc.id
                )));
            }
            let station = Arc::new(ChargingStation::new(
                station_desc.id,
                station_desc.admin_status,
                clock.clone(),
                events.clone(),
                settings.default_reservation_duration,
            ));
            for evse_id in station_desc.evses {
                if !evse_ids.insert(evse_id.clone()) {
                    return Err(DomainError::Conflict(format!("duplicate EVSE id {}", evse_id)));
                }
                station.create_evse(evse_id, station_desc.admin_status).await?;
            }
            station.whitelists().set_enabled(station_desc.whitelist_enabled);
            for identification in station_desc.whitelist {
                station.whitelists().add(DEFAULT_WHITELIST, identification);
            }
            pool.add_station(station).await?;
        }

        info!(
            pool_id = %pool.id(),
            stations = pool.stations().await.len(),
            "Charging pool ready"
        );
        pools.push(pool);
    }

    Ok(pools)
}
