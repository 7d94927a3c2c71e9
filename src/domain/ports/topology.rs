//! Catalog/topology port: which stations belong to a pool and which EVSEs
//! to a station

use async_trait::async_trait;

use crate::domain::identification::Identification;
use crate::domain::ids::{EvseId, PoolId, StationId};
use crate::domain::status::AdminStatus;
use crate::support::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationDescriptor {
    pub id: StationId,
    pub admin_status: AdminStatus,
    pub evses: Vec<EvseId>,
    pub whitelist_enabled: bool,
    pub whitelist: Vec<Identification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDescriptor {
    pub id: PoolId,
    pub admin_status: AdminStatus,
    pub stations: Vec<StationDescriptor>,
}

#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn pools(&self) -> Result<Vec<PoolDescriptor>, DomainError>;
}
