//! Charging pool: routes requests to stations and re-types their results

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::station::ChargingStation;
use crate::application::events::SharedEventBus;
use crate::domain::events::PoolAdminStatusChangedEvent;
use crate::domain::reservation::ReservationLevel;
use crate::domain::{
    AdminStatus, CancelReservationResult, CancellationReason, DomainError, Event, EvseId, PoolId,
    RemoteStartPoolResult, RemoteStartRequest, RemoteStopPoolResult, RemoteStopRequest,
    ReservationId, ReservationRequest, ReservationResult, StationId, StationStatus,
    StatusSchedule,
};
use crate::support::{Interrupted, RequestContext, SharedClock};

/// Where inside a pool a request should land
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChargingTarget {
    Evse(EvseId),
    Station(StationId),
}

pub struct ChargingPool {
    id: PoolId,
    clock: SharedClock,
    events: SharedEventBus,
    admin: Mutex<StatusSchedule<AdminStatus>>,
    stations: RwLock<Vec<Arc<ChargingStation>>>,
}

/// Station chosen for a request, or the reason none could be
enum Resolved {
    Station(Arc<ChargingStation>, Option<EvseId>),
    UnknownEvse,
    UnknownStation,
    NothingAvailable,
}

impl ChargingPool {
    pub fn new(id: PoolId, admin_status: AdminStatus, clock: SharedClock, events: SharedEventBus) -> Self {
        let now = clock.now();
        Self {
            id,
            clock,
            events,
            admin: Mutex::new(StatusSchedule::new(admin_status, now)),
            stations: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    pub async fn add_station(&self, station: Arc<ChargingStation>) -> Result<(), DomainError> {
        let mut stations = self.stations.write().await;
        if stations.iter().any(|s| s.id() == station.id()) {
            return Err(DomainError::Conflict(format!(
                "station {} already exists in pool {}",
                station.id(),
                self.id
            )));
        }
        info!(pool_id = %self.id, station_id = %station.id(), "Station added");
        stations.push(station);
        Ok(())
    }

    pub async fn remove_station(&self, id: &StationId) -> Option<Arc<ChargingStation>> {
        let mut stations = self.stations.write().await;
        let index = stations.iter().position(|s| s.id() == id)?;
        info!(pool_id = %self.id, station_id = %id, "Station removed");
        Some(stations.remove(index))
    }

    pub async fn station(&self, id: &StationId) -> Option<Arc<ChargingStation>> {
        self.stations.read().await.iter().find(|s| s.id() == id).cloned()
    }

    pub async fn stations(&self) -> Vec<Arc<ChargingStation>> {
        self.stations.read().await.clone()
    }

    /// The station that owns `evse_id`.
    pub async fn station_for_evse(&self, evse_id: &EvseId) -> Option<Arc<ChargingStation>> {
        for station in self.stations().await {
            if station.evse(evse_id).await.is_some() {
                return Some(station);
            }
        }
        None
    }

    pub async fn admin_status(&self) -> AdminStatus {
        self.admin.lock().await.current()
    }

    pub async fn set_admin_status(&self, admin_status: AdminStatus) {
        let now = self.clock.now();
        let changed = self.admin.lock().await.set(admin_status, now);
        if let Some(old_status) = changed {
            info!(pool_id = %self.id, %old_status, new_status = %admin_status, "Pool admin status changed");
            self.events.publish(Event::PoolAdminStatusChanged(PoolAdminStatusChangedEvent {
                pool_id: self.id.clone(),
                old_status,
                new_status: admin_status,
                timestamp: now,
            }));
        }
    }

    async fn admits_requests(&self, ctx: &RequestContext) -> Result<bool, Interrupted> {
        Ok(ctx.guard(self.admin.lock()).await?.current().admits_requests())
    }

    async fn resolve(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
    ) -> Result<Resolved, Interrupted> {
        let resolved = match target {
            Some(ChargingTarget::Evse(evse_id)) => match self.station_for_evse(evse_id).await {
                Some(station) => Resolved::Station(station, Some(evse_id.clone())),
                None => Resolved::UnknownEvse,
            },
            Some(ChargingTarget::Station(station_id)) => match self.station(station_id).await {
                Some(station) => Resolved::Station(station, None),
                None => Resolved::UnknownStation,
            },
            None => {
                for station in self.stations().await {
                    if station.current_status(ctx).await? == StationStatus::Available {
                        return Ok(Resolved::Station(station, None));
                    }
                }
                Resolved::NothingAvailable
            }
        };
        Ok(resolved)
    }

    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        request: ReservationRequest,
    ) -> ReservationResult {
        match self.try_reserve(ctx, target, request).await {
            Ok(result) => result,
            Err(interrupted) => interrupted.into(),
        }
    }

    async fn try_reserve(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        request: ReservationRequest,
    ) -> Result<ReservationResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(ReservationResult::OutOfService);
        }
        let request = if target.is_none() {
            request.at_level(ReservationLevel::Pool)
        } else {
            request
        };
        let result = match self.resolve(ctx, target).await? {
            Resolved::Station(station, evse_id) => {
                station.reserve(ctx, evse_id.as_ref(), request).await
            }
            Resolved::UnknownEvse => ReservationResult::UnknownEvse,
            Resolved::UnknownStation => ReservationResult::UnknownStation,
            Resolved::NothingAvailable => ReservationResult::NoEvsesAvailable,
        };
        Ok(result)
    }

    pub async fn remote_start(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        request: RemoteStartRequest,
    ) -> RemoteStartPoolResult {
        match self.try_remote_start(ctx, target, request).await {
            Ok(result) => result,
            Err(interrupted) => interrupted.into(),
        }
    }

    async fn try_remote_start(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        request: RemoteStartRequest,
    ) -> Result<RemoteStartPoolResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(RemoteStartPoolResult::OutOfService);
        }
        // A named reservation pins the request to the station holding it.
        let resolved = match (target, &request.reservation_id) {
            (None, Some(reservation_id)) => {
                match self.station_with_reservation(ctx, reservation_id).await? {
                    Some(station) => Resolved::Station(station, None),
                    None => self.resolve(ctx, None).await?,
                }
            }
            _ => self.resolve(ctx, target).await?,
        };
        let result = match resolved {
            Resolved::Station(station, evse_id) => {
                station.remote_start(ctx, evse_id.as_ref(), request).await.into()
            }
            Resolved::UnknownEvse => RemoteStartPoolResult::UnknownEvse,
            Resolved::UnknownStation => RemoteStartPoolResult::UnknownStation,
            Resolved::NothingAvailable => RemoteStartPoolResult::NoEvsesAvailable,
        };
        Ok(result)
    }

    pub async fn remote_stop(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        request: RemoteStopRequest,
    ) -> RemoteStopPoolResult {
        match self.try_remote_stop(ctx, target, request).await {
            Ok(result) => result,
            Err(interrupted) => interrupted.into(),
        }
    }

    async fn try_remote_stop(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        request: RemoteStopRequest,
    ) -> Result<RemoteStopPoolResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(RemoteStopPoolResult::OutOfService);
        }
        let station = match target {
            None => {
                let mut holder = None;
                for station in self.stations().await {
                    if station.evse_with_session(ctx, &request.session_id).await?.is_some() {
                        holder = Some(station);
                        break;
                    }
                }
                match holder {
                    Some(station) => Resolved::Station(station, None),
                    None => {
                        debug!(pool_id = %self.id, session_id = %request.session_id, "No EVSE runs this session");
                        return Ok(RemoteStopPoolResult::InvalidSessionId);
                    }
                }
            }
            target => self.resolve(ctx, target).await?,
        };
        let result = match station {
            Resolved::Station(station, evse_id) => {
                station.remote_stop(ctx, evse_id.as_ref(), request).await.into()
            }
            Resolved::UnknownEvse => RemoteStopPoolResult::UnknownEvse,
            Resolved::UnknownStation => RemoteStopPoolResult::UnknownStation,
            Resolved::NothingAvailable => RemoteStopPoolResult::InvalidSessionId,
        };
        Ok(result)
    }

    async fn station_with_reservation(
        &self,
        ctx: &RequestContext,
        reservation_id: &ReservationId,
    ) -> Result<Option<Arc<ChargingStation>>, Interrupted> {
        for station in self.stations().await {
            if station.evse_with_reservation(ctx, reservation_id).await?.is_some() {
                return Ok(Some(station));
            }
        }
        Ok(None)
    }

    pub async fn cancel_reservation(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> CancelReservationResult {
        match self.try_cancel_reservation(ctx, target, reservation_id, reason).await {
            Ok(result) => result,
            Err(interrupted) => interrupted.into(),
        }
    }

    async fn try_cancel_reservation(
        &self,
        ctx: &RequestContext,
        target: Option<&ChargingTarget>,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> Result<CancelReservationResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(CancelReservationResult::OutOfService);
        }
        if let Some(target) = target {
            let result = match self.resolve(ctx, Some(target)).await? {
                Resolved::Station(station, evse_id) => {
                    station
                        .cancel_reservation(ctx, evse_id.as_ref(), reservation_id, reason)
                        .await
                }
                Resolved::UnknownEvse => CancelReservationResult::UnknownEvse,
                Resolved::UnknownStation => CancelReservationResult::UnknownStation,
                Resolved::NothingAvailable => CancelReservationResult::UnknownReservationId,
            };
            return Ok(result);
        }

        if let Some(station) = self.station_with_reservation(ctx, reservation_id).await? {
            return Ok(station.cancel_reservation(ctx, None, reservation_id, reason).await);
        }
        // Nobody holds the id. Out-of-service stations are passed over; the
        // first station that admits the request answers for the pool.
        for station in self.stations().await {
            match station.cancel_reservation(ctx, None, reservation_id, reason).await {
                CancelReservationResult::OutOfService
                | CancelReservationResult::UnknownReservationId => continue,
                other => return Ok(other),
            }
        }
        Ok(CancelReservationResult::UnknownReservationId)
    }
}

impl std::fmt::Debug for ChargingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargingPool").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::{Identification, ProviderId, SessionId};
    use crate::support::{CancelToken, ManualClock};
    use chrono::Utc;

    fn provider() -> ProviderId {
        ProviderId::new("DE-GDF").unwrap()
    }

    fn token() -> Identification {
        Identification::auth_token("AA11BB22").unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    /// Pool with stations S1 (E1) and S2 (E2, E3)
    async fn pool() -> ChargingPool {
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let events = create_event_bus(256);
        let pool = ChargingPool::new(
            PoolId::new("POOL").unwrap(),
            AdminStatus::Operational,
            clock.clone(),
            events.clone(),
        );
        for (station_id, evses) in [("S1", vec!["E1"]), ("S2", vec!["E2", "E3"])] {
            let station = Arc::new(ChargingStation::new(
                StationId::new(station_id).unwrap(),
                AdminStatus::Operational,
                clock.clone(),
                events.clone(),
                chrono::Duration::minutes(15),
            ));
            for evse in evses {
                station
                    .create_evse(EvseId::new(evse).unwrap(), AdminStatus::Operational)
                    .await
                    .unwrap();
            }
            pool.add_station(station).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn untargeted_reserve_walks_stations() {
        let pool = pool().await;
        let first = pool
            .reserve(&ctx(), None, ReservationRequest::new(provider(), token()))
            .await;
        let first = first.reservation().unwrap();
        assert_eq!(first.evse_id.as_str(), "E1");
        assert_eq!(first.level, ReservationLevel::Pool);

        let second = pool
            .reserve(&ctx(), None, ReservationRequest::new(provider(), token()))
            .await;
        assert_eq!(second.reservation().unwrap().evse_id.as_str(), "E2");
    }

    #[tokio::test]
    async fn targets_resolve_or_report_unknown() {
        let pool = pool().await;
        let evse_target = ChargingTarget::Evse(EvseId::new("E3").unwrap());
        let result = pool
            .reserve(&ctx(), Some(&evse_target), ReservationRequest::new(provider(), token()))
            .await;
        assert_eq!(result.reservation().unwrap().evse_id.as_str(), "E3");

        let missing_station = ChargingTarget::Station(StationId::new("S9").unwrap());
        assert_eq!(
            pool.remote_start(&ctx(), Some(&missing_station), RemoteStartRequest::new(provider(), token()))
                .await,
            RemoteStartPoolResult::UnknownStation
        );
        let missing_evse = ChargingTarget::Evse(EvseId::new("E9").unwrap());
        assert_eq!(
            pool.remote_start(&ctx(), Some(&missing_evse), RemoteStartRequest::new(provider(), token()))
                .await,
            RemoteStartPoolResult::UnknownEvse
        );
    }

    #[tokio::test]
    async fn session_round_trip_through_pool() {
        let pool = pool().await;
        let target = ChargingTarget::Station(StationId::new("S2").unwrap());
        let started = pool
            .remote_start(
                &ctx(),
                Some(&target),
                RemoteStartRequest::new(provider(), token()).with_session_id(SessionId::new("S").unwrap()),
            )
            .await;
        assert_eq!(started.session().unwrap().evse_id.as_str(), "E2");

        let stopped = pool
            .remote_stop(
                &ctx(),
                None,
                RemoteStopRequest::new(SessionId::new("S").unwrap(), provider(), token()),
            )
            .await;
        assert_eq!(stopped.stopped().unwrap().charge_detail_record.evse_id.as_str(), "E2");

        let again = pool
            .remote_stop(
                &ctx(),
                None,
                RemoteStopRequest::new(SessionId::new("S").unwrap(), provider(), token()),
            )
            .await;
        assert_eq!(again, RemoteStopPoolResult::InvalidSessionId);
    }

    #[tokio::test]
    async fn start_with_reservation_finds_its_station() {
        let pool = pool().await;
        let id = ReservationId::new("R").unwrap();
        let target = ChargingTarget::Evse(EvseId::new("E3").unwrap());
        pool.reserve(
            &ctx(),
            Some(&target),
            ReservationRequest::new(provider(), token()).with_id(id.clone()),
        )
        .await;

        let started = pool
            .remote_start(&ctx(), None, RemoteStartRequest::new(provider(), token()).with_reservation(id.clone()))
            .await;
        let session = started.session().unwrap();
        assert_eq!(session.evse_id.as_str(), "E3");
        assert_eq!(session.reservation_id(), Some(&id));
    }

    #[tokio::test]
    async fn cancel_locates_reservation_across_stations() {
        let pool = pool().await;
        let id = ReservationId::new("R").unwrap();
        let target = ChargingTarget::Evse(EvseId::new("E3").unwrap());
        pool.reserve(
            &ctx(),
            Some(&target),
            ReservationRequest::new(provider(), token()).with_id(id.clone()),
        )
        .await;

        assert_eq!(
            pool.cancel_reservation(&ctx(), None, &id, CancellationReason::Deleted).await,
            CancelReservationResult::Success(Some(id.clone()))
        );
    }

    #[tokio::test]
    async fn busy_evse_bounds_pool_calls() {
        let pool = pool().await;
        let station = pool.station(&StationId::new("S1").unwrap()).await.unwrap();
        let busy = station.evse(&EvseId::new("E1").unwrap()).await.unwrap();
        let release = busy.hold_state_lock().await;
        let short = RequestContext::new(std::time::Duration::from_millis(20));
        let bound = std::time::Duration::from_secs(1);

        let reserved = tokio::time::timeout(
            bound,
            pool.reserve(&short, None, ReservationRequest::new(provider(), token())),
        )
        .await
        .unwrap();
        assert_eq!(reserved, ReservationResult::Timeout);

        let stopped = tokio::time::timeout(
            bound,
            pool.remote_stop(
                &short,
                None,
                RemoteStopRequest::new(SessionId::new("S").unwrap(), provider(), token()),
            ),
        )
        .await
        .unwrap();
        assert_eq!(stopped, RemoteStopPoolResult::Timeout);

        let target = ChargingTarget::Evse(EvseId::new("E3").unwrap());
        let elsewhere = pool
            .reserve(&short, Some(&target), ReservationRequest::new(provider(), token()))
            .await;
        assert_eq!(elsewhere.reservation().unwrap().evse_id.as_str(), "E3");
        drop(release);
    }

    #[tokio::test]
    async fn cancelled_context_returns_canceled() {
        let pool = pool().await;
        let cancel = CancelToken::new();
        cancel.cancel();
        let cancelled = ctx().with_cancel(cancel);
        let id = ReservationId::new("R").unwrap();

        assert_eq!(
            pool.cancel_reservation(&cancelled, None, &id, CancellationReason::Deleted).await,
            CancelReservationResult::Canceled
        );
        assert_eq!(
            pool.remote_start(&cancelled, None, RemoteStartRequest::new(provider(), token()))
                .await,
            RemoteStartPoolResult::Canceled
        );
    }

    #[tokio::test]
    async fn untargeted_cancel_passes_over_blocked_station() {
        let pool = pool().await;
        let blocked = pool.station(&StationId::new("S1").unwrap()).await.unwrap();
        blocked.set_admin_status(AdminStatus::Blocked).await;

        let id = ReservationId::new("R").unwrap();
        assert_eq!(
            pool.cancel_reservation(&ctx(), None, &id, CancellationReason::Deleted).await,
            CancelReservationResult::Success(None)
        );

        let target = ChargingTarget::Evse(EvseId::new("E2").unwrap());
        pool.reserve(
            &ctx(),
            Some(&target),
            ReservationRequest::new(provider(), token()).with_id(id.clone()),
        )
        .await;
        assert_eq!(
            pool.cancel_reservation(&ctx(), None, &id, CancellationReason::Deleted).await,
            CancelReservationResult::Success(Some(id.clone()))
        );
    }

    #[tokio::test]
    async fn admin_status_gates_pool() {
        let pool = pool().await;
        let mut events = pool.events.subscribe();
        pool.set_admin_status(AdminStatus::Blocked).await;
        assert_eq!(
            pool.reserve(&ctx(), None, ReservationRequest::new(provider(), token())).await,
            ReservationResult::OutOfService
        );
        assert_eq!(
            events.try_recv().unwrap().event.event_type(),
            "pool_admin_status_changed"
        );
    }

    #[tokio::test]
    async fn duplicate_station_is_rejected() {
        let pool = pool().await;
        let station = pool.station(&StationId::new("S1").unwrap()).await.unwrap();
        assert!(pool.add_station(station).await.is_err());
        assert!(pool.remove_station(&StationId::new("S1").unwrap()).await.is_some());
        assert_eq!(pool.stations().await.len(), 1);
    }
}
