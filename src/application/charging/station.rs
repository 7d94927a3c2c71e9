//! Charging station: admission, whitelists and EVSE selection
//!
//! A station owns its EVSE engines in insertion order. "First available" is
//! always the first EVSE in that order whose derived status is Available.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::evse::Evse;
use super::whitelist::{Whitelists, DEFAULT_WHITELIST};
use crate::application::events::SharedEventBus;
use crate::domain::events::{StationAdminStatusChangedEvent, StationStatusChangedEvent};
use crate::domain::reservation::ReservationLevel;
use crate::domain::status::Timestamped;
use crate::domain::{
    AdminStatus, CancelReservationResult, CancellationReason, DomainError, Event, EvseId,
    EvseStatus, RemoteStartRequest, RemoteStartStationResult, RemoteStopRequest,
    RemoteStopStationResult, ReservationId, ReservationRequest, ReservationResult, SessionId,
    StationId, StationStatus, StatusSchedule,
};
use crate::support::{Interrupted, RequestContext, SharedClock};

struct StationState {
    admin: StatusSchedule<AdminStatus>,
    status: StatusSchedule<StationStatus>,
}

pub struct ChargingStation {
    id: StationId,
    clock: SharedClock,
    events: SharedEventBus,
    default_duration: Duration,
    state: Mutex<StationState>,
    evses: RwLock<Vec<Arc<Evse>>>,
    whitelists: Whitelists,
}

impl ChargingStation {
    pub fn new(
        id: StationId,
        admin_status: AdminStatus,
        clock: SharedClock,
        events: SharedEventBus,
        default_duration: Duration,
    ) -> Self {
        let now = clock.now();
        Self {
            id,
            clock,
            events,
            default_duration,
            state: Mutex::new(StationState {
                admin: StatusSchedule::new(admin_status, now),
                status: StatusSchedule::new(StationStatus::aggregate(admin_status, &[]), now),
            }),
            evses: RwLock::new(Vec::new()),
            whitelists: Whitelists::new(false),
        }
    }

    pub fn id(&self) -> &StationId {
        &self.id
    }

    pub fn whitelists(&self) -> &Whitelists {
        &self.whitelists
    }

    /// Create an EVSE engine sharing this station's clock and event bus.
    pub async fn create_evse(
        &self,
        id: EvseId,
        admin_status: AdminStatus,
    ) -> Result<Arc<Evse>, DomainError> {
        let evse = Arc::new(Evse::new(
            id,
            admin_status,
            self.clock.clone(),
            self.events.clone(),
            self.default_duration,
        ));
        self.add_evse(evse.clone()).await?;
        Ok(evse)
    }

    pub async fn add_evse(&self, evse: Arc<Evse>) -> Result<(), DomainError> {
        {
            let mut evses = self.evses.write().await;
            if evses.iter().any(|e| e.id() == evse.id()) {
                return Err(DomainError::Conflict(format!(
                    "EVSE {} already exists at station {}",
                    evse.id(),
                    self.id
                )));
            }
            info!(station_id = %self.id, evse_id = %evse.id(), "EVSE added");
            evses.push(evse);
        }
        self.settle_status(&RequestContext::default()).await;
        Ok(())
    }

    pub async fn remove_evse(&self, id: &EvseId) -> Option<Arc<Evse>> {
        let removed = {
            let mut evses = self.evses.write().await;
            let index = evses.iter().position(|e| e.id() == id)?;
            evses.remove(index)
        };
        info!(station_id = %self.id, evse_id = %id, "EVSE removed");
        self.settle_status(&RequestContext::default()).await;
        Some(removed)
    }

    pub async fn evse(&self, id: &EvseId) -> Option<Arc<Evse>> {
        self.evses.read().await.iter().find(|e| e.id() == id).cloned()
    }

    pub async fn evses(&self) -> Vec<Arc<Evse>> {
        self.evses.read().await.clone()
    }

    pub async fn admin_status(&self) -> AdminStatus {
        self.state.lock().await.admin.current()
    }

    pub async fn status(&self) -> StationStatus {
        self.state.lock().await.status.current()
    }

    pub async fn current_status(&self, ctx: &RequestContext) -> Result<StationStatus, Interrupted> {
        Ok(ctx.guard(self.state.lock()).await?.status.current())
    }

    pub async fn status_history(&self) -> Vec<Timestamped<StationStatus>> {
        self.state.lock().await.status.history()
    }

    /// Set the station's admin status and push the same value to every EVSE.
    pub async fn set_admin_status(&self, admin_status: AdminStatus) {
        let now = self.clock.now();
        let changed = self.state.lock().await.admin.set(admin_status, now);
        if let Some(old_status) = changed {
            info!(station_id = %self.id, %old_status, new_status = %admin_status, "Station admin status changed");
            self.events
                .publish(Event::StationAdminStatusChanged(StationAdminStatusChangedEvent {
                    station_id: self.id.clone(),
                    old_status,
                    new_status: admin_status,
                    timestamp: now,
                }));
        }
        for evse in self.evses().await {
            evse.set_admin_status(admin_status).await;
        }
        self.settle_status(&RequestContext::default()).await;
    }

    /// Recompute the aggregate status from the EVSEs. Every EVSE read waits
    /// at most as long as `ctx` allows.
    pub async fn refresh_status(&self, ctx: &RequestContext) -> Result<StationStatus, Interrupted> {
        let mut statuses = Vec::new();
        for evse in self.evses().await {
            statuses.push(evse.current_status(ctx).await?);
        }
        let now = self.clock.now();
        let mut state = ctx.guard(self.state.lock()).await?;
        let new_status = StationStatus::aggregate(state.admin.current(), &statuses);
        if let Some(old_status) = state.status.set(new_status, now) {
            debug!(station_id = %self.id, %old_status, %new_status, "Station status changed");
            self.events.publish(Event::StationStatusChanged(StationStatusChangedEvent {
                station_id: self.id.clone(),
                old_status,
                new_status,
                timestamp: now,
            }));
        }
        Ok(new_status)
    }

    /// Refresh after a change has already happened; a busy EVSE only leaves
    /// the aggregate stale until the next refresh.
    async fn settle_status(&self, ctx: &RequestContext) {
        if let Err(interrupted) = self.refresh_status(ctx).await {
            debug!(station_id = %self.id, ?interrupted, "Station status refresh deferred");
        }
    }

    async fn admits_requests(&self, ctx: &RequestContext) -> Result<bool, Interrupted> {
        Ok(ctx.guard(self.state.lock()).await?.admin.current().admits_requests())
    }

    async fn first_available(&self, ctx: &RequestContext) -> Result<Option<Arc<Evse>>, Interrupted> {
        for evse in self.evses().await {
            if evse.current_status(ctx).await? == EvseStatus::Available {
                return Ok(Some(evse));
            }
        }
        Ok(None)
    }

    /// The EVSE currently holding `reservation_id`, if any.
    pub async fn evse_with_reservation(
        &self,
        ctx: &RequestContext,
        reservation_id: &ReservationId,
    ) -> Result<Option<Arc<Evse>>, Interrupted> {
        for evse in self.evses().await {
            if evse.holds_reservation(ctx, reservation_id).await? {
                return Ok(Some(evse));
            }
        }
        Ok(None)
    }

    /// The EVSE currently running `session_id`, if any.
    pub async fn evse_with_session(
        &self,
        ctx: &RequestContext,
        session_id: &SessionId,
    ) -> Result<Option<Arc<Evse>>, Interrupted> {
        for evse in self.evses().await {
            if evse.holds_session(ctx, session_id).await? {
                return Ok(Some(evse));
            }
        }
        Ok(None)
    }

    /// Reserve the targeted EVSE, or the first available one.
    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        request: ReservationRequest,
    ) -> ReservationResult {
        let result = match self.try_reserve(ctx, target, request).await {
            Ok(result) => result,
            Err(interrupted) => return interrupted.into(),
        };
        self.settle_status(ctx).await;
        result
    }

    async fn try_reserve(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        request: ReservationRequest,
    ) -> Result<ReservationResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(ReservationResult::OutOfService);
        }
        if !self.whitelists.admits(DEFAULT_WHITELIST, &request.identification) {
            debug!(station_id = %self.id, identification = %request.identification, "Not on whitelist");
            return Ok(ReservationResult::InvalidCredentials);
        }

        let (evse, level) = match target {
            Some(evse_id) => match self.evse(evse_id).await {
                Some(evse) => (evse, request.level),
                None => return Ok(ReservationResult::UnknownEvse),
            },
            None => match self.first_available(ctx).await? {
                // A pool-level request keeps its level when delegated here.
                Some(evse) if request.level == ReservationLevel::Pool => (evse, ReservationLevel::Pool),
                Some(evse) => (evse, ReservationLevel::Station),
                None => return Ok(ReservationResult::NoEvsesAvailable),
            },
        };

        Ok(evse.reserve(ctx, request.at_level(level)).await)
    }

    /// Start a session on the targeted EVSE. Without a target, the EVSE
    /// holding the named reservation is used, else the first available one.
    pub async fn remote_start(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        request: RemoteStartRequest,
    ) -> RemoteStartStationResult {
        let result = match self.try_remote_start(ctx, target, request).await {
            Ok(result) => result,
            Err(interrupted) => return interrupted.into(),
        };
        self.settle_status(ctx).await;
        result
    }

    async fn try_remote_start(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        request: RemoteStartRequest,
    ) -> Result<RemoteStartStationResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(RemoteStartStationResult::OutOfService);
        }
        if !self.whitelists.admits(DEFAULT_WHITELIST, &request.identification) {
            debug!(station_id = %self.id, identification = %request.identification, "Not on whitelist");
            return Ok(RemoteStartStationResult::InvalidCredentials);
        }

        let evse = match target {
            Some(evse_id) => match self.evse(evse_id).await {
                Some(evse) => evse,
                None => {
                    warn!(station_id = %self.id, %evse_id, "RemoteStart for unknown EVSE");
                    return Ok(RemoteStartStationResult::UnknownEvse);
                }
            },
            None => {
                let reserved = match &request.reservation_id {
                    Some(reservation_id) => self.evse_with_reservation(ctx, reservation_id).await?,
                    None => None,
                };
                match reserved {
                    Some(evse) => evse,
                    None => match self.first_available(ctx).await? {
                        Some(evse) => evse,
                        None => return Ok(RemoteStartStationResult::NoEvsesAvailable),
                    },
                }
            }
        };

        Ok(evse.remote_start(ctx, request).await.into())
    }

    /// Stop a session on the targeted EVSE, or wherever it is running.
    pub async fn remote_stop(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        request: RemoteStopRequest,
    ) -> RemoteStopStationResult {
        let result = match self.try_remote_stop(ctx, target, request).await {
            Ok(result) => result,
            Err(interrupted) => return interrupted.into(),
        };
        self.settle_status(ctx).await;
        result
    }

    async fn try_remote_stop(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        request: RemoteStopRequest,
    ) -> Result<RemoteStopStationResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(RemoteStopStationResult::OutOfService);
        }

        let evse = match target {
            Some(evse_id) => match self.evse(evse_id).await {
                Some(evse) => evse,
                None => return Ok(RemoteStopStationResult::UnknownEvse),
            },
            None => match self.evse_with_session(ctx, &request.session_id).await? {
                Some(evse) => evse,
                None => return Ok(RemoteStopStationResult::InvalidSessionId),
            },
        };

        Ok(evse.remote_stop(ctx, request).await.into())
    }

    /// Cancel a reservation on the targeted EVSE, on the EVSE holding it, or
    /// by asking each EVSE in turn until one recognises the id.
    pub async fn cancel_reservation(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> CancelReservationResult {
        let result = match self.try_cancel_reservation(ctx, target, reservation_id, reason).await {
            Ok(result) => result,
            Err(interrupted) => return interrupted.into(),
        };
        self.settle_status(ctx).await;
        result
    }

    async fn try_cancel_reservation(
        &self,
        ctx: &RequestContext,
        target: Option<&EvseId>,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> Result<CancelReservationResult, Interrupted> {
        if !self.admits_requests(ctx).await? {
            return Ok(CancelReservationResult::OutOfService);
        }

        let holder = match target {
            Some(evse_id) => match self.evse(evse_id).await {
                Some(evse) => Some(evse),
                None => return Ok(CancelReservationResult::UnknownEvse),
            },
            None => self.evse_with_reservation(ctx, reservation_id).await?,
        };

        let result = match holder {
            Some(evse) => evse.cancel_reservation(ctx, reservation_id, reason).await,
            None => {
                let mut result = CancelReservationResult::UnknownReservationId;
                for evse in self.evses().await {
                    result = evse.cancel_reservation(ctx, reservation_id, reason).await;
                    if result != CancelReservationResult::UnknownReservationId {
                        break;
                    }
                }
                result
            }
        };
        Ok(result)
    }
}

impl std::fmt::Debug for ChargingStation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargingStation")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
