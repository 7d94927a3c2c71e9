//! EVSE engine: the leaf of the charging hierarchy
//!
//! One exclusive lock guards the admin status, connectivity, reservation and
//! session of an EVSE. Every operation acquires it through the caller's
//! [`RequestContext`], so a request either waits its turn, times out or is
//! cancelled before touching anything. Once the lock is held the state change
//! is synchronous and therefore all-or-nothing.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::record_operation;
use crate::application::events::SharedEventBus;
use crate::domain::events::{
    ChargeDetailRecordEvent, EvseAdminStatusChangedEvent, EvseStatusChangedEvent,
    ReservationCancelledEvent, ReservationCreatedEvent, SessionStartedEvent,
};
use crate::domain::{
    AdminStatus, CancelReservationResult, CancellationReason, ChargingSession, Event, EvseId,
    EvseStatus, RemoteStartEvseResult, RemoteStartRequest, RemoteStopEvseResult,
    RemoteStopRequest, Reservation, ReservationId, ReservationRequest, ReservationResult,
    SessionId, SessionStopped, SessionTime, StatusSchedule,
};
use crate::domain::status::Timestamped;
use crate::support::{Interrupted, RequestContext, SharedClock};

struct EvseState {
    admin: StatusSchedule<AdminStatus>,
    status: StatusSchedule<EvseStatus>,
    online: bool,
    reservation: Option<Reservation>,
    session: Option<ChargingSession>,
}

impl EvseState {
    fn derived_status(&self) -> EvseStatus {
        EvseStatus::derive(
            self.admin.current(),
            self.online,
            self.reservation.is_some(),
            self.session.is_some(),
        )
    }
}

/// Point-in-time copy of an EVSE's state
#[derive(Debug, Clone, PartialEq)]
pub struct EvseSnapshot {
    pub id: EvseId,
    pub admin_status: AdminStatus,
    pub status: EvseStatus,
    pub online: bool,
    pub reservation: Option<Reservation>,
    pub session: Option<ChargingSession>,
}

pub struct Evse {
    id: EvseId,
    clock: SharedClock,
    events: SharedEventBus,
    default_duration: Duration,
    state: Mutex<EvseState>,
}

impl Evse {
    pub fn new(
        id: EvseId,
        admin_status: AdminStatus,
        clock: SharedClock,
        events: SharedEventBus,
        default_duration: Duration,
    ) -> Self {
        let now = clock.now();
        let initial = EvseStatus::derive(admin_status, true, false, false);
        Self {
            id,
            clock,
            events,
            default_duration,
            state: Mutex::new(EvseState {
                admin: StatusSchedule::new(admin_status, now),
                status: StatusSchedule::new(initial, now),
                online: true,
                reservation: None,
                session: None,
            }),
        }
    }

    pub fn id(&self) -> &EvseId {
        &self.id
    }

    /// Reserve this EVSE, or refresh the reservation it already holds when the
    /// request names the same reservation id.
    pub async fn reserve(&self, ctx: &RequestContext, request: ReservationRequest) -> ReservationResult {
        let result = match ctx.guard(self.state.lock()).await {
            Ok(mut state) => self.reserve_locked(&mut state, request),
            Err(interrupted) => interrupted.into(),
        };
        record_operation("reserve", result.as_str());
        result
    }

    fn reserve_locked(&self, state: &mut EvseState, request: ReservationRequest) -> ReservationResult {
        if !state.admin.current().admits_requests() {
            return ReservationResult::OutOfService;
        }
        let now = self.clock.now();

        if let Some(existing) = state.reservation.as_mut() {
            if request.reservation_id.as_ref() != Some(&existing.id) {
                return ReservationResult::AlreadyReserved;
            }
            if let Err(e) = existing.renew(now, request.duration.unwrap_or(self.default_duration)) {
                return ReservationResult::Error(e.to_string());
            }
            info!(
                evse_id = %self.id,
                reservation_id = %existing.id,
                expiry = %existing.expiry_time,
                remaining_secs = existing.remaining_at(now).num_seconds(),
                "Reservation renewed"
            );
            return ReservationResult::Success(existing.clone());
        }

        match state.derived_status() {
            EvseStatus::Available => {
                let reservation =
                    match request.into_reservation(self.id.clone(), now, self.default_duration) {
                        Ok(reservation) => reservation,
                        Err(e) => return ReservationResult::Error(e.to_string()),
                    };
                state.reservation = Some(reservation.clone());
                info!(
                    evse_id = %self.id,
                    reservation_id = %reservation.id,
                    expiry = %reservation.expiry_time,
                    "Reservation created"
                );
                self.events.publish(Event::ReservationCreated(ReservationCreatedEvent {
                    reservation: reservation.clone(),
                    timestamp: now,
                }));
                self.refresh_status(state, now);
                ReservationResult::Success(reservation)
            }
            EvseStatus::OutOfService => ReservationResult::OutOfService,
            EvseStatus::Offline => ReservationResult::Offline,
            EvseStatus::Charging => ReservationResult::AlreadyInUse,
            EvseStatus::Reserved => ReservationResult::AlreadyReserved,
            EvseStatus::Unspecified => {
                ReservationResult::Error(format!("EVSE {} has no usable status", self.id))
            }
        }
    }

    /// Drop the held reservation if its id matches. Idempotent when nothing is held.
    pub async fn cancel_reservation(
        &self,
        ctx: &RequestContext,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> CancelReservationResult {
        let result = match ctx.guard(self.state.lock()).await {
            Ok(mut state) => match state.reservation.as_ref().map(|r| r.id == *reservation_id) {
                None => CancelReservationResult::Success(None),
                Some(false) => CancelReservationResult::UnknownReservationId,
                Some(true) => {
                    let now = self.clock.now();
                    self.drop_reservation(&mut state, reason, now);
                    CancelReservationResult::Success(Some(reservation_id.clone()))
                }
            },
            Err(interrupted) => interrupted.into(),
        };
        record_operation("cancel_reservation", result.as_str());
        result
    }

    /// Cancel the held reservation with reason `Expired` if it has run out.
    ///
    /// The check and the cancellation happen under one lock acquisition, so a
    /// reservation renewed in between is never dropped.
    pub async fn cancel_expired_reservation(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<ReservationId>, Interrupted> {
        let mut state = ctx.guard(self.state.lock()).await?;
        let now = self.clock.now();
        let expired = state
            .reservation
            .as_ref()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.id.clone());
        if expired.is_some() {
            self.drop_reservation(&mut state, CancellationReason::Expired, now);
            metrics::counter!("evse_reservations_expired_total").increment(1);
        }
        Ok(expired)
    }

    fn drop_reservation(&self, state: &mut EvseState, reason: CancellationReason, now: DateTime<Utc>) {
        let Some(reservation) = state.reservation.take() else {
            return;
        };
        info!(
            evse_id = %self.id,
            reservation_id = %reservation.id,
            %reason,
            "Reservation cancelled"
        );
        self.events.publish(Event::ReservationCancelled(ReservationCancelledEvent {
            evse_id: self.id.clone(),
            reservation,
            reason,
            timestamp: now,
        }));
        self.refresh_status(state, now);
    }

    /// Start charging, consuming the held reservation when the request names it.
    pub async fn remote_start(
        &self,
        ctx: &RequestContext,
        request: RemoteStartRequest,
    ) -> RemoteStartEvseResult {
        let result = match ctx.guard(self.state.lock()).await {
            Ok(mut state) => self.remote_start_locked(&mut state, request),
            Err(interrupted) => interrupted.into(),
        };
        record_operation("remote_start", result.as_str());
        result
    }

    fn remote_start_locked(
        &self,
        state: &mut EvseState,
        request: RemoteStartRequest,
    ) -> RemoteStartEvseResult {
        if !state.admin.current().admits_requests() {
            return RemoteStartEvseResult::OutOfService;
        }
        let now = self.clock.now();

        let reservation = match state.derived_status() {
            EvseStatus::Available => None,
            EvseStatus::Reserved => {
                let matches = match (&state.reservation, &request.reservation_id) {
                    (Some(held), Some(requested)) => held.id == *requested,
                    _ => false,
                };
                if !matches {
                    return RemoteStartEvseResult::Reserved;
                }
                let held = state.reservation.take();
                if let Some(held) = held.as_ref().filter(|r| !r.permits(&request.identification)) {
                    warn!(
                        evse_id = %self.id,
                        reservation_id = %held.id,
                        identification = %request.identification,
                        "Reservation consumed by an identification outside its allowed set"
                    );
                }
                held
            }
            EvseStatus::Charging => return RemoteStartEvseResult::AlreadyInUse,
            EvseStatus::OutOfService => return RemoteStartEvseResult::OutOfService,
            EvseStatus::Offline => return RemoteStartEvseResult::Offline,
            EvseStatus::Unspecified => {
                return RemoteStartEvseResult::Error(format!(
                    "EVSE {} has no usable status",
                    self.id
                ))
            }
        };

        let session = ChargingSession {
            id: request.session_id.unwrap_or_else(SessionId::random),
            evse_id: self.id.clone(),
            provider_id: request.provider_id,
            identification: request.identification,
            charging_product: request.charging_product,
            reservation,
            session_time: SessionTime::starting_at(now),
        };
        state.session = Some(session.clone());
        info!(
            evse_id = %self.id,
            session_id = %session.id,
            reservation_id = ?session.reservation_id().map(|id| id.to_string()),
            "Charging session started"
        );
        self.events.publish(Event::SessionStarted(SessionStartedEvent {
            session: session.clone(),
            timestamp: now,
        }));
        self.refresh_status(state, now);
        RemoteStartEvseResult::Success(session)
    }

    /// Stop the session with the given id and emit its charge detail record.
    pub async fn remote_stop(
        &self,
        ctx: &RequestContext,
        request: RemoteStopRequest,
    ) -> RemoteStopEvseResult {
        let result = match ctx.guard(self.state.lock()).await {
            Ok(mut state) => self.remote_stop_locked(&mut state, request),
            Err(interrupted) => interrupted.into(),
        };
        record_operation("remote_stop", result.as_str());
        result
    }

    fn remote_stop_locked(
        &self,
        state: &mut EvseState,
        request: RemoteStopRequest,
    ) -> RemoteStopEvseResult {
        if !state.admin.current().admits_requests() {
            return RemoteStopEvseResult::OutOfService;
        }

        match state.derived_status() {
            EvseStatus::Available | EvseStatus::Reserved => RemoteStopEvseResult::InvalidSessionId,
            EvseStatus::Charging => {
                let matches = state
                    .session
                    .as_ref()
                    .is_some_and(|s| s.id == request.session_id);
                let session = match state.session.take() {
                    Some(session) if matches => session,
                    other => {
                        state.session = other;
                        return RemoteStopEvseResult::InvalidSessionId;
                    }
                };
                let now = self.clock.now();
                let charge_detail_record = session.into_charge_detail_record(now);
                let reservation_id = charge_detail_record.reservation_id.clone();
                // A reservation can only be held alongside a session it spawned.
                if state
                    .reservation
                    .as_ref()
                    .is_some_and(|r| Some(&r.id) == reservation_id.as_ref())
                {
                    state.reservation = None;
                }
                info!(
                    evse_id = %self.id,
                    session_id = %charge_detail_record.session_id,
                    "Charging session stopped"
                );
                self.events.publish(Event::ChargeDetailRecordCreated(ChargeDetailRecordEvent {
                    charge_detail_record: charge_detail_record.clone(),
                    timestamp: now,
                }));
                self.refresh_status(state, now);
                RemoteStopEvseResult::Success(SessionStopped {
                    charge_detail_record,
                    reservation_id,
                    reservation_handling: request.reservation_handling,
                })
            }
            EvseStatus::OutOfService => RemoteStopEvseResult::OutOfService,
            EvseStatus::Offline => RemoteStopEvseResult::Offline,
            EvseStatus::Unspecified => {
                RemoteStopEvseResult::Error(format!("EVSE {} has no usable status", self.id))
            }
        }
    }

    /// Change the administrative status. Held reservations and sessions are kept.
    pub async fn set_admin_status(&self, admin_status: AdminStatus) {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        if let Some(old_status) = state.admin.set(admin_status, now) {
            info!(evse_id = %self.id, %old_status, new_status = %admin_status, "EVSE admin status changed");
            self.events.publish(Event::EvseAdminStatusChanged(EvseAdminStatusChangedEvent {
                evse_id: self.id.clone(),
                old_status,
                new_status: admin_status,
                timestamp: now,
            }));
            self.refresh_status(&mut state, now);
        }
    }

    /// Record whether the EVSE is reachable.
    pub async fn set_online(&self, online: bool) {
        let mut state = self.state.lock().await;
        if state.online != online {
            state.online = online;
            let now = self.clock.now();
            debug!(evse_id = %self.id, online, "EVSE connectivity changed");
            self.refresh_status(&mut state, now);
        }
    }

    fn refresh_status(&self, state: &mut EvseState, now: DateTime<Utc>) {
        let new_status = state.derived_status();
        if let Some(old_status) = state.status.set(new_status, now) {
            self.events.publish(Event::EvseStatusChanged(EvseStatusChangedEvent {
                evse_id: self.id.clone(),
                old_status,
                new_status,
                timestamp: now,
            }));
        }
    }

    pub async fn status(&self) -> EvseStatus {
        self.state.lock().await.derived_status()
    }

    pub async fn admin_status(&self) -> AdminStatus {
        self.state.lock().await.admin.current()
    }

    pub async fn reservation(&self) -> Option<Reservation> {
        self.state.lock().await.reservation.clone()
    }

    pub async fn session(&self) -> Option<ChargingSession> {
        self.state.lock().await.session.clone()
    }

    /// Derived status changes, oldest first.
    pub async fn status_history(&self) -> Vec<Timestamped<EvseStatus>> {
        self.state.lock().await.status.history()
    }

    /// Read the state on behalf of a request, bounded by its context.
    async fn inspect<T>(
        &self,
        ctx: &RequestContext,
        read: impl FnOnce(&EvseState) -> T,
    ) -> Result<T, Interrupted> {
        let state = ctx.guard(self.state.lock()).await?;
        Ok(read(&state))
    }

    pub async fn current_status(&self, ctx: &RequestContext) -> Result<EvseStatus, Interrupted> {
        self.inspect(ctx, EvseState::derived_status).await
    }

    pub async fn holds_reservation(
        &self,
        ctx: &RequestContext,
        reservation_id: &ReservationId,
    ) -> Result<bool, Interrupted> {
        self.inspect(ctx, |state| {
            state.reservation.as_ref().is_some_and(|r| r.id == *reservation_id)
        })
        .await
    }

    pub async fn holds_session(
        &self,
        ctx: &RequestContext,
        session_id: &SessionId,
    ) -> Result<bool, Interrupted> {
        self.inspect(ctx, |state| {
            state.session.as_ref().is_some_and(|s| s.id == *session_id)
        })
        .await
    }

    pub async fn snapshot(&self) -> EvseSnapshot {
        let state = self.state.lock().await;
        EvseSnapshot {
            id: self.id.clone(),
            admin_status: state.admin.current(),
            status: state.derived_status(),
            online: state.online,
            reservation: state.reservation.clone(),
            session: state.session.clone(),
        }
    }
}

#[cfg(test)]
impl Evse {
    /// Keep the state lock busy until the returned sender is dropped.
    pub(crate) async fn hold_state_lock(self: &std::sync::Arc<Self>) -> tokio::sync::oneshot::Sender<()> {
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let (locked, is_locked) = tokio::sync::oneshot::channel();
        let evse = self.clone();
        tokio::spawn(async move {
            let _state = evse.state.lock().await;
            let _ = locked.send(());
            let _ = released.await;
        });
        let _ = is_locked.await;
        release
    }
}

impl std::fmt::Debug for Evse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evse").field("id", &self.id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::create_event_bus;
    use crate::domain::{Identification, ProviderId, ReservationHandling};
    use crate::support::{CancelToken, Clock, ManualClock};
    use std::sync::Arc;

    struct Fixture {
        evse: Evse,
        clock: Arc<ManualClock>,
        events: SharedEventBus,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let events = create_event_bus(64);
        let evse = Evse::new(
            EvseId::new("DE*GEF*E1").unwrap(),
            AdminStatus::Operational,
            clock.clone(),
            events.clone(),
            Duration::minutes(15),
        );
        Fixture { evse, clock, events }
    }

    fn provider() -> ProviderId {
        ProviderId::new("DE-GDF").unwrap()
    }

    fn token() -> Identification {
        Identification::auth_token("AA11BB22").unwrap()
    }

    fn reserve_request(id: &str, minutes: i64) -> ReservationRequest {
        ReservationRequest::new(provider(), token())
            .with_id(ReservationId::new(id).unwrap())
            .with_duration(Duration::minutes(minutes))
    }

    fn ctx() -> RequestContext {
        RequestContext::default()
    }

    #[tokio::test]
    async fn reserve_start_stop_lifecycle() {
        let f = fixture();
        let mut events = f.events.subscribe();

        let reserved = f.evse.reserve(&ctx(), reserve_request("A", 10)).await;
        let reservation = reserved.reservation().cloned().expect("reservation");
        assert_eq!(reservation.id.as_str(), "A");
        assert_eq!(f.evse.status().await, EvseStatus::Reserved);

        let started = f
            .evse
            .remote_start(
                &ctx(),
                RemoteStartRequest::new(provider(), token())
                    .with_reservation(ReservationId::new("A").unwrap())
                    .with_session_id(SessionId::new("S").unwrap()),
            )
            .await;
        let session = started.session().cloned().expect("session");
        assert_eq!(session.id.as_str(), "S");
        assert_eq!(session.reservation_id(), Some(&reservation.id));
        assert_eq!(f.evse.status().await, EvseStatus::Charging);
        assert!(f.evse.reservation().await.is_none());

        f.clock.advance(Duration::minutes(20));
        let stopped = f
            .evse
            .remote_stop(
                &ctx(),
                RemoteStopRequest::new(SessionId::new("S").unwrap(), provider(), token()),
            )
            .await;
        let stopped = stopped.stopped().cloned().expect("stopped");
        assert_eq!(stopped.charge_detail_record.session_id.as_str(), "S");
        assert_eq!(stopped.reservation_id, Some(reservation.id.clone()));
        assert_eq!(stopped.reservation_handling, ReservationHandling::Close);
        assert_eq!(f.evse.status().await, EvseStatus::Available);
        assert!(f.evse.session().await.is_none());
        assert!(f.evse.reservation().await.is_none());

        let mut kinds = Vec::new();
        while let Some(message) = events.try_recv() {
            kinds.push(message.event.event_type());
        }
        assert!(kinds.contains(&"reservation_created"));
        assert!(kinds.contains(&"session_started"));
        assert!(kinds.contains(&"charge_detail_record_created"));
    }

    #[tokio::test]
    async fn renewing_keeps_start_time() {
        let f = fixture();
        let first = f.evse.reserve(&ctx(), reserve_request("X", 10)).await;
        let first = first.reservation().cloned().unwrap();

        f.clock.advance(Duration::minutes(5));
        let second = f.evse.reserve(&ctx(), reserve_request("X", 30)).await;
        let second = second.reservation().cloned().unwrap();

        assert_eq!(second.start_time, first.start_time);
        assert_eq!(second.duration, Duration::minutes(30));
        assert_eq!(second.expiry_time, f.clock.now() + Duration::minutes(30));

        let other = f.evse.reserve(&ctx(), reserve_request("Y", 10)).await;
        assert_eq!(other, ReservationResult::AlreadyReserved);
    }

    #[tokio::test]
    async fn default_duration_applies() {
        let f = fixture();
        let result = f
            .evse
            .reserve(&ctx(), ReservationRequest::new(provider(), token()))
            .await;
        let reservation = result.reservation().unwrap();
        assert_eq!(reservation.expiry_time - reservation.start_time, Duration::minutes(15));
    }

    #[tokio::test]
    async fn unusable_durations_are_rejected_without_mutation() {
        let f = fixture();
        let huge = ReservationRequest::new(provider(), token())
            .with_duration(Duration::days(100_000_000));
        assert!(matches!(f.evse.reserve(&ctx(), huge).await, ReservationResult::Error(_)));
        assert!(matches!(
            f.evse.reserve(&ctx(), reserve_request("A", -5)).await,
            ReservationResult::Error(_)
        ));
        assert_eq!(f.evse.status().await, EvseStatus::Available);

        let held = f.evse.reserve(&ctx(), reserve_request("A", 10)).await;
        let held = held.reservation().cloned().unwrap();
        assert!(matches!(
            f.evse.reserve(&ctx(), reserve_request("A", 0)).await,
            ReservationResult::Error(_)
        ));
        assert_eq!(f.evse.reservation().await, Some(held));
    }

    #[tokio::test]
    async fn admin_status_gates_every_operation() {
        let f = fixture();
        f.evse.set_admin_status(AdminStatus::OutOfService).await;
        assert_eq!(f.evse.status().await, EvseStatus::OutOfService);

        assert_eq!(
            f.evse.reserve(&ctx(), reserve_request("A", 10)).await,
            ReservationResult::OutOfService
        );
        assert_eq!(
            f.evse
                .remote_start(&ctx(), RemoteStartRequest::new(provider(), token()))
                .await,
            RemoteStartEvseResult::OutOfService
        );
        assert_eq!(
            f.evse
                .remote_stop(
                    &ctx(),
                    RemoteStopRequest::new(SessionId::new("S").unwrap(), provider(), token())
                )
                .await,
            RemoteStopEvseResult::OutOfService
        );
    }

    #[tokio::test]
    async fn internal_use_is_admitted() {
        let f = fixture();
        f.evse.set_admin_status(AdminStatus::InternalUse).await;
        assert!(f.evse.reserve(&ctx(), reserve_request("A", 10)).await.is_success());
    }

    #[tokio::test]
    async fn reserved_evse_rejects_foreign_start() {
        let f = fixture();
        f.evse.reserve(&ctx(), reserve_request("A", 10)).await;
        let result = f
            .evse
            .remote_start(
                &ctx(),
                RemoteStartRequest::new(provider(), token())
                    .with_reservation(ReservationId::new("B").unwrap()),
            )
            .await;
        assert_eq!(result, RemoteStartEvseResult::Reserved);
        assert_eq!(f.evse.status().await, EvseStatus::Reserved);
    }

    #[tokio::test]
    async fn charging_evse_conflicts() {
        let f = fixture();
        let started = f
            .evse
            .remote_start(&ctx(), RemoteStartRequest::new(provider(), token()))
            .await;
        assert!(started.session().unwrap().reservation.is_none());

        assert_eq!(
            f.evse.reserve(&ctx(), reserve_request("A", 10)).await,
            ReservationResult::AlreadyInUse
        );
        assert_eq!(
            f.evse
                .remote_start(&ctx(), RemoteStartRequest::new(provider(), token()))
                .await,
            RemoteStartEvseResult::AlreadyInUse
        );
        assert_eq!(
            f.evse
                .remote_stop(
                    &ctx(),
                    RemoteStopRequest::new(SessionId::new("other").unwrap(), provider(), token())
                )
                .await,
            RemoteStopEvseResult::InvalidSessionId
        );
        assert_eq!(f.evse.status().await, EvseStatus::Charging);
    }

    #[tokio::test]
    async fn stop_without_session_is_invalid() {
        let f = fixture();
        let result = f
            .evse
            .remote_stop(
                &ctx(),
                RemoteStopRequest::new(SessionId::new("S").unwrap(), provider(), token()),
            )
            .await;
        assert_eq!(result, RemoteStopEvseResult::InvalidSessionId);
    }

    #[tokio::test]
    async fn offline_evse_reports_offline() {
        let f = fixture();
        f.evse.set_online(false).await;
        assert_eq!(
            f.evse.reserve(&ctx(), reserve_request("A", 10)).await,
            ReservationResult::Offline
        );
        assert_eq!(
            f.evse
                .remote_start(&ctx(), RemoteStartRequest::new(provider(), token()))
                .await,
            RemoteStartEvseResult::Offline
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_checks_id() {
        let f = fixture();
        let id = ReservationId::new("A").unwrap();
        assert_eq!(
            f.evse.cancel_reservation(&ctx(), &id, CancellationReason::Deleted).await,
            CancelReservationResult::Success(None)
        );

        f.evse.reserve(&ctx(), reserve_request("A", 10)).await;
        assert_eq!(
            f.evse
                .cancel_reservation(&ctx(), &ReservationId::new("B").unwrap(), CancellationReason::Deleted)
                .await,
            CancelReservationResult::UnknownReservationId
        );

        let mut events = f.events.subscribe();
        assert_eq!(
            f.evse.cancel_reservation(&ctx(), &id, CancellationReason::Deleted).await,
            CancelReservationResult::Success(Some(id.clone()))
        );
        assert_eq!(f.evse.status().await, EvseStatus::Available);

        let cancelled = events.try_recv().expect("cancel event");
        match cancelled.event {
            Event::ReservationCancelled(e) => assert_eq!(e.reason, CancellationReason::Deleted),
            other => panic!("unexpected event {:?}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn expired_reservation_is_cancelled_once() {
        let f = fixture();
        f.evse.reserve(&ctx(), reserve_request("A", 10)).await;

        assert_eq!(f.evse.cancel_expired_reservation(&ctx()).await, Ok(None));
        f.clock.advance(Duration::minutes(11));
        assert_eq!(
            f.evse.cancel_expired_reservation(&ctx()).await,
            Ok(Some(ReservationId::new("A").unwrap()))
        );
        assert_eq!(f.evse.cancel_expired_reservation(&ctx()).await, Ok(None));
        assert_eq!(f.evse.status().await, EvseStatus::Available);
    }

    #[tokio::test]
    async fn cancelled_request_leaves_state_untouched() {
        let f = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = RequestContext::default().with_cancel(cancel);

        assert_eq!(
            f.evse.reserve(&ctx, reserve_request("A", 10)).await,
            ReservationResult::Canceled
        );
        assert!(f.evse.reservation().await.is_none());
        assert_eq!(f.evse.status().await, EvseStatus::Available);
    }

    #[tokio::test]
    async fn busy_lock_times_out() {
        let f = fixture();
        let _held = f.evse.state.lock().await;
        let ctx = RequestContext::new(std::time::Duration::from_millis(20));
        assert_eq!(
            f.evse.reserve(&ctx, reserve_request("A", 10)).await,
            ReservationResult::Timeout
        );
    }

    #[tokio::test]
    async fn lookups_respect_request_context() {
        let f = fixture();
        let evse = Arc::new(f.evse);
        evse.reserve(&ctx(), reserve_request("A", 10)).await;
        let id = ReservationId::new("A").unwrap();
        assert_eq!(evse.holds_reservation(&ctx(), &id).await, Ok(true));
        assert_eq!(evse.current_status(&ctx()).await, Ok(EvseStatus::Reserved));

        let release = evse.hold_state_lock().await;
        let short = RequestContext::new(std::time::Duration::from_millis(20));
        assert_eq!(evse.current_status(&short).await, Err(Interrupted::Timeout));
        let cancel = CancelToken::new();
        cancel.cancel();
        let cancelled = ctx().with_cancel(cancel);
        assert_eq!(
            evse.holds_session(&cancelled, &SessionId::new("S").unwrap()).await,
            Err(Interrupted::Canceled)
        );
        drop(release);
        assert_eq!(evse.holds_reservation(&short, &id).await, Ok(true));
    }

    #[tokio::test]
    async fn concurrent_reserves_admit_exactly_one() {
        let f = Arc::new(fixture());
        let mut handles = Vec::new();
        for i in 0..8 {
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                f.evse.reserve(&ctx(), reserve_request(&format!("R{}", i), 10)).await
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_success() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn status_history_tracks_transitions() {
        let f = fixture();
        f.evse.reserve(&ctx(), reserve_request("A", 10)).await;
        f.evse
            .cancel_reservation(&ctx(), &ReservationId::new("A").unwrap(), CancellationReason::Deleted)
            .await;
        let history: Vec<_> = f.evse.status_history().await.into_iter().map(|e| e.value).collect();
        assert_eq!(
            history,
            vec![EvseStatus::Available, EvseStatus::Reserved, EvseStatus::Available]
        );
    }
}
