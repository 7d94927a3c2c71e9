//! Background task that cancels overdue reservations of one station
//!
//! Every tick tries to take a non-blocking guard. If the previous sweep still
//! holds it the tick is skipped, so slow sweeps never pile up. The sweep itself
//! runs on its own task, keeping the timer on cadence.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::station::ChargingStation;
use crate::domain::{EvseId, ReservationId, StationId};
use crate::support::{RequestContext, ShutdownSignal};

pub const DEFAULT_SWEEP_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_PER_EVSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Outcome of one pass over a station's EVSEs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub inspected: usize,
    pub expired: Vec<ReservationId>,
    /// EVSEs whose lock could not be taken within the per-EVSE timeout
    pub failed: Vec<EvseId>,
}

#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    station_id: StationId,
    station: Weak<ChargingStation>,
    period: Duration,
    per_evse_timeout: Duration,
    guard: Arc<Mutex<()>>,
}

impl ExpirySweeper {
    pub fn new(station: &Arc<ChargingStation>) -> Self {
        Self {
            station_id: station.id().clone(),
            station: Arc::downgrade(station),
            period: DEFAULT_SWEEP_PERIOD,
            per_evse_timeout: DEFAULT_PER_EVSE_TIMEOUT,
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_per_evse_timeout(mut self, timeout: Duration) -> Self {
        self.per_evse_timeout = timeout;
        self
    }

    /// Run a single sweep now. `None` when another sweep is in progress or
    /// the station no longer exists.
    pub async fn sweep_once(&self) -> Option<SweepReport> {
        let permit = self.guard.clone().try_lock_owned().ok()?;
        self.sweep(permit).await
    }

    async fn sweep(&self, _permit: OwnedMutexGuard<()>) -> Option<SweepReport> {
        let station = self.station.upgrade()?;
        let ctx = RequestContext::new(self.per_evse_timeout);
        let mut report = SweepReport::default();

        for evse in station.evses().await {
            report.inspected += 1;
            match evse.cancel_expired_reservation(&ctx).await {
                Ok(Some(reservation_id)) => {
                    info!(
                        station_id = %self.station_id,
                        evse_id = %evse.id(),
                        %reservation_id,
                        "📅 Reservation expired"
                    );
                    report.expired.push(reservation_id);
                }
                Ok(None) => {}
                Err(interrupted) => {
                    warn!(
                        station_id = %self.station_id,
                        evse_id = %evse.id(),
                        ?interrupted,
                        "Reservation expiry check failed"
                    );
                    report.failed.push(evse.id().clone());
                }
            }
        }

        if !report.expired.is_empty() {
            if let Err(interrupted) = station.refresh_status(&ctx).await {
                debug!(station_id = %self.station_id, ?interrupted, "Station status refresh deferred");
            }
        }
        Some(report)
    }

    /// Start the periodic task. It ends when `shutdown` fires, when the
    /// returned handle is stopped, or when the station is dropped.
    pub fn spawn(self, shutdown: ShutdownSignal) -> SweeperHandle {
        let stop = ShutdownSignal::new();
        let task_stop = stop.clone();
        let sweeper = Arc::new(self);

        let handle = tokio::spawn(async move {
            info!(
                station_id = %sweeper.station_id,
                period_ms = sweeper.period.as_millis() as u64,
                "📅 Reservation expiry sweeper started"
            );

            let mut interval = tokio::time::interval(sweeper.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if sweeper.station.strong_count() == 0 {
                            debug!(station_id = %sweeper.station_id, "Station dropped");
                            break;
                        }
                        match sweeper.guard.clone().try_lock_owned() {
                            Ok(permit) => {
                                let sweeper = sweeper.clone();
                                tokio::spawn(async move {
                                    sweeper.sweep(permit).await;
                                });
                            }
                            Err(_) => {
                                debug!(
                                    station_id = %sweeper.station_id,
                                    "Previous sweep still running, skipping tick"
                                );
                            }
                        }
                    }
                    _ = task_stop.wait() => break,
                    _ = shutdown.wait() => break,
                }
            }

            info!(station_id = %sweeper.station_id, "📅 Reservation expiry sweeper stopped");
        });

        SweeperHandle { stop, handle }
    }
}

/// Running sweeper task
#[derive(Debug)]
pub struct SweeperHandle {
    stop: ShutdownSignal,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        self.stop.trigger();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Expiry sweeper task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
