//! Decoupled delivery of bus events to notification sinks
//!
//! Each sink gets its own subscriber and task. Delivery is at-least-once for
//! a sink that keeps up; a sink that lags behind the bus capacity loses the
//! oldest messages (logged as lag by the subscriber).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::event_bus::SharedEventBus;
use crate::domain::events::{Event, EventMessage};
use crate::domain::ports::NotificationSink;
use crate::support::ShutdownSignal;

/// Start a dispatcher that forwards every bus message to `sink`.
pub fn spawn_notification_dispatcher(
    bus: &SharedEventBus,
    sink: Arc<dyn NotificationSink>,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    let mut subscriber = bus.subscribe();
    tokio::spawn(async move {
        info!(sink = sink.name(), "🔔 Notification dispatcher started");
        loop {
            tokio::select! {
                message = subscriber.recv() => {
                    match message {
                        Some(message) => sink.deliver(&message).await,
                        None => {
                            warn!(sink = sink.name(), "Event bus closed");
                            break;
                        }
                    }
                }
                _ = shutdown.wait() => {
                    info!(sink = sink.name(), "🔔 Notification dispatcher shutting down");
                    break;
                }
            }
        }
    })
}

/// Sink that writes each event to the log.
#[derive(Debug, Default)]
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &EventMessage) {
        match &message.event {
            Event::ReservationCreated(e) => info!(
                evse_id = %e.reservation.evse_id,
                reservation_id = %e.reservation.id,
                expiry = %e.reservation.expiry_time,
                "📅 Reservation created"
            ),
            Event::ReservationCancelled(e) => info!(
                evse_id = %e.evse_id,
                reservation_id = %e.reservation.id,
                reason = %e.reason,
                "📅 Reservation cancelled"
            ),
            Event::SessionStarted(e) => info!(
                evse_id = %e.session.evse_id,
                session_id = %e.session.id,
                "⚡ Charging session started"
            ),
            Event::ChargeDetailRecordCreated(e) => info!(
                evse_id = %e.charge_detail_record.evse_id,
                session_id = %e.charge_detail_record.session_id,
                "🧾 Charge detail record created"
            ),
            other => info!(
                event_type = other.event_type(),
                id = %message.id,
                "Event"
            ),
        }
    }
}
