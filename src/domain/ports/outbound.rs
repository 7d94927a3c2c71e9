//! Outbound ports: collaborators the core notifies

use async_trait::async_trait;

use crate::domain::events::EventMessage;

/// Receiver of fire-and-forget notifications (billing feed, roaming push,
/// e-mail, …).
///
/// Sinks are driven by a dedicated dispatcher task per sink, never inline on
/// the publishing path, so a slow sink cannot stall reservations, sessions or
/// the expiry sweep.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, message: &EventMessage);
}
