//! Application events (pub/sub)
//!
//! Event types are defined in `domain::events`. The `EventBus`
//! implementation (broadcast channel) and sink dispatch live here.

pub mod dispatch;
pub mod event_bus;

pub use dispatch::{spawn_notification_dispatcher, LoggingSink};
pub use event_bus::{create_event_bus, EventBus, EventSubscriber, SharedEventBus};
