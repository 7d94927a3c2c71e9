pub mod cancel;
pub mod clock;
pub mod errors;
pub mod shutdown;

pub use cancel::{CancelToken, Interrupted, RequestContext};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use errors::{AppError, ConfigError, DomainError};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
