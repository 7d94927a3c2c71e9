//! Authorization aggregate

pub mod model;

pub use model::{SessionInfo, TokenAuthStatus};
