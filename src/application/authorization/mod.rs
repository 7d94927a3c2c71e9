//! Provider-side authorization and session registry

pub mod registry;

pub use registry::{AuthorizationRegistry, SharedAuthorizationRegistry};
