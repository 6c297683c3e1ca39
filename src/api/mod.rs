//! HTTP boundary
//!
//! An axum middleware that a host service layers onto its own router. No
//! routes or server live here.

pub mod middleware;
pub mod state;
pub mod types;

pub use middleware::{access_control_middleware, AuthenticatedKey};
pub use state::AccessState;
pub use types::AccessDenial;
