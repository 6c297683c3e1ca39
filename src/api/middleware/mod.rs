//! API middleware components

pub mod auth;

pub use auth::{access_control_middleware, extract_credential, AuthenticatedKey};
