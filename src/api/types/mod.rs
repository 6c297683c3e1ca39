//! Boundary response types

pub mod error;

pub use error::{insert_rate_limit_headers, AccessDenial, AccessDenialBody};
