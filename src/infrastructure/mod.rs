//! Infrastructure layer - storage backends and the services built on them

pub mod access;
pub mod api_key;
pub mod logging;
pub mod quota;
pub mod storage;
pub mod usage;
