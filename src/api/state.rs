//! Shared state for the access control middleware

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::infrastructure::access::AccessControl;

/// State handed to [`access_control_middleware`](crate::api::access_control_middleware)
#[derive(Debug, Clone)]
pub struct AccessState {
    pub access: Arc<AccessControl>,
    /// Reject requests without a usable credential; when off they pass
    /// through unauthenticated and unmetered
    pub require_auth: bool,
}

impl AccessState {
    pub fn new(access: Arc<AccessControl>, require_auth: bool) -> Self {
        Self {
            access,
            require_auth,
        }
    }

    pub fn from_config(access: Arc<AccessControl>, config: &AuthConfig) -> Self {
        Self::new(access, config.require_auth)
    }
}
