//! Access denial responses

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::AdmitResult;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Why a request was turned away at the boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenial {
    #[error("API key required")]
    AuthRequired,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("Rate limit exceeded")]
    RateLimited {
        limit: u32,
        reset_in: u64,
        reset_epoch: u64,
    },
}

/// JSON body of a denial
#[derive(Debug, Clone, Serialize)]
pub struct AccessDenialBody {
    pub error: String,
    pub error_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_in: Option<u64>,
}

impl AccessDenial {
    /// Denial for a rejected admission
    pub fn rate_limited(result: &AdmitResult) -> Self {
        Self::RateLimited {
            limit: result.limit,
            reset_in: result.reset_in_seconds,
            reset_epoch: result.reset_epoch_seconds,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthRequired | Self::InvalidKey => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::InvalidKey => "INVALID_KEY",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
        }
    }

    pub fn body(&self) -> AccessDenialBody {
        let (limit, reset_in) = match self {
            Self::RateLimited {
                limit, reset_in, ..
            } => (Some(*limit), Some(*reset_in)),
            _ => (None, None),
        };

        AccessDenialBody {
            error: self.to_string(),
            error_code: self.error_code(),
            limit,
            reset_in,
        }
    }
}

impl IntoResponse for AccessDenial {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();

        if let Self::RateLimited {
            limit,
            reset_in,
            reset_epoch,
        } = self
        {
            let headers = response.headers_mut();
            insert_rate_limit_headers(headers, limit, 0, reset_epoch);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_in));
        }

        response
    }
}

/// Attach the `X-RateLimit-*` headers
pub fn insert_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_epoch: u64) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_epoch));
}
