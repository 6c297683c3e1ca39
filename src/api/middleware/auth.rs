//! API key authentication, quota and usage middleware

use std::time::Instant;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::api::state::AccessState;
use crate::api::types::{insert_rate_limit_headers, AccessDenial};
use crate::domain::api_key::ApiKey;
use crate::domain::Metadata;

/// The key that authenticated the current request
///
/// Inserted into request extensions by [`access_control_middleware`].
#[derive(Debug, Clone)]
pub struct AuthenticatedKey(pub ApiKey);

impl<S> FromRequestParts<S> for AuthenticatedKey
where
    S: Send + Sync,
{
    type Rejection = AccessDenial;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedKey>()
            .cloned()
            .ok_or(AccessDenial::AuthRequired)
    }
}

/// Authenticate, admit and meter one request
///
/// The credential comes from `Authorization: Bearer <key>` or, failing
/// that, `X-API-Key: <key>`. Admitted responses carry the `X-RateLimit-*`
/// headers and are recorded in the usage ledger once the handler returns.
pub async fn access_control_middleware(
    State(state): State<AccessState>,
    mut request: Request,
    next: Next,
) -> Response {
    let credential = extract_credential(request.headers());

    let key = match credential {
        Some(credential) => state.access.authenticate(&credential).await,
        None if state.require_auth => {
            debug!(path = %request.uri().path(), "Request without API key");
            return AccessDenial::AuthRequired.into_response();
        }
        None => return next.run(request).await,
    };

    let Some(key) = key else {
        if state.require_auth {
            warn!(
                path = %request.uri().path(),
                key_prefix = %credential_prefix(request.headers()),
                "Rejected invalid API key"
            );
            return AccessDenial::InvalidKey.into_response();
        }

        debug!(path = %request.uri().path(), "Ignoring invalid API key; auth is optional");
        return next.run(request).await;
    };

    let admission = state.access.admit_key(&key);
    if !admission.allowed {
        return AccessDenial::rate_limited(&admission).into_response();
    }

    let key_id = key.id().to_string();
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();
    request.extensions_mut().insert(AuthenticatedKey(key));

    let started = Instant::now();
    let mut response = next.run(request).await;
    let duration = started.elapsed().as_secs_f64();

    let status = response.status();
    let mut metadata = Metadata::new();
    metadata.insert("method".to_string(), json!(method));
    metadata.insert("status".to_string(), json!(status.as_u16()));

    state
        .access
        .record(
            &key_id,
            &endpoint,
            duration,
            status.is_success() || status.is_redirection(),
            metadata,
        )
        .await;

    insert_rate_limit_headers(
        response.headers_mut(),
        admission.limit,
        admission.remaining,
        admission.reset_epoch_seconds,
    );

    response
}

/// Pull the presented credential out of the request headers
///
/// `Authorization: Bearer` is checked first and `X-API-Key` only when no
/// usable Bearer token is present, so a client sending both is identified by
/// the Bearer token. Blank or non-UTF-8 values count as absent.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let credential = bearer.or_else(|| {
        headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    })?;

    Some(credential.to_string())
}

fn credential_prefix(headers: &HeaderMap) -> String {
    extract_credential(headers)
        .map(|c| c.chars().take(8).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use crate::api::types::error::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
    use crate::config::AuthConfig;
    use crate::domain::api_key::ApiKeySnapshot;
    use crate::domain::usage::UsageSnapshot;
    use crate::infrastructure::access::AccessControl;
    use crate::infrastructure::api_key::ApiKeyService;
    use crate::infrastructure::quota::QuotaCounter;
    use crate::infrastructure::storage::InMemorySnapshotStore;
    use crate::infrastructure::usage::{LedgerConfig, UsageLedger};

    fn create_access() -> Arc<AccessControl> {
        Arc::new(AccessControl::new(
            Arc::new(ApiKeyService::new(Arc::new(
                InMemorySnapshotStore::<ApiKeySnapshot>::new(),
            ))),
            Arc::new(QuotaCounter::new()),
            Arc::new(UsageLedger::new(
                Arc::new(InMemorySnapshotStore::<UsageSnapshot>::new()),
                LedgerConfig::default(),
            )),
        ))
    }

    fn create_app(access: Arc<AccessControl>, require_auth: bool) -> Router {
        let state = AccessState::from_config(access, &AuthConfig { require_auth });

        Router::new()
            .route(
                "/api/prompt",
                get(|AuthenticatedKey(key): AuthenticatedKey| async move {
                    key.name().to_string()
                }),
            )
            .route("/api/fail", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route("/api/open", get(|| async { "open" }))
            .layer(middleware::from_fn_with_state(state, access_control_middleware))
    }

    fn get_request(path: &str, api_key: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let app = create_app(create_access(), true);

        let response = app.oneshot(get_request("/api/prompt", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "AUTH_REQUIRED");
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let app = create_app(create_access(), true);

        let response = app
            .oneshot(get_request("/api/prompt", Some("pmp_bogus")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "INVALID_KEY");
        assert_eq!(body["error"], "Invalid API key");
    }

    #[tokio::test]
    async fn test_valid_key_reaches_handler() {
        let access = create_access();
        let issued = access.keys().issue("ci", 2, Metadata::new()).await.unwrap();
        let app = create_app(access.clone(), true);

        let response = app
            .oneshot(get_request("/api/prompt", Some(&issued.secret)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_RATELIMIT_LIMIT], "2");
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "1");
        assert!(response.headers().contains_key(&X_RATELIMIT_RESET));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ci");
    }

    #[tokio::test]
    async fn test_bearer_token_accepted() {
        let access = create_access();
        let issued = access.keys().issue("ci", 2, Metadata::new()).await.unwrap();
        let app = create_app(access, true);

        let request = axum::http::Request::builder()
            .uri("/api/prompt")
            .header(header::AUTHORIZATION, format!("Bearer {}", issued.secret))
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_quota_exhaustion() {
        let access = create_access();
        let issued = access.keys().issue("ci", 2, Metadata::new()).await.unwrap();
        let app = create_app(access.clone(), true);

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(get_request("/api/prompt", Some(&issued.secret)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(get_request("/api/prompt", Some(&issued.secret)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "0");
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let body = json_body(response).await;
        assert_eq!(body["error_code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(body["limit"], 2);
        assert!(body["reset_in"].as_u64().unwrap() <= 3600);

        // Rejected requests are neither counted nor recorded
        let key_id = issued.api_key.id().as_str();
        assert_eq!(access.quota().usage_in_last(key_id, 1), 2);
        assert_eq!(access.usage().stats(key_id, 1).await.total_requests, 2);
    }

    #[tokio::test]
    async fn test_usage_is_recorded() {
        let access = create_access();
        let issued = access.keys().issue("ci", 10, Metadata::new()).await.unwrap();
        let app = create_app(access.clone(), true);

        app.clone()
            .oneshot(get_request("/api/prompt", Some(&issued.secret)))
            .await
            .unwrap();
        let response = app
            .oneshot(get_request("/api/fail", Some(&issued.secret)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let key_id = issued.api_key.id().as_str();
        let stats = access.usage().stats(key_id, 1).await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.successful_requests, 1);
        assert_eq!(stats.failed_requests, 1);

        let latest = access.usage().records_for(key_id, 1).await;
        assert_eq!(latest[0].endpoint, "/api/fail");
        assert_eq!(latest[0].metadata["method"], "GET");
        assert_eq!(latest[0].metadata["status"], 500);
    }

    #[tokio::test]
    async fn test_optional_auth_passes_through() {
        let access = create_access();
        let app = create_app(access.clone(), false);

        let response = app
            .clone()
            .oneshot(get_request("/api/open", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(&X_RATELIMIT_LIMIT));

        let response = app
            .oneshot(get_request("/api/open", Some("pmp_bogus")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(access.usage().is_empty().await);
    }

    #[tokio::test]
    async fn test_optional_auth_still_meters_valid_keys() {
        let access = create_access();
        let issued = access.keys().issue("ci", 1, Metadata::new()).await.unwrap();
        let app = create_app(access, false);

        let first = app
            .clone()
            .oneshot(get_request("/api/open", Some(&issued.secret)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(get_request("/api/open", Some(&issued.secret)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer pmp_test-key".parse().unwrap());

        assert_eq!(extract_credential(&headers).as_deref(), Some("pmp_test-key"));
    }

    #[test]
    fn test_extract_x_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", " pmp_other ".parse().unwrap());

        assert_eq!(extract_credential(&headers).as_deref(), Some("pmp_other"));
    }

    #[test]
    fn test_bearer_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer pmp_bearer".parse().unwrap());
        headers.insert("x-api-key", "pmp_header".parse().unwrap());

        assert_eq!(extract_credential(&headers).as_deref(), Some("pmp_bearer"));
    }

    #[test]
    fn test_non_bearer_authorization_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert_eq!(extract_credential(&headers), None);

        headers.insert("x-api-key", "pmp_header".parse().unwrap());
        assert_eq!(extract_credential(&headers).as_deref(), Some("pmp_header"));
    }

    #[test]
    fn test_blank_credentials_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer    ".parse().unwrap());
        headers.insert("x-api-key", "".parse().unwrap());

        assert_eq!(extract_credential(&headers), None);
    }
}
