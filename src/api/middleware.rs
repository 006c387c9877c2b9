//! API Middleware
//!
//! Request context extraction, rate limiting and request logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;
use crate::identifier::{Identifier, USER_PREFIX};

/// Header naming the caller for rate limiting
pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const REQUEST_USER_HEADER: &str = "x-request-user-id";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Client bucket used when no client id is sent
pub const ANONYMOUS_CLIENT: &str = "anonymous";

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MAX_CLIENT_ID_LEN: usize = 128;

// =========================================================================
// Request Context Middleware
// =========================================================================

/// Build the [`OperationContext`] for a request from its headers
pub fn context_from_headers(headers: &HeaderMap) -> Result<OperationContext, AppError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    // Correlation id: explicit header, then the propagated request id
    let correlation_id = header_str(CORRELATION_ID_HEADER)
        .or_else(|| header_str("x-request-id"))
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new().with_correlation_id(correlation_id);

    if let Some(raw) = header_str(REQUEST_USER_HEADER) {
        let user_id = Identifier::parse_prefixed(raw.trim(), USER_PREFIX).map_err(|_| {
            AppError::InvalidRequest("Invalid X-Request-User-Id header format".to_string())
        })?;
        context = context.with_request_user(user_id);
    }

    let client_id = header_str(CLIENT_ID_HEADER)
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.len() <= MAX_CLIENT_ID_LEN)
        .unwrap_or(ANONYMOUS_CLIENT);

    Ok(context.with_client_id(client_id))
}

/// Attach an [`OperationContext`] to the request extensions
pub async fn context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = match context_from_headers(request.headers()) {
        Ok(context) => context,
        Err(e) => return e.into_response(),
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

// =========================================================================
// Rate Limiting
// =========================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    count: u32,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

/// Fixed one-minute window counter per client
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
    per_minute: u32,
}

impl RateLimiter {
    /// `per_minute == 0` disables limiting
    pub fn new(per_minute: u32) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            per_minute,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.per_minute > 0
    }

    pub fn check(&self, client_id: &str) -> RateDecision {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&self, client_id: &str, now: Instant) -> RateDecision {
        if !self.is_enabled() {
            return RateDecision::Allowed {
                remaining: u32::MAX,
            };
        }

        // The entry guard locks only this client's shard
        let mut window = self.windows.entry(client_id.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now.duration_since(window.started_at) >= RATE_LIMIT_WINDOW {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.per_minute {
            let elapsed = now.duration_since(window.started_at);
            return RateDecision::Limited {
                retry_after: RATE_LIMIT_WINDOW.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.per_minute - window.count,
        }
    }

    /// Drop windows that have ended
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(window.started_at) < RATE_LIMIT_WINDOW);
        before.saturating_sub(self.windows.len())
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.client_id.clone())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string());

    match limiter.check(&client_id) {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            tracing::warn!(client_id = %client_id, "Rate limit exceeded");

            let mut response = AppError::RateLimitExceeded.into_response();
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked_value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());

    let (correlation_id, client_id) = request
        .extensions()
        .get::<OperationContext>()
        .map(|ctx| (ctx.correlation_id, ctx.client_id.clone()))
        .unwrap_or_default();

    let start = Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        client_id = ?client_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
