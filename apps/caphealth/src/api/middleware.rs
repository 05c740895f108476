//! # Middleware
//!
//! Rate limiting and CORS for the capability health API.
//!
//! - `CAPHEALTH_RATE_LIMIT`: requests per second across all clients
//!   (default 100, `0` disables limiting)
//! - `CAPHEALTH_CORS_ORIGINS`: comma-separated origins, or `*` for any
//!   (default: localhost on ports 3000 and 8080)

use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const RATE_LIMIT_ENV: &str = "CAPHEALTH_RATE_LIMIT";
pub const CORS_ORIGINS_ENV: &str = "CAPHEALTH_CORS_ORIGINS";

const DEFAULT_RPS: u32 = 100;

const LOCALHOST_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Process-wide limiter shared by every route.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Limiter allowing `requests_per_second`, or `None` when it is zero.
pub fn create_rate_limiter(requests_per_second: u32) -> Option<GlobalRateLimiter> {
    let rps = NonZeroU32::new(requests_per_second)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_second(rps))))
}

/// Requests per second from `CAPHEALTH_RATE_LIMIT`. Unparseable values fall
/// back to the default.
pub fn get_rate_limit_from_env() -> u32 {
    match std::env::var(RATE_LIMIT_ENV) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(value = %raw, "invalid {}, using {}", RATE_LIMIT_ENV, DEFAULT_RPS);
            DEFAULT_RPS
        }),
        Err(_) => DEFAULT_RPS,
    }
}

/// Answer 429 once the shared quota is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if limiter.check().is_err() {
        tracing::warn!(path = %request.uri().path(), "rate limit exceeded");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorResponse::new("rate_limited", "Too Many Requests")),
        ));
    }
    Ok(next.run(request).await)
}

// =============================================================================
// CORS
// =============================================================================

/// Valid origins from a comma-separated list. Invalid entries are logged
/// and skipped.
pub(crate) fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin, error = %e, "CORS: ignoring invalid origin");
                None
            }
        })
        .collect()
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn localhost_cors() -> CorsLayer {
    restricted_cors(
        LOCALHOST_ORIGINS
            .iter()
            .filter_map(|o| o.parse::<HeaderValue>().ok())
            .collect(),
    )
}

/// CORS layer from `CAPHEALTH_CORS_ORIGINS`.
pub fn build_cors_layer() -> CorsLayer {
    match std::env::var(CORS_ORIGINS_ENV).ok().as_deref() {
        Some("*") => {
            tracing::warn!("CORS: allowing ALL origins ({}=*)", CORS_ORIGINS_ENV);
            CorsLayer::permissive()
        }
        Some(raw) => {
            let origins = parse_origins(raw);
            if origins.is_empty() {
                tracing::warn!("CORS: no valid origins configured, using localhost only");
                localhost_cors()
            } else {
                tracing::info!(count = origins.len(), "CORS: allowing configured origins");
                restricted_cors(origins)
            }
        }
        None => {
            tracing::info!("CORS: {} not set, using localhost only", CORS_ORIGINS_ENV);
            localhost_cors()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
