//! # Capability Health HTTP API
//!
//! axum server exposing the compute engine and the recruiting impact reader.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Health check
//! - `POST /programs/{program_id}/catalog` - Insert or update node definitions
//! - `POST /programs/{program_id}/assignments` - Upsert an assignment
//! - `POST /programs/{program_id}/compute` - Run the capability health pipeline
//! - `GET  /programs/{program_id}/runs` - Run history, newest first
//! - `GET  /programs/{program_id}/runs/latest` - Latest succeeded run detail
//! - `POST /programs/{program_id}/impact` - Recruiting impact read
//! - `POST /runs/sweep` - Fail stale `RUNNING` runs
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `CAPHEALTH_CORS_ORIGINS`: Comma-separated allowed origins, or "*" (default: localhost only)
//! - `CAPHEALTH_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `CAPHEALTH_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env};
pub use middleware::{
    CORS_ORIGINS_ENV, RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env,
};
pub use types::{
    AssignRequest, AssignResponse, ComputeRequest, ErrorResponse, HealthResponse, ImpactRequest,
    MAX_IMPACT_CANDIDATES, RunsResponse, SeedCatalogRequest, SeedCatalogResponse, SweepRequest,
    SweepResponse,
};

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use caphealth_core::{HealthComputeEngine, HealthError, HealthStore, RecruitabilityClassifier};
use chrono::TimeDelta;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Request bodies above this size are rejected (2 MiB).
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Store handed to the server: either backend behind one type.
pub type SharedStore = Box<dyn HealthStore + Send + Sync>;

/// Engine owned by the server.
pub type SharedEngine = HealthComputeEngine<SharedStore>;

/// Shared server state.
///
/// Writes (catalog, assignments, compute, sweep) take the engine write lock,
/// so computes for any program run one at a time.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<SharedEngine>>,
    pub classifier: Arc<dyn RecruitabilityClassifier>,
    /// Default age used by `POST /runs/sweep`.
    pub stale_run_max_age: TimeDelta,
}

impl AppState {
    #[must_use]
    pub fn new(
        engine: SharedEngine,
        classifier: impl RecruitabilityClassifier + 'static,
        stale_run_max_age: TimeDelta,
    ) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            classifier: Arc::new(classifier),
            stale_run_max_age,
        }
    }
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting - if enabled
/// 5. Authentication - if `CAPHEALTH_API_KEY` is set
pub fn create_router(state: AppState) -> Router {
    let rps = get_rate_limit_from_env();
    let rate_limiter = create_rate_limiter(rps);
    match &rate_limiter {
        Some(_) => tracing::info!(rps, "rate limiting enabled"),
        None => tracing::info!("rate limiting disabled"),
    }

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible. \
             Set {} to enable authentication.",
            API_KEY_ENV
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/programs/{program_id}/catalog",
            post(handlers::seed_catalog_handler),
        )
        .route(
            "/programs/{program_id}/assignments",
            post(handlers::assign_handler),
        )
        .route(
            "/programs/{program_id}/compute",
            post(handlers::compute_handler),
        )
        .route("/programs/{program_id}/runs", get(handlers::runs_handler))
        .route(
            "/programs/{program_id}/runs/latest",
            get(handlers::latest_run_handler),
        )
        .route(
            "/programs/{program_id}/impact",
            post(handlers::impact_handler),
        )
        .route("/runs/sweep", post(handlers::sweep_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Resolves on Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested, draining connections");
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), HealthError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| HealthError::Storage(format!("bind {}: {}", addr, e)))?;

    tracing::info!("capability health server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| HealthError::Storage(format!("server error: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
