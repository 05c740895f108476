//! # API Endpoint Handlers
//!
//! Each handler parses the path `program_id`, takes the engine lock and
//! calls into the core. Core errors map to status codes by kind.

use super::{
    AppState,
    types::{
        AssignRequest, AssignResponse, ComputeRequest, ErrorResponse, HealthResponse,
        ImpactRequest, RunsResponse, SeedCatalogRequest, SeedCatalogResponse, SweepRequest,
        SweepResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use caphealth_core::{
    ComputeOutcome, HealthError, ProgramId, RecruitingImpact, RecruitingImpactReader, RunDetail,
    assign_node, latest_run_detail, list_runs, seed_or_update_nodes,
};
use chrono::TimeDelta;

type ApiResult<T> = Result<(StatusCode, Json<T>), (StatusCode, Json<ErrorResponse>)>;

/// Status code for a core error.
pub(crate) fn status_for(e: &HealthError) -> StatusCode {
    match e {
        HealthError::Validation(_) => StatusCode::BAD_REQUEST,
        HealthError::NotFound(_) => StatusCode::NOT_FOUND,
        HealthError::InvalidTransition { .. } => StatusCode::CONFLICT,
        HealthError::Storage(_) | HealthError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn reject(e: HealthError) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&e);
    if status.is_server_error() {
        tracing::error!(kind = e.kind(), error = %e, "request failed");
    } else {
        tracing::debug!(kind = e.kind(), error = %e, "request rejected");
    }
    (status, Json(ErrorResponse::from(&e)))
}

fn parse_program(raw: &str) -> Result<ProgramId, (StatusCode, Json<ErrorResponse>)> {
    ProgramId::parse(raw).map_err(reject)
}

// =============================================================================
// HEALTH
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// CATALOG
// =============================================================================

/// Insert or update node definitions for a program.
pub async fn seed_catalog_handler(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    Json(request): Json<SeedCatalogRequest>,
) -> ApiResult<SeedCatalogResponse> {
    let program = parse_program(&program_id)?;
    let mut engine = state.engine.write().await;
    let node_ids =
        seed_or_update_nodes(engine.store_mut(), &program, &request.nodes).map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(SeedCatalogResponse {
            program_id: program,
            node_ids,
        }),
    ))
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

/// Record that someone covers a node.
pub async fn assign_handler(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<AssignResponse> {
    let program = parse_program(&program_id)?;
    let mut engine = state.engine.write().await;
    let assignment = assign_node(
        engine.store_mut(),
        &program,
        &request.node_code,
        &request.assignee,
        request.is_active,
    )
    .map_err(reject)?;

    Ok((StatusCode::OK, Json(AssignResponse { assignment })))
}

// =============================================================================
// COMPUTE
// =============================================================================

/// Run the capability health pipeline.
///
/// The outcome is returned in every case. A rejected program id answers 400,
/// a failure after allocation answers 500.
pub async fn compute_handler(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    Json(request): Json<ComputeRequest>,
) -> (StatusCode, Json<ComputeOutcome>) {
    let mut engine = state.engine.write().await;
    let outcome = engine.run_health_compute_with(&program_id, request.reason, request.details);

    let status = if outcome.success {
        StatusCode::OK
    } else if outcome.queue_id.is_none() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome))
}

// =============================================================================
// RUNS
// =============================================================================

/// Run history for a program, newest first.
pub async fn runs_handler(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
) -> ApiResult<RunsResponse> {
    let program = parse_program(&program_id)?;
    let engine = state.engine.read().await;
    let runs = list_runs(engine.store(), &program).map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(RunsResponse {
            program_id: program,
            runs,
        }),
    ))
}

/// Latest succeeded run with its full evidence set.
pub async fn latest_run_handler(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
) -> ApiResult<RunDetail> {
    let program = parse_program(&program_id)?;
    let engine = state.engine.read().await;
    match latest_run_detail(engine.store(), &program).map_err(reject)? {
        Some(detail) => Ok((StatusCode::OK, Json(detail))),
        None => Err(reject(HealthError::NotFound(format!(
            "no succeeded run for program {}",
            program
        )))),
    }
}

// =============================================================================
// IMPACT
// =============================================================================

/// Recruiting impact read against the latest succeeded run.
pub async fn impact_handler(
    State(state): State<AppState>,
    Path(program_id): Path<String>,
    Json(request): Json<ImpactRequest>,
) -> ApiResult<RecruitingImpact> {
    let program = parse_program(&program_id)?;
    request.validate().map_err(reject)?;

    let engine = state.engine.read().await;
    let reader = RecruitingImpactReader::new(engine.store(), state.classifier.as_ref());
    let impact = reader
        .read(&program, request.horizon, &request.candidates)
        .map_err(reject)?;

    Ok((StatusCode::OK, Json(impact)))
}

// =============================================================================
// SWEEP
// =============================================================================

/// Fail runs stuck in `RUNNING`.
pub async fn sweep_handler(
    State(state): State<AppState>,
    Json(request): Json<SweepRequest>,
) -> ApiResult<SweepResponse> {
    let max_age = match request.max_age_secs {
        Some(secs) if secs < 0 => {
            return Err(reject(HealthError::Validation(format!(
                "max_age_secs must not be negative, got {}",
                secs
            ))));
        }
        Some(secs) => TimeDelta::try_seconds(secs).ok_or_else(|| {
            reject(HealthError::Validation(format!(
                "max_age_secs {} is out of range",
                secs
            )))
        })?,
        None => state.stale_run_max_age,
    };

    let mut engine = state.engine.write().await;
    let failed = engine.sweep_stale_runs(max_age).map_err(reject)?;

    Ok((
        StatusCode::OK,
        Json(SweepResponse {
            max_age_secs: max_age.num_seconds(),
            reconciled: failed.into_iter().map(|run| run.id).collect(),
        }),
    ))
}

// =============================================================================
// TESTS
// =============================================================================
