//! # API Request/Response Types
//!
//! JSON bodies for the HTTP API. Field names are snake_case. Core records
//! (runs, outcomes, impact reads) are returned as-is.

use caphealth_core::{
    CapabilityNodeId, ComputeReason, ComputeRun, HealthError, Horizon, NodeDef,
    ProgramCapabilityAssignment, ProgramId, RecruitCandidate, RunId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum candidates accepted by one impact read.
pub const MAX_IMPACT_CANDIDATES: usize = 1_000;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Body of every non-2xx response produced by a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `HealthError::kind()`, or a transport-level kind such as `unauthorized`.
    pub kind: String,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            error: error.into(),
        }
    }
}

impl From<&HealthError> for ErrorResponse {
    fn from(e: &HealthError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// Node definitions to insert or update for one program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCatalogRequest {
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCatalogResponse {
    pub program_id: ProgramId,
    /// Node ids in request order.
    pub node_ids: Vec<CapabilityNodeId>,
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub node_code: String,
    pub assignee: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignResponse {
    pub assignment: ProgramCapabilityAssignment,
}

// =============================================================================
// COMPUTE
// =============================================================================

/// Trigger for `POST /programs/{program_id}/compute`. `{}` is a manual run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeRequest {
    #[serde(default)]
    pub reason: ComputeReason,
    #[serde(default)]
    pub details: BTreeMap<String, String>,
}

// =============================================================================
// RUNS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsResponse {
    pub program_id: ProgramId,
    /// Newest first.
    pub runs: Vec<ComputeRun>,
}

// =============================================================================
// IMPACT
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImpactRequest {
    /// Restrict the read to one horizon; absent means all four.
    #[serde(default)]
    pub horizon: Option<Horizon>,
    #[serde(default)]
    pub candidates: Vec<RecruitCandidate>,
}

impl ImpactRequest {
    pub fn validate(&self) -> Result<(), HealthError> {
        if self.candidates.len() > MAX_IMPACT_CANDIDATES {
            return Err(HealthError::Validation(format!(
                "{} candidates exceeds maximum {}",
                self.candidates.len(),
                MAX_IMPACT_CANDIDATES
            )));
        }
        if let Some(blank) = self.candidates.iter().find(|c| c.id.trim().is_empty()) {
            return Err(HealthError::Validation(format!(
                "candidate '{}' has no id",
                blank.name
            )));
        }
        Ok(())
    }
}

// =============================================================================
// SWEEP
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepRequest {
    /// Overrides the configured stale-run age.
    #[serde(default)]
    pub max_age_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    pub max_age_secs: i64,
    /// Runs moved to `FAILED`, in id order.
    pub reconciled: Vec<RunId>,
}
