//! Persisted rows, one struct per relation.
//!
//! Ids on records handed to a store's `insert_*` method are placeholders; the
//! store assigns the real id and returns the stored record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    AbsenceId, AppealLinkId, AppealStatus, BoundarySource, CapabilityNodeId, ComputeReason,
    FreezeMarkerId, Horizon, MutationState, ProgramId, ProvenanceId, QueueId, RunId, RunStatus,
    SnapshotId, ViolationType,
};

/// Wall-clock instant, millisecond precision, UTC.
pub type Timestamp = DateTime<Utc>;

// =============================================================================
// CATALOG
// =============================================================================

/// A named organizational function a program must sustain.
///
/// Unique per `(program_id, node_code)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityNode {
    pub id: CapabilityNodeId,
    pub program_id: ProgramId,
    pub node_code: String,
    pub name: String,
    pub description: String,
}

/// Minimum number of active assignments a node needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageRequirement {
    pub node_id: CapabilityNodeId,
    pub program_id: ProgramId,
    pub min_coverage: u32,
    pub is_active: bool,
}

/// Buffer beyond the minimum coverage. Stored, not evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyDepth {
    pub node_id: CapabilityNodeId,
    pub program_id: ProgramId,
    pub min_depth: u32,
    pub is_active: bool,
}

/// One fragility value per horizon, in basis points. Stored, not evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizonFragilityVector {
    pub node_id: CapabilityNodeId,
    pub program_id: ProgramId,
    pub values_bp: [u16; 4],
}

impl HorizonFragilityVector {
    #[must_use]
    pub fn at(&self, horizon: Horizon) -> u16 {
        self.values_bp[horizon.index()]
    }
}

/// Caller-supplied node definition for catalog seeding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    pub node_code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub min_coverage: u32,
    #[serde(default)]
    pub min_depth: u32,
    #[serde(default)]
    pub fragility_bp: [u16; 4],
    #[serde(default = "default_true")]
    pub requirement_active: bool,
    #[serde(default = "default_true")]
    pub redundancy_active: bool,
}

fn default_true() -> bool {
    true
}

impl NodeDef {
    /// Definition with an active coverage requirement and no redundancy buffer.
    #[must_use]
    pub fn new(node_code: impl Into<String>, name: impl Into<String>, min_coverage: u32) -> Self {
        Self {
            node_code: node_code.into(),
            name: name.into(),
            description: String::new(),
            min_coverage,
            min_depth: 0,
            fragility_bp: [0; 4],
            requirement_active: true,
            redundancy_active: true,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_min_depth(mut self, min_depth: u32) -> Self {
        self.min_depth = min_depth;
        self
    }
}

/// A node joined with its requirement, redundancy and fragility rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub node: CapabilityNode,
    pub requirement: CoverageRequirement,
    pub redundancy: RedundancyDepth,
    pub fragility: HorizonFragilityVector,
}

/// External input: one person (or slot) currently covering a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCapabilityAssignment {
    pub program_id: ProgramId,
    pub capability_node_id: CapabilityNodeId,
    pub assignee: String,
    pub is_active: bool,
}

// =============================================================================
// QUEUE & RUN
// =============================================================================

/// A request to compute capability health for one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeQueueEntry {
    pub id: QueueId,
    pub program_id: ProgramId,
    pub reason: ComputeReason,
    pub details: BTreeMap<String, String>,
    pub status: RunStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub enqueued_at: Timestamp,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: Timestamp,
}

/// Counts recorded on a succeeded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunSummary {
    pub node_count: usize,
    pub snapshot_count: usize,
    pub absence_count: usize,
    pub appeal_count: usize,
}

/// One execution of the compute pipeline. Owns exactly one queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRun {
    pub id: RunId,
    pub queue_id: QueueId,
    pub program_id: ProgramId,
    pub status: RunStatus,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<Timestamp>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub finished_at: Option<Timestamp>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

// =============================================================================
// PROVENANCE & FREEZE
// =============================================================================

/// Stamps a run with the system time every piece of its evidence refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub id: ProvenanceId,
    pub program_id: ProgramId,
    pub engine_code: String,
    pub run_id: RunId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub system_time: Timestamp,
    pub mutation_state: MutationState,
    pub meta: BTreeMap<String, String>,
}

/// Immutable binding of one horizon to the run's system time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeMarker {
    pub id: FreezeMarkerId,
    pub program_id: ProgramId,
    pub run_id: RunId,
    pub horizon: Horizon,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_start: Timestamp,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub window_end: Timestamp,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub system_time: Timestamp,
    pub boundary_source: BoundarySource,
}

// =============================================================================
// SNAPSHOTS & ABSENCES
// =============================================================================

/// Coverage-annotated view of one node inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCoverage {
    pub node_id: CapabilityNodeId,
    pub node_code: String,
    pub name: String,
    pub coverage_count: u32,
    pub min_coverage: u32,
    pub min_depth: u32,
    pub requirement_active: bool,
}

impl NodeCoverage {
    /// Coverage is strictly below an active threshold.
    ///
    /// `coverage == min` is satisfied, and `min == 0` can never be violated.
    #[must_use]
    pub fn is_under_covered(&self) -> bool {
        self.requirement_active && self.coverage_count < self.min_coverage
    }

    /// Missing assignments, zero when satisfied.
    #[must_use]
    pub fn deficit(&self) -> u32 {
        self.min_coverage.saturating_sub(self.coverage_count)
    }
}

/// Full node-coverage list for one horizon as of a run's system time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    pub id: SnapshotId,
    pub program_id: ProgramId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub as_of_system_time: Timestamp,
    pub horizon: Horizon,
    pub entries: Vec<NodeCoverage>,
    pub provenance_id: ProvenanceId,
    /// BLAKE3 hex digest of the canonical snapshot content.
    pub digest: String,
}

/// Evidence captured with a coverage absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEvidence {
    pub node_code: String,
    pub coverage_count: u32,
    pub min_coverage: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub system_time: Timestamp,
}

/// A recorded deficiency: coverage fell strictly under its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceDetermination {
    pub id: AbsenceId,
    pub program_id: ProgramId,
    pub capability_node_id: CapabilityNodeId,
    pub violation_type: ViolationType,
    pub horizon: Horizon,
    pub freeze_marker_id: FreezeMarkerId,
    pub provenance_id: ProvenanceId,
    pub evidence: CoverageEvidence,
}

/// Marks one absence as eligible for the dispute workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealIntakeLink {
    pub id: AppealLinkId,
    pub program_id: ProgramId,
    pub determination_id: AbsenceId,
    pub status: AppealStatus,
}
