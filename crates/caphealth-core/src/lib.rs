//! # caphealth-core
//!
//! The Capability Health Compute Engine - THE LOGIC.
//!
//! Tracks whether a program's required capabilities are staffed across four
//! forward-looking horizons, and records reproducible, dispute-eligible
//! absences when they are not. A read-only reader turns the latest run into
//! a recruiting view.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Is synchronous and deterministic: one compute runs end-to-end in the call
//! - Uses integer basis points for every score (no floating point)
//! - Owns no network or async code; the app layer exposes it
//! - Never panics; every fallible operation returns `Result<T, HealthError>`

// =============================================================================
// MODULES
// =============================================================================

pub mod appeal;
pub mod catalog;
pub mod clock;
pub mod engine;
pub mod inspect;
pub mod orchestrator;
pub mod primitives;
pub mod provenance;
pub mod reader;
pub mod reconcile;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AbsenceDetermination, AbsenceId, AppealIntakeLink, AppealLinkId, AppealStatus,
    BoundarySource, CapabilityNode, CapabilityNodeId, CapabilitySnapshot, CatalogEntry,
    ComputeQueueEntry, ComputeReason, ComputeRun, CoverageEvidence, CoverageRequirement,
    FreezeMarker, FreezeMarkerId, HealthError, Horizon, HorizonFragilityVector, MutationState,
    NodeCoverage, NodeDef, ProgramCapabilityAssignment, ProgramId, ProvenanceId,
    ProvenanceRecord, QueueId, RedundancyDepth, RunId, RunStatus, RunSummary, SnapshotId,
    Timestamp, ViolationType,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use catalog::{assign_node, default_catalog, seed_missing_nodes, seed_or_update_nodes};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ComputeOutcome, HealthComputeEngine};
pub use inspect::{RunDetail, latest_run_detail, list_runs};
pub use reader::{
    CandidateImpact, Contribution, ProfileClassifier, RecruitCandidate, RecruitabilityClassifier,
    RecruitableAbsence, RecruitingImpact, RecruitingImpactReader, Severity, Stabilization,
    StabilizationBand,
};
pub use reconcile::sweep_stale_runs;
pub use snapshot::{FlatProjection, HorizonProjection};
pub use storage::RedbStore;
pub use store::{HealthStore, MemoryStore};
