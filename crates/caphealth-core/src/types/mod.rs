//! # Core Type Definitions
//!
//! This module contains all core types for the capability health engine:
//! - Program and row identifiers (`ProgramId`, `CapabilityNodeId`, `RunId`, ...)
//! - The fixed horizon set (`Horizon`)
//! - Lifecycle and classification enums (`RunStatus`, `ViolationType`, ...)
//! - Error types (`HealthError`)
//! - Persisted records (see [`records`])
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they key a `BTreeMap`/`BTreeSet`
//! - Serialize timestamps as epoch milliseconds

mod records;

pub use records::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::MAX_PROGRAM_ID_LENGTH;

// =============================================================================
// PROGRAM IDENTIFIER
// =============================================================================

/// Identifier of the organization/program every row is scoped to.
///
/// Always non-blank and trimmed; construct with [`ProgramId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProgramId(String);

impl ProgramId {
    /// Validate and normalize a raw program identifier.
    ///
    /// Returns `HealthError::Validation` if the input is blank or longer than
    /// `MAX_PROGRAM_ID_LENGTH` bytes.
    pub fn parse(raw: &str) -> Result<Self, HealthError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HealthError::Validation("programId is required".to_string()));
        }
        if trimmed.len() > MAX_PROGRAM_ID_LENGTH {
            return Err(HealthError::Validation(format!(
                "programId length {} exceeds maximum {} bytes",
                trimmed.len(),
                MAX_PROGRAM_ID_LENGTH
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the program id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ROW IDENTIFIERS
// =============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Store-assigned id of a capability node.
    CapabilityNodeId
);
row_id!(
    /// Store-assigned id of a compute queue entry.
    QueueId
);
row_id!(
    /// Store-assigned id of a compute run.
    RunId
);
row_id!(
    /// Store-assigned id of a provenance record.
    ProvenanceId
);
row_id!(
    /// Store-assigned id of a freeze marker.
    FreezeMarkerId
);
row_id!(
    /// Store-assigned id of a capability snapshot.
    SnapshotId
);
row_id!(
    /// Store-assigned id of an absence determination.
    AbsenceId
);
row_id!(
    /// Store-assigned id of an appeal intake link.
    AppealLinkId
);

// =============================================================================
// HORIZON
// =============================================================================

/// Forward-looking time bucket over which coverage is evaluated.
///
/// The set is fixed and ordered: `H0 < H1 < H2 < H3`. H0 is "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Horizon {
    H0,
    H1,
    H2,
    H3,
}

impl Horizon {
    /// Every horizon, in evaluation order.
    pub const ALL: [Horizon; 4] = [Horizon::H0, Horizon::H1, Horizon::H2, Horizon::H3];

    /// Zero-based position in [`Horizon::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Horizon::H0 => 0,
            Horizon::H1 => 1,
            Horizon::H2 => 2,
            Horizon::H3 => 3,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Horizon::H0 => "H0",
            Horizon::H1 => "H1",
            Horizon::H2 => "H2",
            Horizon::H3 => "H3",
        }
    }

    /// Parse "H0".."H3" (case-insensitive).
    pub fn parse(raw: &str) -> Result<Self, HealthError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "H0" => Ok(Horizon::H0),
            "H1" => Ok(Horizon::H1),
            "H2" => Ok(Horizon::H2),
            "H3" => Ok(Horizon::H3),
            other => Err(HealthError::Validation(format!("unknown horizon '{}'", other))),
        }
    }
}

impl std::fmt::Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LIFECYCLE STATUS
// =============================================================================

/// Status shared by compute queue entries and compute runs.
///
/// `Queued -> Running -> {Succeeded | Failed}`. A queue entry may also jump
/// straight from `Queued` to `Failed` when its run could not be allocated.
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    #[must_use]
    pub const fn can_transition_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Queued, RunStatus::Running)
                | (RunStatus::Queued, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Succeeded)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a compute was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComputeReason {
    #[default]
    Manual,
    RosterChange,
    Scheduled,
    Retry,
}

impl ComputeReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ComputeReason::Manual => "manual",
            ComputeReason::RosterChange => "roster_change",
            ComputeReason::Scheduled => "scheduled",
            ComputeReason::Retry => "retry",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, HealthError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(ComputeReason::Manual),
            "roster_change" => Ok(ComputeReason::RosterChange),
            "scheduled" => Ok(ComputeReason::Scheduled),
            "retry" => Ok(ComputeReason::Retry),
            other => Err(HealthError::Validation(format!(
                "unknown compute reason '{}'",
                other
            ))),
        }
    }
}

/// Mutation state stamped on a provenance record.
///
/// Only `PreFreeze` is written today. The enum stays open so that a later
/// post-freeze transition can be recorded without a schema change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    #[default]
    PreFreeze,
    PostFreeze,
    Other(String),
}

impl MutationState {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            MutationState::PreFreeze => "pre_freeze",
            MutationState::PostFreeze => "post_freeze",
            MutationState::Other(s) => s,
        }
    }
}

/// Where a freeze marker's window boundary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySource {
    /// Instantaneous window at the run's system time.
    #[default]
    RunSystemTime,
}

/// Kind of requirement an absence violates.
///
/// Only `Coverage` is evaluated by the compute pass; the other variants are
/// part of the persisted schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    Coverage,
    Redundancy,
    Fragility,
}

impl ViolationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ViolationType::Coverage => "coverage",
            ViolationType::Redundancy => "redundancy",
            ViolationType::Fragility => "fragility",
        }
    }
}

/// Status of an appeal intake link. `Eligible` is the only status written at
/// absence-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AppealStatus {
    Eligible,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the capability health engine.
///
/// - No silent failures
/// - Use `Result<T, HealthError>` for fallible operations
/// - The engine never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum HealthError {
    /// Input rejected before any write was attempted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A read or write against the store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A persisted row could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A lifecycle transition that the state machine does not allow.
    #[error("Invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: u64,
        from: RunStatus,
        to: RunStatus,
    },

    /// A referenced row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl HealthError {
    /// Short machine-readable category, used in logs and API payloads.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            HealthError::Validation(_) => "validation",
            HealthError::Storage(_) => "storage",
            HealthError::Serialization(_) => "serialization",
            HealthError::InvalidTransition { .. } => "invalid_transition",
            HealthError::NotFound(_) => "not_found",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
