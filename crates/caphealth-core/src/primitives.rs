//! # Engine Primitives
//!
//! Hardcoded runtime constants for the capability health engine.
//!
//! These values are compiled into the binary and are immutable at runtime.
//! Scores are integer basis points: `BP_SCALE` is 1.0.

/// Identifier stamped on every provenance record written by this engine.
pub const ENGINE_CODE: &str = "capability_health_v1";

/// Maximum length of a program identifier.
pub const MAX_PROGRAM_ID_LENGTH: usize = 128;

/// Maximum length of a node code.
pub const MAX_NODE_CODE_LENGTH: usize = 64;

/// Maximum number of node definitions accepted by one catalog seed.
pub const MAX_CATALOG_NODES: usize = 1024;

/// Error recorded on runs failed by the reconciliation sweep.
pub const STALE_RUN_ERROR: &str = "stale run reconciled";

/// Default age after which a `RUNNING` run is considered abandoned.
pub const DEFAULT_STALE_RUN_SECS: i64 = 15 * 60;

// =============================================================================
// IMPACT SCORING
// =============================================================================

/// 1.0 in basis points.
pub const BP_SCALE: u32 = 10_000;

/// Weight of the coverage signal in the impact score (tenths).
pub const COVERAGE_WEIGHT: u32 = 5;

/// Weight of the confidence signal in the impact score (tenths).
pub const CONFIDENCE_WEIGHT: u32 = 3;

/// Weight of the time-alignment signal in the impact score (tenths).
pub const TIME_ALIGNMENT_WEIGHT: u32 = 2;

/// Time-alignment penalty per horizon a candidate arrives late.
pub const LATE_HORIZON_PENALTY_BP: u32 = 2_500;

/// Minimum total impact for tier 0 (high contribution).
pub const TIER0_THRESHOLD_BP: u32 = 20_000;

/// Minimum total impact for tier 1.
pub const TIER1_THRESHOLD_BP: u32 = 10_000;

/// Minimum total impact for tier 2. Anything below is tier 3 (negligible).
pub const TIER2_THRESHOLD_BP: u32 = 2_500;
