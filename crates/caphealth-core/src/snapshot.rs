//! # Snapshot & Absence Engine
//!
//! Counts current coverage, writes one snapshot per horizon, and derives
//! coverage absences from those snapshots.
//!
//! ## Ordering
//!
//! All snapshots of a run are written as one batch before absence evaluation
//! begins, and absences are written as one batch. A failure in either write
//! leaves no partial set behind.

use crate::store::HealthStore;
use crate::{
    AbsenceDetermination, AbsenceId, CapabilityNodeId, CapabilitySnapshot, CatalogEntry,
    CoverageEvidence, FreezeMarkerId, HealthError, Horizon, NodeCoverage,
    ProgramCapabilityAssignment, ProgramId, ProvenanceId, SnapshotId, Timestamp, ViolationType,
};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// HORIZON PROJECTION
// =============================================================================

/// Projects a node's current coverage onto a horizon.
pub trait HorizonProjection: Send + Sync {
    fn project(&self, entry: &CatalogEntry, current: u32, horizon: Horizon) -> u32;
}

/// Every horizon sees today's coverage.
///
/// Fragility vectors are persisted but no decay function is applied to them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatProjection;

impl HorizonProjection for FlatProjection {
    fn project(&self, _entry: &CatalogEntry, current: u32, _horizon: Horizon) -> u32 {
        current
    }
}

// =============================================================================
// COVERAGE
// =============================================================================

/// Count active assignments per node.
#[must_use]
pub fn count_active_coverage(
    assignments: &[ProgramCapabilityAssignment],
) -> BTreeMap<CapabilityNodeId, u32> {
    let mut counts = BTreeMap::new();
    for assignment in assignments.iter().filter(|a| a.is_active) {
        let count: &mut u32 = counts.entry(assignment.capability_node_id).or_insert(0);
        *count = count.saturating_add(1);
    }
    counts
}

/// Build the coverage-annotated node list for one horizon.
#[must_use]
pub fn annotate(
    catalog: &[CatalogEntry],
    counts: &BTreeMap<CapabilityNodeId, u32>,
    projection: &dyn HorizonProjection,
    horizon: Horizon,
) -> Vec<NodeCoverage> {
    catalog
        .iter()
        .map(|entry| {
            let current = counts.get(&entry.node.id).copied().unwrap_or(0);
            NodeCoverage {
                node_id: entry.node.id,
                node_code: entry.node.node_code.clone(),
                name: entry.node.name.clone(),
                coverage_count: projection.project(entry, current, horizon),
                min_coverage: entry.requirement.min_coverage,
                min_depth: entry.redundancy.min_depth,
                requirement_active: entry.requirement.is_active,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct DigestInput<'a> {
    program_id: &'a str,
    horizon: Horizon,
    as_of_millis: i64,
    entries: &'a [NodeCoverage],
}

/// BLAKE3 hex digest of a snapshot's canonical content.
pub fn snapshot_digest(
    program: &ProgramId,
    horizon: Horizon,
    as_of: Timestamp,
    entries: &[NodeCoverage],
) -> Result<String, HealthError> {
    let bytes = postcard::to_allocvec(&DigestInput {
        program_id: program.as_str(),
        horizon,
        as_of_millis: as_of.timestamp_millis(),
        entries,
    })
    .map_err(|e| HealthError::Serialization(e.to_string()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Recompute a stored snapshot's digest and compare.
pub fn verify_snapshot(snapshot: &CapabilitySnapshot) -> Result<bool, HealthError> {
    let expected = snapshot_digest(
        &snapshot.program_id,
        snapshot.horizon,
        snapshot.as_of_system_time,
        &snapshot.entries,
    )?;
    Ok(expected == snapshot.digest)
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Build one snapshot per horizon, in horizon order. Nothing is written.
pub fn build_snapshots(
    program: &ProgramId,
    catalog: &[CatalogEntry],
    counts: &BTreeMap<CapabilityNodeId, u32>,
    projection: &dyn HorizonProjection,
    system_time: Timestamp,
    provenance_id: ProvenanceId,
) -> Result<Vec<CapabilitySnapshot>, HealthError> {
    Horizon::ALL
        .iter()
        .map(|&horizon| {
            let entries = annotate(catalog, counts, projection, horizon);
            let digest = snapshot_digest(program, horizon, system_time, &entries)?;
            Ok(CapabilitySnapshot {
                id: SnapshotId::default(),
                program_id: program.clone(),
                as_of_system_time: system_time,
                horizon,
                entries,
                provenance_id,
                digest,
            })
        })
        .collect()
}

/// Build and persist the per-horizon snapshots as a single batch.
pub fn write_snapshots<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    catalog: &[CatalogEntry],
    counts: &BTreeMap<CapabilityNodeId, u32>,
    projection: &dyn HorizonProjection,
    system_time: Timestamp,
    provenance_id: ProvenanceId,
) -> Result<Vec<CapabilitySnapshot>, HealthError> {
    let snapshots = build_snapshots(
        program,
        catalog,
        counts,
        projection,
        system_time,
        provenance_id,
    )?;
    let stored = store.insert_snapshots(snapshots)?;
    tracing::debug!(
        program_id = %program,
        provenance_id = %provenance_id,
        snapshots = stored.len(),
        "snapshots written"
    );
    Ok(stored)
}

// =============================================================================
// ABSENCES
// =============================================================================

/// Derive coverage absences from a run's snapshots.
///
/// Emits exactly one absence per `(horizon, node)` whose coverage is strictly
/// below an active minimum. Each absence references that horizon's marker.
pub fn determine_absences(
    snapshots: &[CapabilitySnapshot],
    markers: &BTreeMap<Horizon, FreezeMarkerId>,
) -> Result<Vec<AbsenceDetermination>, HealthError> {
    let mut absences = Vec::new();
    for snapshot in snapshots {
        let freeze_marker_id = markers.get(&snapshot.horizon).copied().ok_or_else(|| {
            HealthError::NotFound(format!("freeze marker for horizon {}", snapshot.horizon))
        })?;
        for node in snapshot.entries.iter().filter(|n| n.is_under_covered()) {
            absences.push(AbsenceDetermination {
                id: AbsenceId::default(),
                program_id: snapshot.program_id.clone(),
                capability_node_id: node.node_id,
                violation_type: ViolationType::Coverage,
                horizon: snapshot.horizon,
                freeze_marker_id,
                provenance_id: snapshot.provenance_id,
                evidence: CoverageEvidence {
                    node_code: node.node_code.clone(),
                    coverage_count: node.coverage_count,
                    min_coverage: node.min_coverage,
                    system_time: snapshot.as_of_system_time,
                },
            });
        }
    }
    Ok(absences)
}

/// Persist absences as a single batch.
pub fn write_absences<S: HealthStore + ?Sized>(
    store: &mut S,
    absences: Vec<AbsenceDetermination>,
) -> Result<Vec<AbsenceDetermination>, HealthError> {
    let stored = store.insert_absences(absences)?;
    tracing::debug!(absences = stored.len(), "absences written");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CapabilityNode, CoverageRequirement, HorizonFragilityVector, RedundancyDepth};
    use chrono::DateTime;

    fn program() -> ProgramId {
        ProgramId::parse("p1").expect("program id")
    }

    fn entry(id: u64, min: u32, active: bool) -> CatalogEntry {
        let node_id = CapabilityNodeId(id);
        CatalogEntry {
            node: CapabilityNode {
                id: node_id,
                program_id: program(),
                node_code: format!("n{}", id),
                name: format!("Node {}", id),
                description: String::new(),
            },
            requirement: CoverageRequirement {
                node_id,
                program_id: program(),
                min_coverage: min,
                is_active: active,
            },
            redundancy: RedundancyDepth {
                node_id,
                program_id: program(),
                min_depth: 1,
                is_active: true,
            },
            fragility: HorizonFragilityVector {
                node_id,
                program_id: program(),
                values_bp: [0; 4],
            },
        }
    }

    fn assignment(node: u64, who: &str, active: bool) -> ProgramCapabilityAssignment {
        ProgramCapabilityAssignment {
            program_id: program(),
            capability_node_id: CapabilityNodeId(node),
            assignee: who.to_string(),
            is_active: active,
        }
    }

    fn markers() -> BTreeMap<Horizon, FreezeMarkerId> {
        Horizon::ALL
            .iter()
            .enumerate()
            .map(|(i, &h)| (h, FreezeMarkerId(i as u64 + 10)))
            .collect()
    }

    #[test]
    fn inactive_assignments_do_not_count() {
        let counts = count_active_coverage(&[
            assignment(1, "a", true),
            assignment(1, "b", true),
            assignment(2, "c", false),
        ]);
        assert_eq!(counts.get(&CapabilityNodeId(1)), Some(&2));
        assert_eq!(counts.get(&CapabilityNodeId(2)), None);
    }

    #[test]
    fn one_snapshot_per_horizon_with_full_node_list() {
        let catalog = vec![entry(1, 1, true), entry(2, 2, true)];
        let now = DateTime::from_timestamp_millis(1_000).expect("valid");
        let snapshots = build_snapshots(
            &program(),
            &catalog,
            &BTreeMap::new(),
            &FlatProjection,
            now,
            ProvenanceId(1),
        )
        .expect("build");

        assert_eq!(snapshots.len(), 4);
        for (snapshot, horizon) in snapshots.iter().zip(Horizon::ALL) {
            assert_eq!(snapshot.horizon, horizon);
            assert_eq!(snapshot.entries.len(), 2);
            assert!(verify_snapshot(snapshot).expect("verify"));
        }
    }

    #[test]
    fn digest_changes_with_content() {
        let now = DateTime::from_timestamp_millis(1_000).expect("valid");
        let catalog = vec![entry(1, 1, true)];
        let empty = annotate(&catalog, &BTreeMap::new(), &FlatProjection, Horizon::H0);
        let covered_counts = count_active_coverage(&[assignment(1, "a", true)]);
        let covered = annotate(&catalog, &covered_counts, &FlatProjection, Horizon::H0);

        let a = snapshot_digest(&program(), Horizon::H0, now, &empty).expect("digest");
        let b = snapshot_digest(&program(), Horizon::H0, now, &covered).expect("digest");
        let c = snapshot_digest(&program(), Horizon::H1, now, &empty).expect("digest");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn absences_only_strictly_under_threshold() {
        // node 1 exactly covered, node 2 short by one, node 3 min zero,
        // node 4 short but requirement inactive
        let catalog = vec![
            entry(1, 1, true),
            entry(2, 2, true),
            entry(3, 0, true),
            entry(4, 5, false),
        ];
        let counts = count_active_coverage(&[
            assignment(1, "a", true),
            assignment(2, "b", true),
        ]);
        let now = DateTime::from_timestamp_millis(1_000).expect("valid");
        let snapshots = build_snapshots(
            &program(),
            &catalog,
            &counts,
            &FlatProjection,
            now,
            ProvenanceId(5),
        )
        .expect("build");

        let absences = determine_absences(&snapshots, &markers()).expect("absences");
        assert_eq!(absences.len(), 4);
        for absence in &absences {
            assert_eq!(absence.capability_node_id, CapabilityNodeId(2));
            assert_eq!(absence.violation_type, ViolationType::Coverage);
            assert_eq!(absence.evidence.coverage_count, 1);
            assert_eq!(absence.evidence.min_coverage, 2);
            assert_eq!(absence.provenance_id, ProvenanceId(5));
            assert_eq!(
                Some(&absence.freeze_marker_id),
                markers().get(&absence.horizon)
            );
        }
    }

    #[test]
    fn missing_marker_is_an_error() {
        let catalog = vec![entry(1, 1, true)];
        let now = DateTime::from_timestamp_millis(1_000).expect("valid");
        let snapshots = build_snapshots(
            &program(),
            &catalog,
            &BTreeMap::new(),
            &FlatProjection,
            now,
            ProvenanceId(1),
        )
        .expect("build");
        let mut partial = markers();
        partial.remove(&Horizon::H3);
        assert!(determine_absences(&snapshots, &partial).is_err());
    }
}
