//! # Health Store
//!
//! The storage collaborator for the capability health engine.
//!
//! This module defines the `HealthStore` trait and `MemoryStore`, its
//! in-memory implementation. The redb-backed implementation lives in
//! [`crate::storage`]. All tables use `BTreeMap` for deterministic ordering.
//!
//! ## Contract
//!
//! - Ids are assigned by the store, starting at 1 per table. The id on a
//!   record passed to `insert_*` is ignored.
//! - Every `insert_*` taking a `Vec` writes the whole batch or nothing.
//! - Freeze markers, snapshots, absences and appeal links are append-only.
//! - Catalog rows are unique per `(program_id, node_code)`; requirement,
//!   redundancy and fragility rows are unique per node.

use crate::{
    AbsenceDetermination, AbsenceId, AppealIntakeLink, AppealLinkId, CapabilityNode,
    CapabilityNodeId, CapabilitySnapshot, CatalogEntry, ComputeQueueEntry, ComputeRun,
    CoverageRequirement, FreezeMarker, FreezeMarkerId, HealthError, HorizonFragilityVector,
    NodeDef, ProgramCapabilityAssignment, ProgramId, ProvenanceId, ProvenanceRecord, QueueId,
    RedundancyDepth, RunId, SnapshotId,
};
use std::collections::BTreeMap;

// =============================================================================
// HEALTHSTORE TRAIT
// =============================================================================

/// Scoped insert/update/read access to the nine persisted relations.
///
/// All fallible operations return `Result<T, HealthError>`; any backend
/// failure surfaces as `HealthError::Storage`.
pub trait HealthStore {
    /// Insert or update node definitions keyed by `(program, node_code)`.
    ///
    /// Returns node ids in input order. Re-seeding identical input returns the
    /// same ids and leaves the row count unchanged.
    fn upsert_catalog(
        &mut self,
        program: &ProgramId,
        defs: &[NodeDef],
    ) -> Result<Vec<CapabilityNodeId>, HealthError>;

    /// All catalog entries for a program, ordered by node id.
    fn catalog(&self, program: &ProgramId) -> Result<Vec<CatalogEntry>, HealthError>;

    /// Insert or update an assignment keyed by `(program, node, assignee)`.
    ///
    /// Returns `HealthError::NotFound` if the node is not in the program's catalog.
    fn upsert_assignment(
        &mut self,
        assignment: &ProgramCapabilityAssignment,
    ) -> Result<(), HealthError>;

    /// All assignments (active and inactive) for a program.
    fn assignments(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<ProgramCapabilityAssignment>, HealthError>;

    fn insert_queue_entry(
        &mut self,
        entry: ComputeQueueEntry,
    ) -> Result<ComputeQueueEntry, HealthError>;

    fn queue_entry(&self, id: QueueId) -> Result<Option<ComputeQueueEntry>, HealthError>;

    /// Overwrite an existing queue entry. `NotFound` if it does not exist.
    fn update_queue_entry(&mut self, entry: &ComputeQueueEntry) -> Result<(), HealthError>;

    /// Insert `run` and overwrite its queue entry in one write.
    ///
    /// Either both rows land or neither does. `NotFound` if the queue entry
    /// does not exist.
    fn begin_run(
        &mut self,
        run: ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<ComputeRun, HealthError>;

    fn run(&self, id: RunId) -> Result<Option<ComputeRun>, HealthError>;

    /// Overwrite an existing run and its queue entry in one write.
    ///
    /// Either both rows change or neither does. `NotFound` if either row
    /// does not exist.
    fn finish_run(
        &mut self,
        run: &ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<(), HealthError>;

    /// Runs ordered by id; `None` lists every program's runs.
    fn runs(&self, program: Option<&ProgramId>) -> Result<Vec<ComputeRun>, HealthError>;

    fn insert_provenance(
        &mut self,
        record: ProvenanceRecord,
    ) -> Result<ProvenanceRecord, HealthError>;

    fn provenance_for_run(&self, run: RunId) -> Result<Option<ProvenanceRecord>, HealthError>;

    fn insert_freeze_markers(
        &mut self,
        markers: Vec<FreezeMarker>,
    ) -> Result<Vec<FreezeMarker>, HealthError>;

    fn freeze_markers_for_run(&self, run: RunId) -> Result<Vec<FreezeMarker>, HealthError>;

    fn insert_snapshots(
        &mut self,
        snapshots: Vec<CapabilitySnapshot>,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError>;

    fn snapshots_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError>;

    fn insert_absences(
        &mut self,
        absences: Vec<AbsenceDetermination>,
    ) -> Result<Vec<AbsenceDetermination>, HealthError>;

    fn absences_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<AbsenceDetermination>, HealthError>;

    fn insert_appeal_links(
        &mut self,
        links: Vec<AppealIntakeLink>,
    ) -> Result<Vec<AppealIntakeLink>, HealthError>;

    fn appeal_links_for_program(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<AppealIntakeLink>, HealthError>;
}

impl<T: HealthStore + ?Sized> HealthStore for Box<T> {
    fn upsert_catalog(
        &mut self,
        program: &ProgramId,
        defs: &[NodeDef],
    ) -> Result<Vec<CapabilityNodeId>, HealthError> {
        (**self).upsert_catalog(program, defs)
    }

    fn catalog(&self, program: &ProgramId) -> Result<Vec<CatalogEntry>, HealthError> {
        (**self).catalog(program)
    }

    fn upsert_assignment(
        &mut self,
        assignment: &ProgramCapabilityAssignment,
    ) -> Result<(), HealthError> {
        (**self).upsert_assignment(assignment)
    }

    fn assignments(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<ProgramCapabilityAssignment>, HealthError> {
        (**self).assignments(program)
    }

    fn insert_queue_entry(
        &mut self,
        entry: ComputeQueueEntry,
    ) -> Result<ComputeQueueEntry, HealthError> {
        (**self).insert_queue_entry(entry)
    }

    fn queue_entry(&self, id: QueueId) -> Result<Option<ComputeQueueEntry>, HealthError> {
        (**self).queue_entry(id)
    }

    fn update_queue_entry(&mut self, entry: &ComputeQueueEntry) -> Result<(), HealthError> {
        (**self).update_queue_entry(entry)
    }

    fn begin_run(
        &mut self,
        run: ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<ComputeRun, HealthError> {
        (**self).begin_run(run, entry)
    }

    fn run(&self, id: RunId) -> Result<Option<ComputeRun>, HealthError> {
        (**self).run(id)
    }

    fn finish_run(
        &mut self,
        run: &ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<(), HealthError> {
        (**self).finish_run(run, entry)
    }

    fn runs(&self, program: Option<&ProgramId>) -> Result<Vec<ComputeRun>, HealthError> {
        (**self).runs(program)
    }

    fn insert_provenance(
        &mut self,
        record: ProvenanceRecord,
    ) -> Result<ProvenanceRecord, HealthError> {
        (**self).insert_provenance(record)
    }

    fn provenance_for_run(&self, run: RunId) -> Result<Option<ProvenanceRecord>, HealthError> {
        (**self).provenance_for_run(run)
    }

    fn insert_freeze_markers(
        &mut self,
        markers: Vec<FreezeMarker>,
    ) -> Result<Vec<FreezeMarker>, HealthError> {
        (**self).insert_freeze_markers(markers)
    }

    fn freeze_markers_for_run(&self, run: RunId) -> Result<Vec<FreezeMarker>, HealthError> {
        (**self).freeze_markers_for_run(run)
    }

    fn insert_snapshots(
        &mut self,
        snapshots: Vec<CapabilitySnapshot>,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        (**self).insert_snapshots(snapshots)
    }

    fn snapshots_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        (**self).snapshots_for_provenance(provenance)
    }

    fn insert_absences(
        &mut self,
        absences: Vec<AbsenceDetermination>,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        (**self).insert_absences(absences)
    }

    fn absences_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        (**self).absences_for_provenance(provenance)
    }

    fn insert_appeal_links(
        &mut self,
        links: Vec<AppealIntakeLink>,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        (**self).insert_appeal_links(links)
    }

    fn appeal_links_for_program(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        (**self).appeal_links_for_program(program)
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Per-table id counters. Each holds the last id handed out.
#[derive(Debug, Clone, Copy, Default)]
struct IdCounters {
    node: u64,
    queue: u64,
    run: u64,
    provenance: u64,
    freeze: u64,
    snapshot: u64,
    absence: u64,
    appeal: u64,
}

fn bump(counter: &mut u64) -> u64 {
    *counter = counter.saturating_add(1);
    *counter
}

/// In-memory store.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<CapabilityNodeId, CapabilityNode>,
    node_index: BTreeMap<(ProgramId, String), CapabilityNodeId>,
    requirements: BTreeMap<CapabilityNodeId, CoverageRequirement>,
    redundancy: BTreeMap<CapabilityNodeId, RedundancyDepth>,
    fragility: BTreeMap<CapabilityNodeId, HorizonFragilityVector>,
    assignments: BTreeMap<(ProgramId, CapabilityNodeId, String), ProgramCapabilityAssignment>,
    queue: BTreeMap<QueueId, ComputeQueueEntry>,
    runs: BTreeMap<RunId, ComputeRun>,
    provenance: BTreeMap<ProvenanceId, ProvenanceRecord>,
    freeze_markers: BTreeMap<FreezeMarkerId, FreezeMarker>,
    snapshots: BTreeMap<SnapshotId, CapabilitySnapshot>,
    absences: BTreeMap<AbsenceId, AbsenceDetermination>,
    appeals: BTreeMap<AppealLinkId, AppealIntakeLink>,
    ids: IdCounters,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of capability nodes across all programs.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl HealthStore for MemoryStore {
    fn upsert_catalog(
        &mut self,
        program: &ProgramId,
        defs: &[NodeDef],
    ) -> Result<Vec<CapabilityNodeId>, HealthError> {
        let mut ids = Vec::with_capacity(defs.len());
        for def in defs {
            let key = (program.clone(), def.node_code.clone());
            let id = match self.node_index.get(&key) {
                Some(&existing) => existing,
                None => {
                    let id = CapabilityNodeId(bump(&mut self.ids.node));
                    self.node_index.insert(key, id);
                    id
                }
            };
            let (node, requirement, redundancy, fragility) = rows_for_def(program, id, def);
            self.nodes.insert(id, node);
            self.requirements.insert(id, requirement);
            self.redundancy.insert(id, redundancy);
            self.fragility.insert(id, fragility);
            ids.push(id);
        }
        Ok(ids)
    }

    fn catalog(&self, program: &ProgramId) -> Result<Vec<CatalogEntry>, HealthError> {
        let mut entries = Vec::new();
        for node in self.nodes.values().filter(|n| &n.program_id == program) {
            let requirement = self.requirements.get(&node.id).cloned().ok_or_else(|| {
                HealthError::Storage(format!("missing coverage requirement for node {}", node.id))
            })?;
            let redundancy = self.redundancy.get(&node.id).cloned().ok_or_else(|| {
                HealthError::Storage(format!("missing redundancy depth for node {}", node.id))
            })?;
            let fragility = self.fragility.get(&node.id).cloned().ok_or_else(|| {
                HealthError::Storage(format!("missing fragility vector for node {}", node.id))
            })?;
            entries.push(CatalogEntry {
                node: node.clone(),
                requirement,
                redundancy,
                fragility,
            });
        }
        Ok(entries)
    }

    fn upsert_assignment(
        &mut self,
        assignment: &ProgramCapabilityAssignment,
    ) -> Result<(), HealthError> {
        match self.nodes.get(&assignment.capability_node_id) {
            Some(node) if node.program_id == assignment.program_id => {}
            _ => {
                return Err(HealthError::NotFound(format!(
                    "capability node {} in program {}",
                    assignment.capability_node_id, assignment.program_id
                )));
            }
        }
        let key = (
            assignment.program_id.clone(),
            assignment.capability_node_id,
            assignment.assignee.clone(),
        );
        self.assignments.insert(key, assignment.clone());
        Ok(())
    }

    fn assignments(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<ProgramCapabilityAssignment>, HealthError> {
        Ok(self
            .assignments
            .values()
            .filter(|a| &a.program_id == program)
            .cloned()
            .collect())
    }

    fn insert_queue_entry(
        &mut self,
        mut entry: ComputeQueueEntry,
    ) -> Result<ComputeQueueEntry, HealthError> {
        entry.id = QueueId(bump(&mut self.ids.queue));
        self.queue.insert(entry.id, entry.clone());
        Ok(entry)
    }

    fn queue_entry(&self, id: QueueId) -> Result<Option<ComputeQueueEntry>, HealthError> {
        Ok(self.queue.get(&id).cloned())
    }

    fn update_queue_entry(&mut self, entry: &ComputeQueueEntry) -> Result<(), HealthError> {
        match self.queue.get_mut(&entry.id) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(())
            }
            None => Err(HealthError::NotFound(format!("queue entry {}", entry.id))),
        }
    }

    fn begin_run(
        &mut self,
        mut run: ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<ComputeRun, HealthError> {
        if !self.queue.contains_key(&entry.id) {
            return Err(HealthError::NotFound(format!("queue entry {}", entry.id)));
        }
        run.id = RunId(bump(&mut self.ids.run));
        self.runs.insert(run.id, run.clone());
        self.queue.insert(entry.id, entry.clone());
        Ok(run)
    }

    fn run(&self, id: RunId) -> Result<Option<ComputeRun>, HealthError> {
        Ok(self.runs.get(&id).cloned())
    }

    fn finish_run(
        &mut self,
        run: &ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<(), HealthError> {
        if !self.runs.contains_key(&run.id) {
            return Err(HealthError::NotFound(format!("compute run {}", run.id)));
        }
        if !self.queue.contains_key(&entry.id) {
            return Err(HealthError::NotFound(format!("queue entry {}", entry.id)));
        }
        self.runs.insert(run.id, run.clone());
        self.queue.insert(entry.id, entry.clone());
        Ok(())
    }

    fn runs(&self, program: Option<&ProgramId>) -> Result<Vec<ComputeRun>, HealthError> {
        Ok(self
            .runs
            .values()
            .filter(|r| program.is_none_or(|p| &r.program_id == p))
            .cloned()
            .collect())
    }

    fn insert_provenance(
        &mut self,
        mut record: ProvenanceRecord,
    ) -> Result<ProvenanceRecord, HealthError> {
        record.id = ProvenanceId(bump(&mut self.ids.provenance));
        self.provenance.insert(record.id, record.clone());
        Ok(record)
    }

    fn provenance_for_run(&self, run: RunId) -> Result<Option<ProvenanceRecord>, HealthError> {
        Ok(self.provenance.values().find(|p| p.run_id == run).cloned())
    }

    fn insert_freeze_markers(
        &mut self,
        markers: Vec<FreezeMarker>,
    ) -> Result<Vec<FreezeMarker>, HealthError> {
        let mut stored = Vec::with_capacity(markers.len());
        for mut marker in markers {
            marker.id = FreezeMarkerId(bump(&mut self.ids.freeze));
            self.freeze_markers.insert(marker.id, marker.clone());
            stored.push(marker);
        }
        Ok(stored)
    }

    fn freeze_markers_for_run(&self, run: RunId) -> Result<Vec<FreezeMarker>, HealthError> {
        Ok(self
            .freeze_markers
            .values()
            .filter(|m| m.run_id == run)
            .cloned()
            .collect())
    }

    fn insert_snapshots(
        &mut self,
        snapshots: Vec<CapabilitySnapshot>,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        let mut stored = Vec::with_capacity(snapshots.len());
        for mut snapshot in snapshots {
            snapshot.id = SnapshotId(bump(&mut self.ids.snapshot));
            self.snapshots.insert(snapshot.id, snapshot.clone());
            stored.push(snapshot);
        }
        Ok(stored)
    }

    fn snapshots_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        Ok(self
            .snapshots
            .values()
            .filter(|s| s.provenance_id == provenance)
            .cloned()
            .collect())
    }

    fn insert_absences(
        &mut self,
        absences: Vec<AbsenceDetermination>,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        let mut stored = Vec::with_capacity(absences.len());
        for mut absence in absences {
            absence.id = AbsenceId(bump(&mut self.ids.absence));
            self.absences.insert(absence.id, absence.clone());
            stored.push(absence);
        }
        Ok(stored)
    }

    fn absences_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        Ok(self
            .absences
            .values()
            .filter(|a| a.provenance_id == provenance)
            .cloned()
            .collect())
    }

    fn insert_appeal_links(
        &mut self,
        links: Vec<AppealIntakeLink>,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        let mut stored = Vec::with_capacity(links.len());
        for mut link in links {
            link.id = AppealLinkId(bump(&mut self.ids.appeal));
            self.appeals.insert(link.id, link.clone());
            stored.push(link);
        }
        Ok(stored)
    }

    fn appeal_links_for_program(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        Ok(self
            .appeals
            .values()
            .filter(|l| &l.program_id == program)
            .cloned()
            .collect())
    }
}

/// Build the four catalog rows a node definition maps to.
pub(crate) fn rows_for_def(
    program: &ProgramId,
    id: CapabilityNodeId,
    def: &NodeDef,
) -> (
    CapabilityNode,
    CoverageRequirement,
    RedundancyDepth,
    HorizonFragilityVector,
) {
    (
        CapabilityNode {
            id,
            program_id: program.clone(),
            node_code: def.node_code.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
        },
        CoverageRequirement {
            node_id: id,
            program_id: program.clone(),
            min_coverage: def.min_coverage,
            is_active: def.requirement_active,
        },
        RedundancyDepth {
            node_id: id,
            program_id: program.clone(),
            min_depth: def.min_depth,
            is_active: def.redundancy_active,
        },
        HorizonFragilityVector {
            node_id: id,
            program_id: program.clone(),
            values_bp: def.fragility_bp,
        },
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ComputeReason, RunStatus};
    use chrono::DateTime;

    fn program(raw: &str) -> ProgramId {
        ProgramId::parse(raw).expect("program id")
    }

    #[test]
    fn upsert_catalog_is_idempotent() {
        let mut store = MemoryStore::new();
        let p = program("p1");
        let defs = vec![NodeDef::new("a", "A", 1), NodeDef::new("b", "B", 2)];

        let first = store.upsert_catalog(&p, &defs).expect("seed");
        let second = store.upsert_catalog(&p, &defs).expect("reseed");

        assert_eq!(first, second);
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.catalog(&p).expect("catalog").len(), 2);
    }

    #[test]
    fn upsert_catalog_updates_in_place() {
        let mut store = MemoryStore::new();
        let p = program("p1");
        let ids = store
            .upsert_catalog(&p, &[NodeDef::new("a", "A", 1)])
            .expect("seed");
        let again = store
            .upsert_catalog(&p, &[NodeDef::new("a", "Renamed", 3)])
            .expect("update");

        assert_eq!(ids, again);
        let catalog = store.catalog(&p).expect("catalog");
        assert_eq!(catalog[0].node.name, "Renamed");
        assert_eq!(catalog[0].requirement.min_coverage, 3);
    }

    #[test]
    fn same_code_in_two_programs_gets_two_nodes() {
        let mut store = MemoryStore::new();
        let a = store
            .upsert_catalog(&program("p1"), &[NodeDef::new("x", "X", 1)])
            .expect("seed");
        let b = store
            .upsert_catalog(&program("p2"), &[NodeDef::new("x", "X", 1)])
            .expect("seed");
        assert_ne!(a, b);
        assert_eq!(store.catalog(&program("p1")).expect("catalog").len(), 1);
    }

    #[test]
    fn assignment_requires_known_node() {
        let mut store = MemoryStore::new();
        let result = store.upsert_assignment(&ProgramCapabilityAssignment {
            program_id: program("p1"),
            capability_node_id: CapabilityNodeId(99),
            assignee: "coach".to_string(),
            is_active: true,
        });
        assert!(matches!(result, Err(HealthError::NotFound(_))));
    }

    #[test]
    fn assignment_from_other_program_rejected() {
        let mut store = MemoryStore::new();
        let ids = store
            .upsert_catalog(&program("p1"), &[NodeDef::new("x", "X", 1)])
            .expect("seed");
        let result = store.upsert_assignment(&ProgramCapabilityAssignment {
            program_id: program("p2"),
            capability_node_id: ids[0],
            assignee: "coach".to_string(),
            is_active: true,
        });
        assert!(result.is_err());
    }

    #[test]
    fn update_missing_queue_entry_fails() {
        let mut store = MemoryStore::new();
        let t = DateTime::from_timestamp_millis(0).expect("epoch");
        let entry = ComputeQueueEntry {
            id: QueueId(42),
            program_id: program("p1"),
            reason: ComputeReason::Manual,
            details: BTreeMap::new(),
            status: RunStatus::Queued,
            enqueued_at: t,
            updated_at: t,
        };
        assert!(matches!(
            store.update_queue_entry(&entry),
            Err(HealthError::NotFound(_))
        ));

        let stored = store.insert_queue_entry(entry).expect("insert");
        assert_eq!(stored.id, QueueId(1));
        assert!(store.update_queue_entry(&stored).is_ok());
    }

    fn queued(id: QueueId) -> ComputeQueueEntry {
        let t = DateTime::from_timestamp_millis(0).expect("epoch");
        ComputeQueueEntry {
            id,
            program_id: program("p1"),
            reason: ComputeReason::Manual,
            details: BTreeMap::new(),
            status: RunStatus::Queued,
            enqueued_at: t,
            updated_at: t,
        }
    }

    fn running(queue_id: QueueId) -> ComputeRun {
        ComputeRun {
            id: RunId::default(),
            queue_id,
            program_id: program("p1"),
            status: RunStatus::Running,
            started_at: None,
            finished_at: None,
            summary: None,
            error: None,
        }
    }

    #[test]
    fn begin_run_without_queue_entry_writes_nothing() {
        let mut store = MemoryStore::new();
        let result = store.begin_run(running(QueueId(5)), &queued(QueueId(5)));

        assert!(matches!(result, Err(HealthError::NotFound(_))));
        assert!(store.runs(None).expect("runs").is_empty());
    }

    #[test]
    fn begin_run_moves_both_rows() {
        let mut store = MemoryStore::new();
        let mut entry = store.insert_queue_entry(queued(QueueId(0))).expect("insert");
        entry.status = RunStatus::Running;

        let run = store.begin_run(running(entry.id), &entry).expect("begin");
        assert_eq!(run.id, RunId(1));
        assert_eq!(
            store.queue_entry(entry.id).expect("read").map(|e| e.status),
            Some(RunStatus::Running)
        );
    }

    #[test]
    fn finish_run_with_missing_queue_entry_changes_nothing() {
        let mut store = MemoryStore::new();
        let mut entry = store.insert_queue_entry(queued(QueueId(0))).expect("insert");
        entry.status = RunStatus::Running;
        let mut run = store.begin_run(running(entry.id), &entry).expect("begin");

        run.status = RunStatus::Succeeded;
        let mut stray = entry.clone();
        stray.id = QueueId(77);
        stray.status = RunStatus::Succeeded;

        assert!(matches!(
            store.finish_run(&run, &stray),
            Err(HealthError::NotFound(_))
        ));
        assert_eq!(
            store.run(run.id).expect("read").map(|r| r.status),
            Some(RunStatus::Running)
        );
    }
}
