//! # Validation Tier Tests (T0-T4)
//!
//! If ANY tier fails, the system is INVALID.
//!
//! ## Tiers
//! - T0: Catalog Integrity
//! - T1: Run Structure
//! - T2: Absence Correctness
//! - T3: Failure Containment
//! - T4: Recruiting Read Model

use caphealth_core::{
    AbsenceDetermination, AppealIntakeLink, CapabilityNodeId, CapabilitySnapshot, CatalogEntry,
    ComputeQueueEntry, ComputeRun, FreezeMarker, HealthComputeEngine, HealthError, HealthStore,
    Horizon, ManualClock, MemoryStore, NodeDef, ProgramCapabilityAssignment, ProgramId,
    ProvenanceId, ProvenanceRecord, QueueId, RunId, RunStatus, assign_node,
};
use chrono::DateTime;

fn t0() -> caphealth_core::Timestamp {
    DateTime::from_timestamp_millis(1_700_000_000_000).expect("valid")
}

fn program(raw: &str) -> ProgramId {
    ProgramId::parse(raw).expect("program id")
}

fn three_node_catalog() -> Vec<NodeDef> {
    vec![
        NodeDef::new("coaching_continuity", "Coaching Continuity", 1),
        NodeDef::new("compliance_authority", "Compliance Authority", 1),
        NodeDef::new("recruiting_function", "Recruiting Function", 1),
    ]
}

fn engine_on<S: HealthStore>(store: S) -> HealthComputeEngine<S, ManualClock> {
    HealthComputeEngine::with_clock(store, ManualClock::at(t0()))
        .with_catalog(three_node_catalog())
        .expect("catalog")
}

// =============================================================================
// FAULT-INJECTING STORE
// =============================================================================

/// Store step that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    BeginRun,
    ReadAssignments,
    InsertSnapshots,
    InsertAbsences,
    InsertAppealLinks,
    /// Fails the terminal write moving a run to this status.
    FinishRun(RunStatus),
}

/// `MemoryStore` wrapper that fails the configured steps.
#[derive(Debug, Default)]
struct FaultyStore {
    inner: MemoryStore,
    faults: Vec<Fault>,
}

impl FaultyStore {
    fn failing(faults: &[Fault]) -> Self {
        Self {
            inner: MemoryStore::new(),
            faults: faults.to_vec(),
        }
    }

    fn check(&self, fault: Fault) -> Result<(), HealthError> {
        if self.faults.contains(&fault) {
            Err(HealthError::Storage(format!("injected {:?} failure", fault)))
        } else {
            Ok(())
        }
    }
}

impl HealthStore for FaultyStore {
    fn upsert_catalog(
        &mut self,
        program: &ProgramId,
        defs: &[NodeDef],
    ) -> Result<Vec<CapabilityNodeId>, HealthError> {
        self.inner.upsert_catalog(program, defs)
    }

    fn catalog(&self, program: &ProgramId) -> Result<Vec<CatalogEntry>, HealthError> {
        self.inner.catalog(program)
    }

    fn upsert_assignment(
        &mut self,
        assignment: &ProgramCapabilityAssignment,
    ) -> Result<(), HealthError> {
        self.inner.upsert_assignment(assignment)
    }

    fn assignments(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<ProgramCapabilityAssignment>, HealthError> {
        self.check(Fault::ReadAssignments)?;
        self.inner.assignments(program)
    }

    fn insert_queue_entry(
        &mut self,
        entry: ComputeQueueEntry,
    ) -> Result<ComputeQueueEntry, HealthError> {
        self.inner.insert_queue_entry(entry)
    }

    fn queue_entry(&self, id: QueueId) -> Result<Option<ComputeQueueEntry>, HealthError> {
        self.inner.queue_entry(id)
    }

    fn update_queue_entry(&mut self, entry: &ComputeQueueEntry) -> Result<(), HealthError> {
        self.inner.update_queue_entry(entry)
    }

    fn begin_run(
        &mut self,
        run: ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<ComputeRun, HealthError> {
        self.check(Fault::BeginRun)?;
        self.inner.begin_run(run, entry)
    }

    fn run(&self, id: RunId) -> Result<Option<ComputeRun>, HealthError> {
        self.inner.run(id)
    }

    fn finish_run(
        &mut self,
        run: &ComputeRun,
        entry: &ComputeQueueEntry,
    ) -> Result<(), HealthError> {
        self.check(Fault::FinishRun(run.status))?;
        self.inner.finish_run(run, entry)
    }

    fn runs(&self, program: Option<&ProgramId>) -> Result<Vec<ComputeRun>, HealthError> {
        self.inner.runs(program)
    }

    fn insert_provenance(
        &mut self,
        record: ProvenanceRecord,
    ) -> Result<ProvenanceRecord, HealthError> {
        self.inner.insert_provenance(record)
    }

    fn provenance_for_run(&self, run: RunId) -> Result<Option<ProvenanceRecord>, HealthError> {
        self.inner.provenance_for_run(run)
    }

    fn insert_freeze_markers(
        &mut self,
        markers: Vec<FreezeMarker>,
    ) -> Result<Vec<FreezeMarker>, HealthError> {
        self.inner.insert_freeze_markers(markers)
    }

    fn freeze_markers_for_run(&self, run: RunId) -> Result<Vec<FreezeMarker>, HealthError> {
        self.inner.freeze_markers_for_run(run)
    }

    fn insert_snapshots(
        &mut self,
        snapshots: Vec<CapabilitySnapshot>,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        self.check(Fault::InsertSnapshots)?;
        self.inner.insert_snapshots(snapshots)
    }

    fn snapshots_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<CapabilitySnapshot>, HealthError> {
        self.inner.snapshots_for_provenance(provenance)
    }

    fn insert_absences(
        &mut self,
        absences: Vec<AbsenceDetermination>,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        self.check(Fault::InsertAbsences)?;
        self.inner.insert_absences(absences)
    }

    fn absences_for_provenance(
        &self,
        provenance: ProvenanceId,
    ) -> Result<Vec<AbsenceDetermination>, HealthError> {
        self.inner.absences_for_provenance(provenance)
    }

    fn insert_appeal_links(
        &mut self,
        links: Vec<AppealIntakeLink>,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        self.check(Fault::InsertAppealLinks)?;
        self.inner.insert_appeal_links(links)
    }

    fn appeal_links_for_program(
        &self,
        program: &ProgramId,
    ) -> Result<Vec<AppealIntakeLink>, HealthError> {
        self.inner.appeal_links_for_program(program)
    }
}

/// Snapshot and absence rows chained from a run's provenance.
fn evidence_for_run<S: HealthStore>(
    store: &S,
    run: RunId,
) -> (Vec<CapabilitySnapshot>, Vec<AbsenceDetermination>) {
    match store.provenance_for_run(run).expect("read provenance") {
        Some(p) => (
            store.snapshots_for_provenance(p.id).expect("read snapshots"),
            store.absences_for_provenance(p.id).expect("read absences"),
        ),
        None => (Vec::new(), Vec::new()),
    }
}

// =============================================================================
// TIER T0: CATALOG INTEGRITY
// =============================================================================

mod t0_catalog_integrity {
    use super::*;
    use caphealth_core::seed_or_update_nodes;

    /// T0.1: Seeding the same node set twice yields |N| rows and identical ids.
    #[test]
    fn seeding_twice_yields_same_rows_and_ids() {
        let mut store = MemoryStore::new();
        let p = program("club-a");

        let first = seed_or_update_nodes(&mut store, &p, &three_node_catalog()).expect("seed");
        let second = seed_or_update_nodes(&mut store, &p, &three_node_catalog()).expect("reseed");

        assert_eq!(first, second);
        assert_eq!(store.catalog(&p).expect("catalog").len(), 3);
    }

    /// T0.2: Repeated compute runs do not duplicate the catalog.
    #[test]
    fn runs_reseed_without_duplicates() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        engine.run_health_compute("club-a");

        let p = program("club-a");
        assert_eq!(engine.store().catalog(&p).expect("catalog").len(), 3);
    }

    /// T0.3: Programs are isolated from each other.
    #[test]
    fn programs_are_isolated() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        assign_node(
            engine.store_mut(),
            &program("club-a"),
            "coaching_continuity",
            "kim",
            true,
        )
        .expect("assign");

        let b = engine.run_health_compute("club-b");
        assert_eq!(b.absence_count, Some(12));
    }

    /// T0.4: A blank program id is a validation error with no writes.
    #[test]
    fn blank_program_id_writes_nothing() {
        let mut engine = engine_on(MemoryStore::new());
        let outcome = engine.run_health_compute("");

        assert!(!outcome.success);
        assert!(outcome.queue_id.is_none());
        assert!(outcome.run_id.is_none());
        assert!(engine.store().runs(None).expect("runs").is_empty());
        assert_eq!(engine.store().node_count(), 0);
    }
}

// =============================================================================
// TIER T1: RUN STRUCTURE
// =============================================================================

mod t1_run_structure {
    use super::*;

    /// T1.1: Every successful run writes exactly 4 markers and 4 snapshots.
    #[test]
    fn four_markers_and_four_snapshots_per_run() {
        let mut engine = engine_on(MemoryStore::new());
        for _ in 0..3 {
            let outcome = engine.run_health_compute("club-a");
            let run_id = outcome.run_id.expect("run id");

            let markers = engine.store().freeze_markers_for_run(run_id).expect("markers");
            assert_eq!(markers.len(), 4);
            let horizons: Vec<Horizon> = markers.iter().map(|m| m.horizon).collect();
            assert_eq!(horizons, Horizon::ALL.to_vec());

            let (snapshots, _) = evidence_for_run(engine.store(), run_id);
            assert_eq!(snapshots.len(), 4);
        }
    }

    /// T1.2: All markers of a run share one system time equal to provenance.
    #[test]
    fn markers_share_provenance_time() {
        let mut engine = engine_on(MemoryStore::new());
        let run_id = engine.run_health_compute("club-a").run_id.expect("run id");

        let provenance = engine
            .store()
            .provenance_for_run(run_id)
            .expect("read")
            .expect("present");
        for marker in engine.store().freeze_markers_for_run(run_id).expect("markers") {
            assert_eq!(marker.system_time, provenance.system_time);
            assert_eq!(marker.window_start, provenance.system_time);
            assert_eq!(marker.window_end, provenance.system_time);
        }
    }

    /// T1.3: Run and queue both end SUCCEEDED; the run owns its queue entry.
    #[test]
    fn run_and_queue_succeed_together() {
        let mut engine = engine_on(MemoryStore::new());
        let outcome = engine.run_health_compute("club-a");
        assert!(outcome.success);

        let run = engine
            .store()
            .run(outcome.run_id.expect("run id"))
            .expect("read")
            .expect("present");
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(Some(run.queue_id), outcome.queue_id);
        assert!(run.finished_at.is_some());

        let queue = engine
            .store()
            .queue_entry(run.queue_id)
            .expect("read")
            .expect("present");
        assert_eq!(queue.status, RunStatus::Succeeded);
    }

    /// T1.4: Latest run detail verifies its snapshot digests.
    #[test]
    fn latest_run_detail_is_consistent() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        let second = engine.run_health_compute("club-a");

        let detail = caphealth_core::latest_run_detail(engine.store(), &program("club-a"))
            .expect("read")
            .expect("present");
        assert_eq!(Some(detail.run.id), second.run_id);
        assert!(detail.digests_verified);
        assert_eq!(detail.appeal_links.len(), detail.absences.len());

        let runs = caphealth_core::list_runs(engine.store(), &program("club-a")).expect("runs");
        assert_eq!(runs.len(), 2);
        assert!(runs[0].id > runs[1].id);
    }
}

// =============================================================================
// TIER T2: ABSENCE CORRECTNESS
// =============================================================================

mod t2_absence_correctness {
    use super::*;

    /// Scenario A: three uncovered nodes produce 12 absences.
    #[test]
    fn scenario_a_zero_assignments() {
        let mut engine = engine_on(MemoryStore::new());
        let outcome = engine.run_health_compute("club-a");

        assert!(outcome.success);
        assert_eq!(outcome.snapshot_count, Some(4));
        assert_eq!(outcome.absence_count, Some(12));
    }

    /// Scenario B: covering one node removes its 4 absences.
    #[test]
    fn scenario_b_one_assignment() {
        let mut engine = engine_on(MemoryStore::new());
        let p = program("club-a");
        engine.run_health_compute("club-a");
        assign_node(engine.store_mut(), &p, "recruiting_function", "lee", true).expect("assign");

        let outcome = engine.run_health_compute("club-a");
        assert!(outcome.success);
        assert_eq!(outcome.absence_count, Some(9));

        let (_, absences) = evidence_for_run(engine.store(), outcome.run_id.expect("run id"));
        assert!(
            absences
                .iter()
                .all(|a| a.evidence.node_code != "recruiting_function")
        );
        for code in ["coaching_continuity", "compliance_authority"] {
            assert_eq!(
                absences
                    .iter()
                    .filter(|a| a.evidence.node_code == code)
                    .count(),
                4
            );
        }
    }

    /// T2.1: Inactive assignments do not count as coverage.
    #[test]
    fn inactive_assignment_is_not_coverage() {
        let mut engine = engine_on(MemoryStore::new());
        let p = program("club-a");
        engine.run_health_compute("club-a");
        assign_node(engine.store_mut(), &p, "recruiting_function", "lee", false).expect("assign");

        let outcome = engine.run_health_compute("club-a");
        assert_eq!(outcome.absence_count, Some(12));
    }

    /// T2.2: Each absence references its own horizon's marker from the same run.
    #[test]
    fn absences_reference_same_run_markers() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        let outcome = engine.run_health_compute("club-a");
        let run_id = outcome.run_id.expect("run id");

        let markers = engine.store().freeze_markers_for_run(run_id).expect("markers");
        let provenance = engine
            .store()
            .provenance_for_run(run_id)
            .expect("read")
            .expect("present");
        let (_, absences) = evidence_for_run(engine.store(), run_id);
        assert_eq!(absences.len(), 12);

        for absence in &absences {
            let marker = markers
                .iter()
                .find(|m| m.id == absence.freeze_marker_id)
                .expect("marker from this run");
            assert_eq!(marker.horizon, absence.horizon);
            assert_eq!(absence.provenance_id, provenance.id);
            assert_eq!(absence.evidence.system_time, provenance.system_time);
        }
    }

    /// T2.3: Coverage equal to the minimum is satisfied; min 0 is never violated.
    #[test]
    fn boundary_coverage_values() {
        let store = MemoryStore::new();
        let catalog = vec![
            NodeDef::new("exact", "Exact", 2),
            NodeDef::new("optional", "Optional", 0),
            NodeDef::new("short", "Short", 2),
        ];
        let mut engine = HealthComputeEngine::with_clock(store, ManualClock::at(t0()))
            .with_catalog(catalog)
            .expect("catalog");
        let p = program("club-a");
        engine.run_health_compute("club-a");
        assign_node(engine.store_mut(), &p, "exact", "a", true).expect("assign");
        assign_node(engine.store_mut(), &p, "exact", "b", true).expect("assign");
        assign_node(engine.store_mut(), &p, "short", "c", true).expect("assign");

        let outcome = engine.run_health_compute("club-a");
        let (_, absences) = evidence_for_run(engine.store(), outcome.run_id.expect("run id"));
        assert_eq!(absences.len(), 4);
        assert!(absences.iter().all(|a| a.evidence.node_code == "short"));
    }

    /// T2.4: Inactive requirements are snapshotted but never absent.
    #[test]
    fn inactive_requirement_never_absent() {
        let mut inactive = NodeDef::new("dormant", "Dormant", 3);
        inactive.requirement_active = false;
        let mut engine = HealthComputeEngine::with_clock(MemoryStore::new(), ManualClock::at(t0()))
            .with_catalog(vec![inactive])
            .expect("catalog");

        let outcome = engine.run_health_compute("club-a");
        assert_eq!(outcome.absence_count, Some(0));
        let (snapshots, _) = evidence_for_run(engine.store(), outcome.run_id.expect("run id"));
        assert!(snapshots.iter().all(|s| s.entries.len() == 1));
    }

    /// T2.5: Appeal links match absences one to one.
    #[test]
    fn appeal_links_match_absences() {
        let mut engine = engine_on(MemoryStore::new());
        let outcome = engine.run_health_compute("club-a");
        let (_, absences) = evidence_for_run(engine.store(), outcome.run_id.expect("run id"));

        let links = engine
            .store()
            .appeal_links_for_program(&program("club-a"))
            .expect("links");
        assert_eq!(links.len(), absences.len());
        for absence in &absences {
            assert_eq!(
                links
                    .iter()
                    .filter(|l| l.determination_id == absence.id)
                    .count(),
                1
            );
        }
    }
}

// =============================================================================
// TIER T3: FAILURE CONTAINMENT
// =============================================================================

mod t3_failure_containment {
    use super::*;

    fn statuses<S: HealthStore>(store: &S, run: RunId) -> (RunStatus, RunStatus) {
        let run = store.run(run).expect("read").expect("run present");
        let queue = store
            .queue_entry(run.queue_id)
            .expect("read")
            .expect("queue present");
        (run.status, queue.status)
    }

    /// T3.1: A failing coverage read leaves zero snapshots and absences.
    #[test]
    fn coverage_read_failure_writes_no_evidence() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::ReadAssignments]));
        let outcome = engine.run_health_compute("club-a");

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().is_some_and(|e| e.contains("injected")));
        let run_id = outcome.run_id.expect("run id allocated");
        assert!(outcome.queue_id.is_some());

        let (snapshots, absences) = evidence_for_run(engine.store(), run_id);
        assert!(snapshots.is_empty());
        assert!(absences.is_empty());
        assert_eq!(
            statuses(engine.store(), run_id),
            (RunStatus::Failed, RunStatus::Failed)
        );
    }

    /// T3.2: A failing absence batch leaves no absences and fails the run.
    #[test]
    fn absence_batch_failure_is_atomic() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::InsertAbsences]));
        let outcome = engine.run_health_compute("club-a");
        let run_id = outcome.run_id.expect("run id");

        let (snapshots, absences) = evidence_for_run(engine.store(), run_id);
        assert_eq!(snapshots.len(), 4);
        assert!(absences.is_empty());
        assert_eq!(
            statuses(engine.store(), run_id),
            (RunStatus::Failed, RunStatus::Failed)
        );
    }

    /// T3.3: A failing snapshot batch never reaches absence evaluation.
    #[test]
    fn snapshot_failure_stops_pipeline() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::InsertSnapshots]));
        let outcome = engine.run_health_compute("club-a");
        let run_id = outcome.run_id.expect("run id");

        let (snapshots, absences) = evidence_for_run(engine.store(), run_id);
        assert!(snapshots.is_empty());
        assert!(absences.is_empty());
    }

    /// T3.4: Run allocation failure fails the queue entry and leaves no run.
    #[test]
    fn run_allocation_failure_fails_queue() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::BeginRun]));
        let outcome = engine.run_health_compute("club-a");

        assert!(!outcome.success);
        assert!(outcome.run_id.is_none());
        assert!(engine.store().runs(None).expect("runs").is_empty());
        let queue_id = outcome.queue_id.expect("queue id");
        let queue = engine
            .store()
            .queue_entry(queue_id)
            .expect("read")
            .expect("present");
        assert_eq!(queue.status, RunStatus::Failed);
    }

    /// T3.5: When marking FAILED itself fails, the original error is reported.
    #[test]
    fn original_error_survives_failed_fail_handler() {
        let mut engine = engine_on(FaultyStore::failing(&[
            Fault::InsertSnapshots,
            Fault::FinishRun(RunStatus::Failed),
        ]));
        let outcome = engine.run_health_compute("club-a");

        assert!(!outcome.success);
        let error = outcome.error.expect("error");
        assert!(error.contains("InsertSnapshots"), "{}", error);
        assert!(outcome.run_id.is_some());
    }

    /// T3.6: A failed appeal batch does not leave a succeeded run behind.
    #[test]
    fn appeal_failure_is_not_success() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::InsertAppealLinks]));
        let outcome = engine.run_health_compute("club-a");

        assert!(!outcome.success);
        assert!(outcome.absence_count.is_none());
        assert!(
            caphealth_core::latest_run_detail(engine.store(), &program("club-a"))
                .expect("read")
                .is_none()
        );
    }

    /// T3.8: A failed completion write fails both rows and publishes nothing.
    #[test]
    fn completion_write_failure_is_not_success() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::FinishRun(
            RunStatus::Succeeded,
        )]));
        let outcome = engine.run_health_compute("club-a");

        assert!(!outcome.success);
        let run_id = outcome.run_id.expect("run id");
        assert_eq!(
            statuses(engine.store(), run_id),
            (RunStatus::Failed, RunStatus::Failed)
        );
        assert!(
            caphealth_core::latest_run_detail(engine.store(), &program("club-a"))
                .expect("read")
                .is_none()
        );
    }

    /// T3.7: A retry after failure allocates a fresh queue entry and run.
    #[test]
    fn retry_after_failure_uses_new_rows() {
        let mut engine = engine_on(FaultyStore::failing(&[Fault::ReadAssignments]));
        let failed = engine.run_health_compute("club-a");

        engine.store_mut().faults.clear();
        let retried = engine.run_health_compute("club-a");

        assert!(retried.success);
        assert_ne!(failed.run_id, retried.run_id);
        assert_ne!(failed.queue_id, retried.queue_id);
        assert_eq!(
            statuses(engine.store(), failed.run_id.expect("run id")),
            (RunStatus::Failed, RunStatus::Failed)
        );
    }
}

// =============================================================================
// TIER T4: RECRUITING READ MODEL
// =============================================================================

mod t4_recruiting_read_model {
    use super::*;
    use caphealth_core::{
        Contribution, ProfileClassifier, RecruitCandidate, RecruitingImpactReader,
        StabilizationBand,
    };

    fn candidate(id: &str, node: &str, confidence_bp: u32) -> RecruitCandidate {
        RecruitCandidate {
            id: id.to_string(),
            name: id.to_string(),
            is_active: true,
            confidence_bp,
            arrival: Horizon::H0,
            contributions: vec![Contribution {
                node_code: node.to_string(),
                units: 1,
            }],
            rationale: vec!["former assistant".to_string()],
        }
    }

    /// Scenario C: 9 recruitable absences, then none after full coverage.
    #[test]
    fn scenario_c_band_follows_latest_run() {
        let mut engine = engine_on(MemoryStore::new());
        let p = program("club-a");
        engine.run_health_compute("club-a");
        assign_node(engine.store_mut(), &p, "recruiting_function", "lee", true).expect("assign");
        engine.run_health_compute("club-a");

        let classifier = ProfileClassifier::uniform("athletics");
        let view = RecruitingImpactReader::new(engine.store(), &classifier)
            .read(&p, None, &[])
            .expect("read");
        assert_eq!(view.stabilization.band, StabilizationBand::StabilizingRequired);
        assert_eq!(view.stabilization.recruitable_absence_count, 9);
        assert_eq!(view.recruitable_absences.get("athletics").map(Vec::len), Some(9));

        assign_node(engine.store_mut(), &p, "coaching_continuity", "kim", true).expect("assign");
        assign_node(engine.store_mut(), &p, "compliance_authority", "rae", true).expect("assign");
        let last = engine.run_health_compute("club-a");
        assert_eq!(last.absence_count, Some(0));

        let view = RecruitingImpactReader::new(engine.store(), &classifier)
            .read(&p, None, &[])
            .expect("read");
        assert_eq!(view.stabilization.band, StabilizationBand::WithinTolerances);
        assert_eq!(view.stabilization.recruitable_absence_count, 0);
        assert_eq!(view.run_id, last.run_id);
    }

    /// T4.1: No completed run reads as within tolerances with no run id.
    #[test]
    fn no_run_is_within_tolerances() {
        let store = MemoryStore::new();
        let classifier = ProfileClassifier::uniform("athletics");
        let view = RecruitingImpactReader::new(&store, &classifier)
            .read(&program("club-a"), None, &[])
            .expect("read");
        assert_eq!(view.stabilization.band, StabilizationBand::WithinTolerances);
        assert!(view.run_id.is_none());
        assert!(view.stabilization.message.contains("No completed"));
    }

    /// T4.2: Horizon filter narrows the recruitable set.
    #[test]
    fn horizon_filter() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        let classifier = ProfileClassifier::uniform("athletics");
        let view = RecruitingImpactReader::new(engine.store(), &classifier)
            .read(&program("club-a"), Some(Horizon::H2), &[])
            .expect("read");
        assert_eq!(view.stabilization.recruitable_absence_count, 3);
        assert!(
            view.recruitable_absences
                .values()
                .flatten()
                .all(|a| a.horizon == Horizon::H2)
        );
    }

    /// T4.3: Only classified absences count, grouped by sector.
    #[test]
    fn classification_groups_by_sector() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        let classifier = ProfileClassifier::new()
            .with_profile("coaching_continuity", "coaching", "assistant coach")
            .with_profile("recruiting_function", "operations", "");
        let view = RecruitingImpactReader::new(engine.store(), &classifier)
            .read(&program("club-a"), None, &[])
            .expect("read");

        assert_eq!(view.stabilization.recruitable_absence_count, 8);
        assert_eq!(view.recruitable_absences.len(), 2);
        let coaching = view.recruitable_absences.get("coaching").expect("sector");
        assert!(coaching.iter().all(|a| a.notes == "assistant coach"));
    }

    /// T4.4: Cohorts rank candidates by tier and skip inactive ones.
    #[test]
    fn cohorts_are_ranked() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        let classifier = ProfileClassifier::uniform("athletics");

        let strong = candidate("strong", "coaching_continuity", 10_000);
        let weak = candidate("weak", "unknown_node", 10_000);
        let mut gone = candidate("gone", "coaching_continuity", 10_000);
        gone.is_active = false;

        let view = RecruitingImpactReader::new(engine.store(), &classifier)
            .read(&program("club-a"), None, &[weak, gone, strong])
            .expect("read");

        assert_eq!(view.cohorts.len(), 2);
        assert_eq!(view.cohorts[0].candidate_id, "strong");
        // four horizons at a full 10 000 bp each
        assert_eq!(view.cohorts[0].total_impact_bp, 40_000);
        assert_eq!(view.cohorts[0].tier, 0);
        assert_eq!(view.cohorts[1].candidate_id, "weak");
        assert_eq!(view.cohorts[1].tier, 3);
    }

    /// T4.5: Reading is repeatable and leaves the store untouched.
    #[test]
    fn reads_are_repeatable() {
        let mut engine = engine_on(MemoryStore::new());
        engine.run_health_compute("club-a");
        let classifier = ProfileClassifier::uniform("athletics");
        let reader = RecruitingImpactReader::new(engine.store(), &classifier);

        let a = reader.read(&program("club-a"), None, &[]).expect("read");
        let b = reader.read(&program("club-a"), None, &[]).expect("read");
        assert_eq!(a, b);
    }
}

// =============================================================================
// BACKEND PARITY
// =============================================================================

mod redb_backend {
    use super::*;
    use caphealth_core::RedbStore;
    use tempfile::tempdir;

    /// Scenarios A and B hold on the redb backend, across a reopen.
    #[test]
    fn scenarios_hold_on_redb() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("health.redb");
        let p = program("club-a");

        {
            let mut engine = engine_on(RedbStore::open(&db_path).expect("open db"));
            let outcome = engine.run_health_compute("club-a");
            assert!(outcome.success, "{:?}", outcome.error);
            assert_eq!(outcome.absence_count, Some(12));
        }

        {
            let mut engine = engine_on(RedbStore::open(&db_path).expect("open db"));
            assign_node(engine.store_mut(), &p, "coaching_continuity", "kim", true)
                .expect("assign");
            let outcome = engine.run_health_compute("club-a");
            assert_eq!(outcome.absence_count, Some(9));
            assert_eq!(outcome.run_id, Some(RunId(2)));

            let detail = caphealth_core::latest_run_detail(engine.store(), &p)
                .expect("read")
                .expect("present");
            assert_eq!(detail.snapshots.len(), 4);
            assert_eq!(detail.freeze_markers.len(), 4);
            assert_eq!(detail.appeal_links.len(), 9);
            assert!(detail.digests_verified);
            assert_eq!(engine.store().node_count().expect("count"), 3);
        }
    }
}
