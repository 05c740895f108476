//! # Run Inspection
//!
//! Read-only views over finished runs: history and the full evidence set of
//! the latest succeeded run.

use crate::snapshot::verify_snapshot;
use crate::store::HealthStore;
use crate::{
    AbsenceDetermination, AppealIntakeLink, CapabilitySnapshot, ComputeRun, FreezeMarker,
    HealthError, ProgramId, ProvenanceRecord, RunStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything a run wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDetail {
    pub run: ComputeRun,
    pub provenance: ProvenanceRecord,
    pub freeze_markers: Vec<FreezeMarker>,
    pub snapshots: Vec<CapabilitySnapshot>,
    pub absences: Vec<AbsenceDetermination>,
    pub appeal_links: Vec<AppealIntakeLink>,
    /// Every snapshot digest matched its content.
    pub digests_verified: bool,
}

/// Runs for a program, newest first.
pub fn list_runs<S: HealthStore + ?Sized>(
    store: &S,
    program: &ProgramId,
) -> Result<Vec<ComputeRun>, HealthError> {
    let mut runs = store.runs(Some(program))?;
    runs.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(runs)
}

/// The most recent `SUCCEEDED` run for a program, if any.
pub fn latest_succeeded_run<S: HealthStore + ?Sized>(
    store: &S,
    program: &ProgramId,
) -> Result<Option<ComputeRun>, HealthError> {
    Ok(store
        .runs(Some(program))?
        .into_iter()
        .filter(|run| run.status == RunStatus::Succeeded)
        .max_by_key(|run| run.id))
}

/// Load a run's provenance and everything chained from it.
pub fn run_detail<S: HealthStore + ?Sized>(
    store: &S,
    run: ComputeRun,
) -> Result<RunDetail, HealthError> {
    let provenance = store
        .provenance_for_run(run.id)?
        .ok_or_else(|| HealthError::NotFound(format!("provenance for run {}", run.id)))?;
    let freeze_markers = store.freeze_markers_for_run(run.id)?;
    let snapshots = store.snapshots_for_provenance(provenance.id)?;
    let absences = store.absences_for_provenance(provenance.id)?;

    let absence_ids: BTreeSet<_> = absences.iter().map(|a| a.id).collect();
    let appeal_links = store
        .appeal_links_for_program(&run.program_id)?
        .into_iter()
        .filter(|link| absence_ids.contains(&link.determination_id))
        .collect();

    let mut digests_verified = true;
    for snapshot in &snapshots {
        digests_verified &= verify_snapshot(snapshot)?;
    }

    Ok(RunDetail {
        run,
        provenance,
        freeze_markers,
        snapshots,
        absences,
        appeal_links,
        digests_verified,
    })
}

/// Detail of the latest succeeded run, or `None` if the program has none.
pub fn latest_run_detail<S: HealthStore + ?Sized>(
    store: &S,
    program: &ProgramId,
) -> Result<Option<RunDetail>, HealthError> {
    match latest_succeeded_run(store, program)? {
        Some(run) => Ok(Some(run_detail(store, run)?)),
        None => Ok(None),
    }
}
