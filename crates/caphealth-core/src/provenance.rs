//! # Provenance & Freeze Binder
//!
//! Stamps a run with the system time its evidence refers to, and binds each
//! horizon to an immutable freeze marker at that time.

use crate::store::HealthStore;
use crate::{
    BoundarySource, FreezeMarker, FreezeMarkerId, HealthError, Horizon, MutationState, ProgramId,
    ProvenanceId, ProvenanceRecord, RunId, Timestamp,
};
use std::collections::BTreeMap;

/// Write the provenance record for a run.
pub fn write_provenance<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    run_id: RunId,
    engine_code: &str,
    system_time: Timestamp,
    mutation_state: MutationState,
    meta: BTreeMap<String, String>,
) -> Result<ProvenanceRecord, HealthError> {
    let record = store.insert_provenance(ProvenanceRecord {
        id: ProvenanceId::default(),
        program_id: program.clone(),
        engine_code: engine_code.to_string(),
        run_id,
        system_time,
        mutation_state,
        meta,
    })?;
    tracing::debug!(
        program_id = %program,
        run_id = %run_id,
        provenance_id = %record.id,
        mutation_state = record.mutation_state.as_str(),
        "provenance written"
    );
    Ok(record)
}

/// Bind one freeze marker per horizon, all at `system_time`.
///
/// Windows are instantaneous: `window_start == window_end == system_time`.
/// Markers come back in the order of `horizons`.
pub fn bind_freeze_markers<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    run_id: RunId,
    horizons: &[Horizon],
    system_time: Timestamp,
) -> Result<Vec<FreezeMarker>, HealthError> {
    let markers = horizons
        .iter()
        .map(|&horizon| FreezeMarker {
            id: FreezeMarkerId::default(),
            program_id: program.clone(),
            run_id,
            horizon,
            window_start: system_time,
            window_end: system_time,
            system_time,
            boundary_source: BoundarySource::RunSystemTime,
        })
        .collect();
    let stored = store.insert_freeze_markers(markers)?;
    tracing::debug!(
        program_id = %program,
        run_id = %run_id,
        markers = stored.len(),
        "freeze markers bound"
    );
    Ok(stored)
}

/// Index markers by horizon.
#[must_use]
pub fn markers_by_horizon(markers: &[FreezeMarker]) -> BTreeMap<Horizon, FreezeMarkerId> {
    markers.iter().map(|m| (m.horizon, m.id)).collect()
}
