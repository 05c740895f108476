//! # Capability Health Compute Engine
//!
//! The pipeline entrypoint. One call runs the whole compute synchronously:
//!
//! ```text
//! seed missing nodes -> enqueue -> start run -> provenance -> freeze markers
//!   -> count coverage -> snapshots -> absences -> appeal links -> complete
//! ```
//!
//! Each step starts only after the previous step's writes returned. Any error
//! after a queue or run id has been allocated is caught by a guard that moves
//! whichever rows exist to `FAILED`; the original error is always reported.

use crate::appeal::link_appeals;
use crate::catalog::{default_catalog, seed_missing_nodes, validate_node_defs};
use crate::clock::{Clock, SystemClock};
use crate::orchestrator;
use crate::primitives::ENGINE_CODE;
use crate::provenance::{bind_freeze_markers, markers_by_horizon, write_provenance};
use crate::reconcile::sweep_stale_runs;
use crate::snapshot::{
    FlatProjection, HorizonProjection, count_active_coverage, determine_absences,
    write_absences, write_snapshots,
};
use crate::store::HealthStore;
use crate::{
    ComputeReason, ComputeRun, HealthError, Horizon, MutationState, NodeDef, ProgramId, QueueId,
    RunId, RunSummary,
};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured result of a compute. Never an error: failures set
/// `success = false` and carry whatever ids were allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<QueueId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absence_count: Option<usize>,
}

/// Ids handed out so far by the current pipeline call.
#[derive(Debug, Default, Clone, Copy)]
struct Allocated {
    queue_id: Option<QueueId>,
    run_id: Option<RunId>,
}

/// Runs the capability health pipeline against a store.
pub struct HealthComputeEngine<S, C = SystemClock> {
    store: S,
    clock: C,
    engine_code: String,
    catalog: Vec<NodeDef>,
    projection: Box<dyn HorizonProjection>,
}

impl<S, C> std::fmt::Debug for HealthComputeEngine<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthComputeEngine")
            .field("engine_code", &self.engine_code)
            .field("catalog_nodes", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl<S: HealthStore> HealthComputeEngine<S, SystemClock> {
    /// Engine on the wall clock with the default catalog.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: HealthStore, C: Clock> HealthComputeEngine<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            engine_code: ENGINE_CODE.to_string(),
            catalog: default_catalog(),
            projection: Box::new(FlatProjection),
        }
    }

    /// Replace the catalog seeded at the start of every run.
    ///
    /// Only node codes the program lacks are inserted by a run.
    pub fn with_catalog(mut self, catalog: Vec<NodeDef>) -> Result<Self, HealthError> {
        validate_node_defs(&catalog)?;
        self.catalog = catalog;
        Ok(self)
    }

    /// Override the engine code stamped on provenance records.
    pub fn with_engine_code(mut self, engine_code: impl Into<String>) -> Result<Self, HealthError> {
        let engine_code = engine_code.into();
        if engine_code.trim().is_empty() {
            return Err(HealthError::Validation("engine_code is required".to_string()));
        }
        self.engine_code = engine_code;
        Ok(self)
    }

    #[must_use]
    pub fn with_projection(mut self, projection: impl HorizonProjection + 'static) -> Self {
        self.projection = Box::new(projection);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn engine_code(&self) -> &str {
        &self.engine_code
    }

    /// Node definitions seeded by every run.
    pub fn catalog(&self) -> &[NodeDef] {
        &self.catalog
    }

    /// Run the pipeline for a manual trigger.
    pub fn run_health_compute(&mut self, program_id: &str) -> ComputeOutcome {
        self.run_health_compute_with(program_id, ComputeReason::Manual, BTreeMap::new())
    }

    /// Run the pipeline with an explicit reason and details.
    pub fn run_health_compute_with(
        &mut self,
        program_id: &str,
        reason: ComputeReason,
        details: BTreeMap<String, String>,
    ) -> ComputeOutcome {
        let program = match ProgramId::parse(program_id) {
            Ok(program) => program,
            Err(e) => {
                tracing::warn!(error = %e, "compute rejected");
                return ComputeOutcome {
                    success: false,
                    error: Some(e.to_string()),
                    queue_id: None,
                    run_id: None,
                    snapshot_count: None,
                    absence_count: None,
                };
            }
        };

        let mut allocated = Allocated::default();
        match self.execute(&program, reason, details, &mut allocated) {
            Ok(summary) => ComputeOutcome {
                success: true,
                error: None,
                queue_id: allocated.queue_id,
                run_id: allocated.run_id,
                snapshot_count: Some(summary.snapshot_count),
                absence_count: Some(summary.absence_count),
            },
            Err(e) => {
                self.fail_allocated(&program, allocated, &e);
                ComputeOutcome {
                    success: false,
                    error: Some(e.to_string()),
                    queue_id: allocated.queue_id,
                    run_id: allocated.run_id,
                    snapshot_count: None,
                    absence_count: None,
                }
            }
        }
    }

    fn execute(
        &mut self,
        program: &ProgramId,
        reason: ComputeReason,
        details: BTreeMap<String, String>,
        allocated: &mut Allocated,
    ) -> Result<RunSummary, HealthError> {
        let store = &mut self.store;

        let node_ids = seed_missing_nodes(store, program, &self.catalog)?;

        let entry = orchestrator::enqueue(store, program, reason, details, self.clock.now())?;
        allocated.queue_id = Some(entry.id);

        let run = orchestrator::start_run(store, entry.id, self.clock.now())?;
        allocated.run_id = Some(run.id);
        let system_time = run.started_at.ok_or_else(|| {
            HealthError::Storage(format!("run {} has no start time", run.id))
        })?;

        let mut meta = BTreeMap::new();
        meta.insert("reason".to_string(), reason.as_str().to_string());
        meta.insert("queue_id".to_string(), entry.id.to_string());
        meta.insert("node_count".to_string(), node_ids.len().to_string());
        let provenance = write_provenance(
            store,
            program,
            run.id,
            &self.engine_code,
            system_time,
            MutationState::PreFreeze,
            meta,
        )?;

        let markers = bind_freeze_markers(store, program, run.id, &Horizon::ALL, system_time)?;

        let catalog = store.catalog(program)?;
        let counts = count_active_coverage(&store.assignments(program)?);

        let snapshots = write_snapshots(
            store,
            program,
            &catalog,
            &counts,
            self.projection.as_ref(),
            system_time,
            provenance.id,
        )?;

        let absences = determine_absences(&snapshots, &markers_by_horizon(&markers))?;
        let absences = write_absences(store, absences)?;

        let links = link_appeals(store, &absences)?;

        let summary = RunSummary {
            node_count: catalog.len(),
            snapshot_count: snapshots.len(),
            absence_count: absences.len(),
            appeal_count: links.len(),
        };
        orchestrator::complete(store, run.id, summary, self.clock.now())?;

        tracing::info!(
            program_id = %program,
            run_id = %run.id,
            nodes = summary.node_count,
            snapshots = summary.snapshot_count,
            absences = summary.absence_count,
            "capability health computed"
        );
        Ok(summary)
    }

    /// Best-effort move of allocated rows to `FAILED`.
    fn fail_allocated(&mut self, program: &ProgramId, allocated: Allocated, cause: &HealthError) {
        let message = cause.to_string();
        let now = self.clock.now();
        let result = match (allocated.run_id, allocated.queue_id) {
            (Some(run_id), _) => orchestrator::fail(&mut self.store, run_id, &message, now).map(|_| ()),
            (None, Some(queue_id)) => {
                orchestrator::fail_queue(&mut self.store, queue_id, &message, now).map(|_| ())
            }
            (None, None) => Ok(()),
        };

        match result {
            Ok(()) => tracing::warn!(
                program_id = %program,
                queue_id = ?allocated.queue_id,
                run_id = ?allocated.run_id,
                kind = cause.kind(),
                error = %cause,
                "capability health compute failed"
            ),
            Err(e) => tracing::error!(
                program_id = %program,
                queue_id = ?allocated.queue_id,
                run_id = ?allocated.run_id,
                error = %cause,
                fail_error = %e,
                "could not mark compute as failed"
            ),
        }
    }

    /// Fail runs left `RUNNING` for longer than `max_age`.
    pub fn sweep_stale_runs(&mut self, max_age: TimeDelta) -> Result<Vec<ComputeRun>, HealthError> {
        let now = self.clock.now();
        sweep_stale_runs(&mut self.store, now, max_age)
    }
}
