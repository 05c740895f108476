//! # Stale Run Reconciliation
//!
//! A caller that aborts mid-pipeline leaves its run `RUNNING`. The sweep
//! fails every such run older than a cutoff, together with its queue entry.

use crate::orchestrator;
use crate::primitives::STALE_RUN_ERROR;
use crate::store::HealthStore;
use crate::{ComputeRun, HealthError, RunStatus, Timestamp};
use chrono::TimeDelta;

/// Fail every `RUNNING` run whose `started_at` is more than `max_age` before `now`.
///
/// Returns the runs that were failed, in id order.
pub fn sweep_stale_runs<S: HealthStore + ?Sized>(
    store: &mut S,
    now: Timestamp,
    max_age: TimeDelta,
) -> Result<Vec<ComputeRun>, HealthError> {
    if max_age < TimeDelta::zero() {
        return Err(HealthError::Validation(
            "max_age must not be negative".to_string(),
        ));
    }

    let stale: Vec<ComputeRun> = store
        .runs(None)?
        .into_iter()
        .filter(|run| run.status == RunStatus::Running)
        .filter(|run| run.started_at.is_some_and(|t| now - t > max_age))
        .collect();

    let mut failed = Vec::with_capacity(stale.len());
    for run in stale {
        failed.push(orchestrator::fail(store, run.id, STALE_RUN_ERROR, now)?);
    }
    if !failed.is_empty() {
        tracing::warn!(runs = failed.len(), "stale runs reconciled");
    }
    Ok(failed)
}
