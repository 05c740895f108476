//! # Compute Run Orchestrator
//!
//! Owns the queue -> run state machine:
//!
//! ```text
//! QUEUED -> RUNNING -> SUCCEEDED | FAILED
//! ```
//!
//! A run owns exactly one queue entry and is never resumed. Retrying means
//! enqueueing again, which allocates a fresh queue entry and run.

use crate::store::HealthStore;
use crate::{
    ComputeQueueEntry, ComputeReason, ComputeRun, HealthError, ProgramId, QueueId, RunId,
    RunStatus, RunSummary, Timestamp,
};
use std::collections::BTreeMap;

/// Key under which a queue entry records the error that failed it.
pub const QUEUE_ERROR_KEY: &str = "error";

fn check_transition(
    entity: &'static str,
    id: u64,
    from: RunStatus,
    to: RunStatus,
) -> Result<(), HealthError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(HealthError::InvalidTransition {
            entity,
            id,
            from,
            to,
        })
    }
}

fn load_queue_entry<S: HealthStore + ?Sized>(
    store: &S,
    id: QueueId,
) -> Result<ComputeQueueEntry, HealthError> {
    store
        .queue_entry(id)?
        .ok_or_else(|| HealthError::NotFound(format!("queue entry {}", id)))
}

fn load_run<S: HealthStore + ?Sized>(store: &S, id: RunId) -> Result<ComputeRun, HealthError> {
    store
        .run(id)?
        .ok_or_else(|| HealthError::NotFound(format!("compute run {}", id)))
}

/// Request a compute for `program`.
pub fn enqueue<S: HealthStore + ?Sized>(
    store: &mut S,
    program: &ProgramId,
    reason: ComputeReason,
    details: BTreeMap<String, String>,
    now: Timestamp,
) -> Result<ComputeQueueEntry, HealthError> {
    let entry = store.insert_queue_entry(ComputeQueueEntry {
        id: QueueId::default(),
        program_id: program.clone(),
        reason,
        details,
        status: RunStatus::Queued,
        enqueued_at: now,
        updated_at: now,
    })?;
    tracing::info!(
        program_id = %program,
        queue_id = %entry.id,
        reason = reason.as_str(),
        "compute enqueued"
    );
    Ok(entry)
}

/// Allocate a run for a queued entry and move both to `RUNNING`.
///
/// Both rows are written together; on error no run exists. `now` becomes
/// the run's `started_at`.
pub fn start_run<S: HealthStore + ?Sized>(
    store: &mut S,
    queue_id: QueueId,
    now: Timestamp,
) -> Result<ComputeRun, HealthError> {
    let mut entry = load_queue_entry(store, queue_id)?;
    check_transition("queue entry", queue_id.0, entry.status, RunStatus::Running)?;

    entry.status = RunStatus::Running;
    entry.updated_at = now;
    let run = store.begin_run(
        ComputeRun {
            id: RunId::default(),
            queue_id,
            program_id: entry.program_id.clone(),
            status: RunStatus::Running,
            started_at: Some(now),
            finished_at: None,
            summary: None,
            error: None,
        },
        &entry,
    )?;

    tracing::info!(
        program_id = %run.program_id,
        queue_id = %queue_id,
        run_id = %run.id,
        "compute run started"
    );
    Ok(run)
}

/// Mark a run and its queue entry `SUCCEEDED`.
pub fn complete<S: HealthStore + ?Sized>(
    store: &mut S,
    run_id: RunId,
    summary: RunSummary,
    now: Timestamp,
) -> Result<ComputeRun, HealthError> {
    finish(store, run_id, RunStatus::Succeeded, Some(summary), None, now)
}

/// Mark a run and its queue entry `FAILED`, recording `error`.
pub fn fail<S: HealthStore + ?Sized>(
    store: &mut S,
    run_id: RunId,
    error: &str,
    now: Timestamp,
) -> Result<ComputeRun, HealthError> {
    finish(
        store,
        run_id,
        RunStatus::Failed,
        None,
        Some(error.to_string()),
        now,
    )
}

/// Fail a queue entry whose run was never allocated.
pub fn fail_queue<S: HealthStore + ?Sized>(
    store: &mut S,
    queue_id: QueueId,
    error: &str,
    now: Timestamp,
) -> Result<ComputeQueueEntry, HealthError> {
    let mut entry = load_queue_entry(store, queue_id)?;
    check_transition("queue entry", queue_id.0, entry.status, RunStatus::Failed)?;
    entry.status = RunStatus::Failed;
    entry.updated_at = now;
    entry
        .details
        .insert(QUEUE_ERROR_KEY.to_string(), error.to_string());
    store.update_queue_entry(&entry)?;
    tracing::warn!(queue_id = %queue_id, error, "queue entry failed");
    Ok(entry)
}

/// Both rows reach `status` in one write, or neither changes.
fn finish<S: HealthStore + ?Sized>(
    store: &mut S,
    run_id: RunId,
    status: RunStatus,
    summary: Option<RunSummary>,
    error: Option<String>,
    now: Timestamp,
) -> Result<ComputeRun, HealthError> {
    let mut run = load_run(store, run_id)?;
    check_transition("compute run", run_id.0, run.status, status)?;
    let mut entry = load_queue_entry(store, run.queue_id)?;
    check_transition("queue entry", entry.id.0, entry.status, status)?;

    run.status = status;
    run.finished_at = Some(now);
    run.summary = summary;
    if let Some(message) = &error {
        entry
            .details
            .insert(QUEUE_ERROR_KEY.to_string(), message.clone());
    }
    run.error = error;
    entry.status = status;
    entry.updated_at = now;
    store.finish_run(&run, &entry)?;

    match status {
        RunStatus::Failed => tracing::warn!(
            program_id = %run.program_id,
            run_id = %run_id,
            error = run.error.as_deref().unwrap_or_default(),
            "compute run failed"
        ),
        _ => tracing::info!(
            program_id = %run.program_id,
            run_id = %run_id,
            status = status.as_str(),
            "compute run finished"
        ),
    }
    Ok(run)
}
