//! # CLI Command Implementations

use super::{Backend, Cli};
use crate::api::{self, AppState, SharedEngine, SharedStore};
use crate::config::AppConfig;
use caphealth_core::{
    ComputeReason, HealthError, Horizon, MemoryStore, NodeDef, ProgramId, RecruitCandidate,
    RecruitingImpactReader, RedbStore, SystemClock, assign_node, latest_run_detail, list_runs,
    seed_or_update_nodes,
};
use chrono::TimeDelta;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE INPUT
// =============================================================================

/// Maximum size of a node or candidate file (10 MB).
const MAX_INPUT_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Resolve `path` to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, HealthError> {
    let canonical = path.canonicalize().map_err(|e| {
        HealthError::Validation(format!("invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(HealthError::Validation(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Read and parse a JSON input file, refusing oversized files.
fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, HealthError> {
    let path = validate_file_path(path)?;
    let size = std::fs::metadata(&path)
        .map_err(|e| HealthError::Validation(format!("{}: {}", path.display(), e)))?
        .len();
    if size > MAX_INPUT_FILE_SIZE {
        return Err(HealthError::Validation(format!(
            "file size {} bytes exceeds maximum allowed {} bytes",
            size, MAX_INPUT_FILE_SIZE
        )));
    }
    let bytes = std::fs::read(&path)
        .map_err(|e| HealthError::Validation(format!("{}: {}", path.display(), e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| HealthError::Validation(format!("{}: {}", path.display(), e)))
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// COMMAND CONTEXT
// =============================================================================

/// Global flags plus the loaded configuration.
#[derive(Debug)]
pub struct CommandContext {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
    pub verbose: bool,
    pub config: AppConfig,
}

impl CommandContext {
    pub fn load(cli: &Cli) -> Result<Self, HealthError> {
        Ok(Self {
            database: cli.database.clone(),
            backend: cli.backend,
            json_mode: cli.json_mode,
            verbose: cli.verbose,
            config: AppConfig::load(cli.config.as_deref())?,
        })
    }

    /// Open the configured backend.
    pub fn open_store(&self) -> Result<SharedStore, HealthError> {
        match self.backend {
            Backend::Redb => Ok(Box::new(RedbStore::open(&self.database)?)),
            Backend::Memory => {
                tracing::warn!("memory backend: nothing is persisted after this process exits");
                Ok(Box::new(MemoryStore::new()))
            }
        }
    }

    /// Engine over the configured backend with the configured catalog.
    pub fn open_engine(&self) -> Result<SharedEngine, HealthError> {
        self.config.build_engine(self.open_store()?, SystemClock)
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(ctx: &CommandContext, host: &str, port: u16) -> Result<(), HealthError> {
    let engine = ctx.open_engine()?;
    let stale_run_max_age = ctx.config.stale_run_max_age()?;

    println!("Capability Health Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:        {}", host);
    println!("  Port:        {}", port);
    println!("  Backend:     {}", ctx.backend.as_str());
    println!("  Database:    {}", ctx.database.display());
    println!("  Engine code: {}", engine.engine_code());
    println!("  Catalog:     {} nodes", engine.catalog().len());
    println!("  Stale run:   {}s", stale_run_max_age.num_seconds());
    println!();
    println!("Endpoints:");
    println!("  GET  /health                            - Health check");
    println!("  POST /programs/{{program_id}}/catalog     - Seed node definitions");
    println!("  POST /programs/{{program_id}}/assignments - Upsert an assignment");
    println!("  POST /programs/{{program_id}}/compute     - Run a compute");
    println!("  GET  /programs/{{program_id}}/runs        - Run history");
    println!("  GET  /programs/{{program_id}}/runs/latest - Latest run detail");
    println!("  POST /programs/{{program_id}}/impact      - Recruiting impact");
    println!("  POST /runs/sweep                        - Reconcile stale runs");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let state = AppState::new(engine, ctx.config.classifier(), stale_run_max_age);
    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, state).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create an empty database.
pub fn cmd_init(ctx: &CommandContext, force: bool) -> Result<(), HealthError> {
    match ctx.backend {
        Backend::Memory => {
            println!("Memory backend needs no initialization");
            Ok(())
        }
        Backend::Redb => {
            if ctx.database.exists() {
                if !force {
                    return Err(HealthError::Validation(format!(
                        "database {} already exists. Use --force to overwrite.",
                        ctx.database.display()
                    )));
                }
                std::fs::remove_file(&ctx.database).map_err(|e| {
                    HealthError::Storage(format!("remove {}: {}", ctx.database.display(), e))
                })?;
            }
            RedbStore::open(&ctx.database)?;
            println!("Initialized new redb database at {}", ctx.database.display());
            Ok(())
        }
    }
}

// =============================================================================
// SEED COMMAND
// =============================================================================

/// Insert or update node definitions for a program.
pub fn cmd_seed(ctx: &CommandContext, program: &str, file: Option<&Path>) -> Result<(), HealthError> {
    let program = ProgramId::parse(program)?;
    let mut engine = ctx.open_engine()?;
    let defs: Vec<NodeDef> = match file {
        Some(path) => read_json_file(path)?,
        None => engine.catalog().to_vec(),
    };

    let node_ids = seed_or_update_nodes(engine.store_mut(), &program, &defs)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "program_id": program,
            "node_ids": node_ids,
        }));
    } else {
        println!("Seeded {} nodes for program {}", node_ids.len(), program);
        for (def, id) in defs.iter().zip(&node_ids) {
            println!(
                "  [{}] {:<28} min_coverage={} min_depth={}",
                id, def.node_code, def.min_coverage, def.min_depth
            );
        }
    }
    Ok(())
}

// =============================================================================
// ASSIGN COMMAND
// =============================================================================

pub fn cmd_assign(
    ctx: &CommandContext,
    program: &str,
    node_code: &str,
    assignee: &str,
    is_active: bool,
) -> Result<(), HealthError> {
    let program = ProgramId::parse(program)?;
    let mut engine = ctx.open_engine()?;
    let assignment = assign_node(engine.store_mut(), &program, node_code, assignee, is_active)?;

    if ctx.json_mode {
        print_json(&assignment);
    } else {
        println!(
            "{} {} on {} (node {}) in program {}",
            if is_active { "Assigned" } else { "Deactivated" },
            assignment.assignee,
            node_code,
            assignment.capability_node_id,
            program
        );
    }
    Ok(())
}

// =============================================================================
// COMPUTE COMMAND
// =============================================================================

/// Run the pipeline once and report the outcome.
pub fn cmd_compute(ctx: &CommandContext, program: &str, reason: &str) -> Result<(), HealthError> {
    let reason = ComputeReason::parse(reason)?;
    let mut engine = ctx.open_engine()?;
    let outcome = engine.run_health_compute_with(program, reason, BTreeMap::new());

    if ctx.json_mode {
        print_json(&outcome);
    } else if outcome.success {
        println!("Compute succeeded for program {}", program.trim());
        if let (Some(queue_id), Some(run_id)) = (outcome.queue_id, outcome.run_id) {
            println!("  Queue entry: {}", queue_id);
            println!("  Run:         {}", run_id);
        }
        println!("  Snapshots:   {}", outcome.snapshot_count.unwrap_or_default());
        println!("  Absences:    {}", outcome.absence_count.unwrap_or_default());
    }

    if outcome.success {
        return Ok(());
    }
    let message = outcome.error.unwrap_or_else(|| "compute failed".to_string());
    match outcome.queue_id {
        None => Err(HealthError::Validation(message)),
        Some(queue_id) => Err(HealthError::Storage(format!(
            "compute failed (queue {}, run {}): {}",
            queue_id,
            outcome
                .run_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            message
        ))),
    }
}

// =============================================================================
// RUNS COMMAND
// =============================================================================

pub fn cmd_runs(ctx: &CommandContext, program: &str, latest: bool) -> Result<(), HealthError> {
    let program = ProgramId::parse(program)?;
    let store = ctx.open_store()?;

    if latest {
        let Some(detail) = latest_run_detail(&store, &program)? else {
            return Err(HealthError::NotFound(format!(
                "no succeeded run for program {}",
                program
            )));
        };
        if ctx.json_mode {
            print_json(&detail);
            return Ok(());
        }

        println!("Latest run for {}", program);
        println!("  Run:            {}", detail.run.id);
        println!(
            "  System time:    {}",
            detail.provenance.system_time.to_rfc3339()
        );
        println!("  Engine:         {}", detail.provenance.engine_code);
        println!("  Snapshots:      {}", detail.snapshots.len());
        println!("  Absences:       {}", detail.absences.len());
        println!("  Appeal links:   {}", detail.appeal_links.len());
        println!(
            "  Digests:        {}",
            if detail.digests_verified { "verified" } else { "MISMATCH" }
        );
        for absence in &detail.absences {
            println!(
                "  - {} {:<28} coverage {}/{}",
                absence.horizon,
                absence.evidence.node_code,
                absence.evidence.coverage_count,
                absence.evidence.min_coverage
            );
        }
        if ctx.verbose {
            for snapshot in &detail.snapshots {
                println!("  snapshot {} {} {}", snapshot.id, snapshot.horizon, snapshot.digest);
            }
        }
        return Ok(());
    }

    let runs = list_runs(&store, &program)?;
    if ctx.json_mode {
        print_json(&serde_json::json!({
            "program_id": program,
            "runs": runs,
        }));
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs for program {}", program);
        return Ok(());
    }
    println!("{:>6}  {:<10}  {:<25}  ERROR", "RUN", "STATUS", "STARTED");
    for run in &runs {
        println!(
            "{:>6}  {:<10}  {:<25}  {}",
            run.id,
            run.status.as_str(),
            run.started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            run.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

// =============================================================================
// IMPACT COMMAND
// =============================================================================

/// Recruiting impact read against the latest succeeded run.
pub fn cmd_impact(
    ctx: &CommandContext,
    program: &str,
    horizon: Option<&str>,
    candidates: Option<&Path>,
) -> Result<(), HealthError> {
    let program = ProgramId::parse(program)?;
    let horizon = horizon.map(Horizon::parse).transpose()?;
    let candidates: Vec<RecruitCandidate> = match candidates {
        Some(path) => read_json_file(path)?,
        None => Vec::new(),
    };

    let store = ctx.open_store()?;
    let classifier = ctx.config.classifier();
    let impact = RecruitingImpactReader::new(&store, &classifier).read(
        &program,
        horizon,
        &candidates,
    )?;

    if ctx.json_mode {
        print_json(&impact);
        return Ok(());
    }

    println!("Recruiting impact for {}", program);
    println!("  Band:    {}", impact.stabilization.band.as_str());
    println!("  Message: {}", impact.stabilization.message);
    for (sector, absences) in &impact.recruitable_absences {
        println!("  Sector {} ({} absences)", sector, absences.len());
        for absence in absences {
            println!(
                "    {} {:<28} {:?} coverage {}/{}",
                absence.horizon,
                absence.node_code,
                absence.severity,
                absence.coverage_count,
                absence.min_coverage
            );
        }
    }
    if !impact.cohorts.is_empty() {
        println!("  Candidates:");
        for candidate in &impact.cohorts {
            println!(
                "    tier {}  {:>6} bp  {} ({})",
                candidate.tier, candidate.total_impact_bp, candidate.name, candidate.candidate_id
            );
        }
    }
    Ok(())
}

// =============================================================================
// SWEEP COMMAND
// =============================================================================

pub fn cmd_sweep(ctx: &CommandContext, max_age_secs: Option<i64>) -> Result<(), HealthError> {
    let max_age = match max_age_secs {
        Some(secs) if secs >= 0 => TimeDelta::try_seconds(secs).ok_or_else(|| {
            HealthError::Validation(format!("max_age_secs {} is out of range", secs))
        })?,
        Some(secs) => {
            return Err(HealthError::Validation(format!(
                "max_age_secs must not be negative, got {}",
                secs
            )));
        }
        None => ctx.config.stale_run_max_age()?,
    };

    let mut engine = ctx.open_engine()?;
    let failed = engine.sweep_stale_runs(max_age)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "max_age_secs": max_age.num_seconds(),
            "reconciled": failed.iter().map(|run| run.id).collect::<Vec<_>>(),
        }));
    } else if failed.is_empty() {
        println!("No stale runs");
    } else {
        println!("Reconciled {} stale runs", failed.len());
        for run in &failed {
            println!("  run {} ({})", run.id, run.program_id);
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
