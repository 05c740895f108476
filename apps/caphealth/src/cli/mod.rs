//! # Capability Health CLI
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create an empty database
//! - `seed` - Insert or update a program's node definitions
//! - `assign` - Record that someone covers a node
//! - `compute` - Run the capability health pipeline for a program
//! - `runs` - Show run history or the latest succeeded run
//! - `impact` - Recruiting impact read against the latest run
//! - `sweep` - Fail runs stuck in `RUNNING`

mod commands;

use caphealth_core::HealthError;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Capability health: staffing coverage across forward-looking horizons,
/// with reproducible absence evidence.
#[derive(Parser, Debug)]
#[command(name = "caphealth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database
    #[arg(short = 'D', long, global = true, default_value = "caphealth.redb")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where rows are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// redb database file at `--database`
    Redb,
    /// In-process tables, discarded on exit
    Memory,
}

impl Backend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Backend::Redb => "redb",
            Backend::Memory => "memory",
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Insert or update a program's node definitions
    Seed {
        /// Program identifier
        #[arg(short, long)]
        program: String,

        /// JSON array of node definitions (default: configured catalog)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Record that someone covers a node
    Assign {
        #[arg(short, long)]
        program: String,

        /// Node code, e.g. coaching_continuity
        #[arg(short, long)]
        node: String,

        /// Person or slot covering the node
        #[arg(short, long)]
        assignee: String,

        /// Record the assignment as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// Run the capability health pipeline
    Compute {
        #[arg(short, long)]
        program: String,

        /// manual, roster_change, scheduled or retry
        #[arg(short, long, default_value = "manual")]
        reason: String,
    },

    /// Show run history
    Runs {
        #[arg(short, long)]
        program: String,

        /// Show the latest succeeded run with its evidence instead
        #[arg(short, long)]
        latest: bool,
    },

    /// Recruiting impact read against the latest succeeded run
    Impact {
        #[arg(short, long)]
        program: String,

        /// Restrict to one horizon (H0..H3)
        #[arg(short = 'z', long)]
        horizon: Option<String>,

        /// JSON array of recruit candidates
        #[arg(short, long)]
        candidates: Option<PathBuf>,
    },

    /// Fail runs left RUNNING longer than the stale-run age
    Sweep {
        /// Override the configured age in seconds
        #[arg(short, long)]
        max_age_secs: Option<i64>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), HealthError> {
    let ctx = CommandContext::load(&cli)?;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&ctx, &host, port).await,
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Seed { program, file }) => cmd_seed(&ctx, &program, file.as_deref()),
        Some(Commands::Assign {
            program,
            node,
            assignee,
            inactive,
        }) => cmd_assign(&ctx, &program, &node, &assignee, !inactive),
        Some(Commands::Compute { program, reason }) => cmd_compute(&ctx, &program, &reason),
        Some(Commands::Runs { program, latest }) => cmd_runs(&ctx, &program, latest),
        Some(Commands::Impact {
            program,
            horizon,
            candidates,
        }) => cmd_impact(&ctx, &program, horizon.as_deref(), candidates.as_deref()),
        Some(Commands::Sweep { max_age_secs }) => cmd_sweep(&ctx, max_age_secs),
        None => {
            println!("No command specified. Use --help for usage information.");
            Ok(())
        }
    }
}
