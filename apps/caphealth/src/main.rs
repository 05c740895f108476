//! # Capability Health Server
//!
//! Entry point for the `caphealth` binary.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            apps/caphealth (THE BINARY)        │
//! │                                               │
//! │   ┌─────────────┐         ┌─────────────┐     │
//! │   │    CLI      │         │  HTTP API   │     │
//! │   │   (clap)    │         │   (axum)    │     │
//! │   └──────┬──────┘         └──────┬──────┘     │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │             ┌────────────────┐                │
//! │             │ caphealth-core │                │
//! │             │  (THE LOGIC)   │                │
//! │             └────────────────┘                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! caphealth init
//! caphealth seed -p spring-league
//! caphealth assign -p spring-league -n coaching_continuity -a casey
//! caphealth compute -p spring-league
//! caphealth impact -p spring-league -c candidates.json
//! caphealth server --port 8080
//! ```

use caphealth::cli;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "caphealth=info,caphealth_core=info,tower_http=debug";

#[tokio::main]
async fn main() {
    // CAPHEALTH_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("CAPHEALTH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(kind = e.kind(), "Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  caphealth v{}
  capability coverage across H0..H3, with evidence
"#,
        env!("CARGO_PKG_VERSION")
    );
}
