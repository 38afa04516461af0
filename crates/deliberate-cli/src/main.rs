//! Deliberate CLI
//!
//! The `deliberate` command runs multi-participant deliberation plans.
//!
//! ## Commands
//!
//! - `run`: Execute a plan and print the final response
//! - `validate`: Check a plan without calling any model
//! - `presets`: List the built-in instruction presets

mod backend;
mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use deliberate_core::fakes::EchoCompletion;
use deliberate_core::presets::{self, PresetKind};

use crate::config::PlanConfig;

#[derive(Parser)]
#[command(name = "deliberate")]
#[command(version = deliberate_core::VERSION)]
#[command(
    about = "Run chains, ensembles, debates and graphs of model participants",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a deliberation plan
    Run {
        /// Path to the plan (TOML)
        #[arg(short, long, env = "DELIBERATE_PLAN")]
        plan: PathBuf,

        /// Print the full structure record as JSON instead of the final response
        #[arg(long)]
        info: bool,
    },

    /// Parse and bind a plan without calling any model
    Validate {
        /// Path to the plan (TOML)
        #[arg(short, long, env = "DELIBERATE_PLAN")]
        plan: PathBuf,
    },

    /// List built-in instruction presets
    Presets,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    deliberate_core::telemetry::init_tracing(cli.json, level);

    let output = match cli.command {
        Commands::Run { plan, info } => cmd_run(&plan, info).await?,
        Commands::Validate { plan } => cmd_validate(&plan)?,
        Commands::Presets => cmd_presets(),
    };
    println!("{output}");
    Ok(())
}

async fn cmd_run(path: &Path, with_info: bool) -> Result<String> {
    let plan = PlanConfig::load(path)?;
    let completion = backend::from_config(&plan.backend)?;
    let mut structure = plan.build(completion)?;

    info!(
        kind = %structure.kind(),
        participants = structure.participants().len(),
        "running plan {}",
        path.display()
    );
    let final_response = structure
        .process()
        .await
        .context("deliberation failed")?;

    if with_info {
        return structure
            .info()
            .to_json_pretty()
            .context("failed to serialize structure info");
    }
    final_response.context("no participant produced a response")
}

fn cmd_validate(path: &Path) -> Result<String> {
    let plan = PlanConfig::load(path)?;
    let structure = plan.build(Arc::new(EchoCompletion::new()))?;
    let names: Vec<&str> = structure.participants().iter().map(|p| p.name()).collect();
    Ok(format!(
        "✓ {} plan with {} participant(s): {}",
        structure.kind(),
        names.len(),
        names.join(", ")
    ))
}

fn cmd_presets() -> String {
    let mut out = String::new();
    for kind in PresetKind::ALL {
        out.push_str(&format!("{kind}:\n"));
        for name in presets::names(kind) {
            out.push_str(&format!("  {name}\n"));
        }
    }
    out.trim_end().to_string()
}
