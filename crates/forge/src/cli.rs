//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Forge - self-improving generation orchestrator
///
/// Simulate sessions, inspect reports and manage the curriculum.
#[derive(Parser, Debug)]
#[command(name = "forge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (overrides FORGE_CONFIG and the user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a simulated session with deterministic services
    Simulate(SimulateArgs),

    /// Show what the orchestrator has learned so far
    Report {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Curriculum inspection and planning
    Curriculum(CurriculumCommand),

    /// Configuration inspection
    Config(ConfigCommand),

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of requests to run
    #[arg(short = 'n', long, default_value_t = 20)]
    pub requests: usize,

    /// Seed for the simulated services
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// Database file (overrides database_path from the config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Skip the review step
    #[arg(long)]
    pub no_review: bool,

    /// Time budget per request in seconds
    #[arg(long, default_value_t = 300.0)]
    pub time_budget: f64,

    /// Print the final report as JSON
    #[arg(short, long)]
    pub json: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Curriculum Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct CurriculumCommand {
    #[command(subcommand)]
    pub action: CurriculumAction,
}

#[derive(Subcommand, Debug)]
pub enum CurriculumAction {
    /// Check the task graph for cycles, dangling and duplicate ids
    Validate {
        /// Config file holding the tasks (defaults to the resolved config)
        file: Option<PathBuf>,
    },

    /// List tasks with their progress
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Plan the next tasks within a time budget
    Plan {
        /// Available minutes
        #[arg(short, long, default_value_t = 60)]
        minutes: u32,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration as TOML
    Show,

    /// Validate the resolved configuration
    Validate,

    /// Print the config file locations that are searched
    Path,
}
