//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod matrix;
mod run;
mod validate;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

pub use run::RunArgs;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Execute the pipeline described by a manifest
    Run(RunArgs),
    /// Parse and validate a manifest without running anything
    Validate {
        /// Path to the pipeline manifest
        manifest: PathBuf,
    },
    /// Print the expanded build matrix of a manifest
    Matrix {
        /// Path to the pipeline manifest
        manifest: PathBuf,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns
/// the process exit code.
pub async fn handle_command(command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => run::handle_run(args).await,
        Commands::Validate { manifest } => validate::handle_validate(&manifest),
        Commands::Matrix { manifest } => matrix::handle_matrix(&manifest),
    }
}
