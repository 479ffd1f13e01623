//! Run command handler
//!
//! Loads the manifest, builds the trigger from the CLI flags, executes
//! every matrix entry and prints a colored per-run summary. Exits 0
//! only when every run succeeded.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;

use gantry_core::manifest::Manifest;
use gantry_core::run::{Run, StageOutcome, Trigger};
use gantry_index::{Credentials, IndexClient};
use gantry_runner::{Pipeline, ShellRunner, StageExecutor};

/// Arguments for `gantry run`
#[derive(Args)]
pub struct RunArgs {
    /// Path to the pipeline manifest
    pub manifest: PathBuf,

    /// Treat the trigger as a tag push with this tag name
    #[arg(long, conflicts_with = "branch")]
    pub tag: Option<String>,

    /// Treat the trigger as a plain push to this branch
    #[arg(long, default_value = "main")]
    pub branch: String,

    /// Override the package index URL from the manifest
    #[arg(long, env = "GANTRY_INDEX_URL")]
    pub index_url: Option<String>,

    /// Index username, overriding the manifest's secure value
    #[arg(long, env = "GANTRY_INDEX_USERNAME")]
    pub index_username: Option<String>,

    /// Index password, overriding the manifest's secure value
    #[arg(long, env = "GANTRY_INDEX_PASSWORD", hide_env_values = true)]
    pub index_password: Option<String>,

    /// How many matrix entries to execute in parallel
    #[arg(long, default_value = "2")]
    pub jobs: usize,
}

/// Handle the run command
pub async fn handle_run(args: RunArgs) -> Result<i32> {
    let manifest = Manifest::from_path(&args.manifest)
        .with_context(|| format!("Failed to load manifest: {}", args.manifest.display()))?;
    manifest.validate().context("Manifest is invalid")?;

    let trigger = match &args.tag {
        Some(name) => Trigger::Tag { name: name.clone() },
        None => Trigger::Push {
            branch: args.branch.clone(),
        },
    };

    let index_url = args
        .index_url
        .clone()
        .or_else(|| manifest.deploy.as_ref().map(|d| d.index_url.clone()))
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let index = Arc::new(IndexClient::new(index_url));

    let manifest = Arc::new(manifest);
    let mut executor = StageExecutor::new(manifest.clone(), Arc::new(ShellRunner::new()), index);
    if let (Some(username), Some(password)) = (&args.index_username, &args.index_password) {
        executor = executor.with_credentials(Credentials {
            username: username.clone(),
            password: password.clone(),
        });
    }

    let pipeline = Pipeline::with_executor(manifest, executor).with_max_parallel(args.jobs);
    let report = pipeline.execute(trigger).await?;

    println!();
    for run in &report.runs {
        print_run_summary(run);
    }

    if report.succeeded() {
        println!("{}", "✓ Pipeline succeeded".green().bold());
    } else {
        println!("{}", "✗ Pipeline failed".red().bold());
    }

    Ok(report.exit_code())
}

/// Print the stage results of one run
fn print_run_summary(run: &Run) {
    let header = format!("{} ({})", run.entry, run.trigger);
    if run.succeeded() {
        println!("  {} {}", "▸".cyan(), header.bold());
    } else {
        println!("  {} {}", "▸".red(), header.bold());
    }

    for result in &run.stage_results {
        let (marker, detail) = match &result.outcome {
            StageOutcome::Succeeded => ("✓".green(), String::new()),
            StageOutcome::Failed { exit_code } => {
                ("✗".red(), format!(" (exit code {})", exit_code))
            }
            StageOutcome::Skipped { reason } => ("-".yellow(), format!(" ({})", reason)),
        };
        println!(
            "    {} {:<14}{} {}",
            marker,
            result.stage.name(),
            detail,
            format!("{}ms", result.duration_ms).dimmed()
        );

        // Full log only for stages that actually failed
        if matches!(result.outcome, StageOutcome::Failed { .. }) {
            for entry in &result.log {
                println!("      {}", entry.message.dimmed());
            }
        }
    }
    println!();
}
