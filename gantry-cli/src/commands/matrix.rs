//! Matrix command handler

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use gantry_core::manifest::Manifest;

/// Handle the matrix command
///
/// Prints the expanded build matrix, one entry per line in execution
/// order.
pub fn handle_matrix(path: &Path) -> Result<i32> {
    let manifest = Manifest::from_path(path)
        .with_context(|| format!("Failed to load manifest: {}", path.display()))?;
    manifest.validate().context("Manifest is invalid")?;

    let matrix = manifest.matrix();
    println!("{}", format!("{} matrix entr(ies):", matrix.len()).bold());
    for entry in matrix {
        println!("  {} {}", "▸".cyan(), entry);
    }

    Ok(0)
}
