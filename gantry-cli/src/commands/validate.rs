//! Validate command handler

use anyhow::Result;
use colored::*;
use std::path::Path;

use gantry_core::manifest::Manifest;

/// Handle the validate command
///
/// Parses and validates the manifest, reporting what it found.
pub fn handle_validate(path: &Path) -> Result<i32> {
    let manifest = match Manifest::from_path(path) {
        Ok(manifest) => manifest,
        Err(e) => {
            println!("{} {}", "✗".red().bold(), e);
            return Ok(1);
        }
    };

    if let Err(e) = manifest.validate() {
        println!("{} {}", "✗".red().bold(), e);
        return Ok(1);
    }

    println!("{}", "✓ Manifest is valid".green().bold());
    println!("  Language:   {}", manifest.language.bold());
    println!("  Runtimes:   {}", manifest.runtimes.join(", "));
    println!("  Matrix:     {} entr(ies)", manifest.matrix().len());
    println!(
        "  Deploy:     {}",
        match &manifest.deploy {
            Some(deploy) => format!("{} ({})", deploy.provider, deploy.index_url),
            None => "not configured".dimmed().to_string(),
        }
    );

    Ok(0)
}
