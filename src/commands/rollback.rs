//! Rollback command.
//!
//! Repoints `current` at the previous release, restores what the latest
//! release snapshotted and deletes the abandoned release.

use anyhow::{Context, Result};
use colored::Colorize;

use super::release_service;
use crate::ui;

pub async fn execute(config_path: &str) -> Result<()> {
    let service = release_service(config_path)?;
    let summary = service.rollback().await.context("Rollback failed")?;

    for report in &summary.restored {
        let restored = match (report.files, report.database) {
            (true, true) => "files and database",
            (true, false) => "files",
            (false, true) => "database",
            (false, false) => "nothing to restore",
        };
        println!("  {} {}", report.domain.bold(), restored.dimmed());
    }
    if !summary.removed {
        ui::print_warning(&format!(
            "Release {} was kept: `current` still points at it",
            summary.from
        ));
    }
    Ok(())
}
