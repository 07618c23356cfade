//! Cleanup command - retention pruning of releases and snapshots

use anyhow::{Context, Result};

use super::release_service;
use crate::ui;

pub async fn execute(config_path: &str, keep: Option<usize>) -> Result<()> {
    let service = release_service(config_path)?;
    let report = service.cleanup(keep).await.context("Cleanup failed")?;

    if report.releases.is_empty() && report.snapshots == 0 {
        ui::print_info("Nothing to prune");
        return Ok(());
    }
    for release in &report.releases {
        ui::print_success(&format!("Removed release {}", release));
    }
    ui::print_info(&format!("Removed {} snapshot(s)", report.snapshots));
    Ok(())
}
