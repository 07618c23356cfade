//! Check command - prerequisites on the hosts and on this machine

use anyhow::{bail, Result};

use super::release_service;
use crate::ui;

pub async fn execute(config_path: &str) -> Result<()> {
    let service = release_service(config_path)?;
    ui::print_header(&format!("Dependency check: {}", service.config().application));

    let report = service.check().await;
    ui::print_dependency_report(&report);
    if !report.passed() {
        bail!("{} dependency check(s) failed", report.failures().count());
    }
    Ok(())
}
