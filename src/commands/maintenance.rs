//! Maintenance command
//!
//! Detects each domain's mechanism first so the right variable is toggled.

use anyhow::{Context, Result};

use super::release_service;
use crate::ui;

pub async fn execute(config_path: &str, domain: Option<String>, on: bool) -> Result<()> {
    let service = release_service(config_path)?;
    let domains = service.config().select_domains(domain.as_deref())?;
    let maintenance = service.maintenance();

    let detected = maintenance.detect_all(&domains).await;
    if on {
        maintenance
            .enable_all(&domains)
            .await
            .context("Failed to enable maintenance")?;
    } else {
        maintenance
            .disable_all(&domains)
            .await
            .context("Failed to disable maintenance")?;
    }

    let state = if on { "on" } else { "off" };
    for (domain, mechanism) in detected {
        ui::print_success(&format!("{}: {} {}", domain, mechanism, state));
    }
    Ok(())
}
