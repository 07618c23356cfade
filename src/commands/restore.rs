//! Restore command - put snapshots of a release back into shared/ and the databases

use anyhow::{Context, Result};

use super::release_service;
use crate::domain::ReleaseId;
use crate::ui;

pub async fn execute(config_path: &str, domain: Option<String>, release: Option<String>) -> Result<()> {
    let service = release_service(config_path)?;
    let domains = service.config().select_domains(domain.as_deref())?;

    let release = match release {
        Some(id) => ReleaseId::parse(&id)?,
        None => service
            .catalog()
            .current_release()
            .await?
            .context("No release deployed; pass --release")?,
    };

    let reports = service
        .backups()
        .restore_all(&domains, &release)
        .await
        .with_context(|| format!("Restore from release {} failed", release))?;

    for report in reports {
        let mut restored = Vec::new();
        if report.files {
            restored.push("files");
        }
        if report.database {
            restored.push("database");
        }
        ui::print_success(&format!("{}: restored {}", report.domain, restored.join(" and ")));
    }
    Ok(())
}
