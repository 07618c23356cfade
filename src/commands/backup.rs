//! Backup command - snapshot the current release's shared files and databases

use anyhow::{Context, Result};

use super::release_service;
use crate::cli::BackupKind;
use crate::ui;

pub async fn execute(config_path: &str, domain: Option<String>, kind: BackupKind) -> Result<()> {
    let service = release_service(config_path)?;
    let domains = service.config().select_domains(domain.as_deref())?;
    let release = service
        .catalog()
        .current_release()
        .await?
        .context("No release deployed; nothing to snapshot")?;

    for kind in kind.kinds() {
        let snapshots = service
            .backups()
            .backup_all(&domains, &release, kind)
            .await
            .with_context(|| format!("{} backup failed", kind.name()))?;
        for snapshot in snapshots {
            ui::print_success(&snapshot.display().to_string());
        }
    }
    Ok(())
}
