//! Migrate command
//!
//! Applies (or, with `--pending`, lists) ledgered migrations shipped in the
//! current release.

use anyhow::{Context, Result};
use colored::Colorize;

use super::release_service;
use crate::domain::MigrationKind;
use crate::ui;

pub async fn execute(config_path: &str, domain: Option<String>, pending: bool) -> Result<()> {
    let service = release_service(config_path)?;
    let domains = service.config().select_domains(domain.as_deref())?;
    let migrations = service.migrations();

    if pending {
        ui::print_header("Pending migrations");
        for domain in &domains {
            for kind in MigrationKind::ALL {
                let names = migrations
                    .pending(&domain.name, kind)
                    .await
                    .with_context(|| format!("Failed to compute pending {} migrations for {}", kind, domain.name))?;
                println!("  {} {} ({})", domain.name.bold(), kind.name(), names.len());
                for name in names {
                    println!("    {}", name);
                }
            }
        }
        return Ok(());
    }

    ui::print_header("Applying migrations");
    let reports = migrations.run_all(&domains).await.context("Migration failed")?;
    for report in &reports {
        let line = format!(
            "{} {}: {} applied, {} already recorded",
            report.domain, report.kind, report.applied.len(), report.skipped
        );
        if report.is_noop() {
            println!("  {}", line.dimmed());
        } else {
            println!("  {}", line);
            for name in &report.applied {
                println!("    {} {}", "+".green(), name);
            }
        }
    }
    ui::print_success("Migrations up to date");
    Ok(())
}
