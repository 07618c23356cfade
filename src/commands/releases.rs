//! Releases command for showing deployed releases
//!
//! Lists every release with its revision and marks the current and previous
//! ones. `--json` prints the same data for scripts.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use super::release_service;
use crate::domain::{Release, ReleaseId};
use crate::ui;

#[derive(Debug, Serialize)]
struct ReleaseRow {
    id: ReleaseId,
    created_at: String,
    revision: Option<String>,
    current: bool,
}

#[derive(Debug, Serialize)]
struct ReleaseListing {
    current: Option<ReleaseId>,
    previous: Option<ReleaseId>,
    releases: Vec<ReleaseRow>,
}

fn listing(releases: Vec<Release>, current: Option<ReleaseId>) -> ReleaseListing {
    let previous = releases
        .len()
        .checked_sub(2)
        .map(|index| releases[index].id.clone());
    let releases = releases
        .into_iter()
        .map(|release| ReleaseRow {
            created_at: release.created_at().to_rfc3339(),
            current: current.as_ref() == Some(&release.id),
            id: release.id,
            revision: release.revision,
        })
        .collect();
    ReleaseListing {
        current,
        previous,
        releases,
    }
}

pub async fn execute(config_path: &str, json: bool) -> Result<()> {
    let service = release_service(config_path)?;
    let catalog = service.catalog();

    let ids = catalog.list_releases().await.context("Failed to list releases")?;
    let mut releases = Vec::with_capacity(ids.len());
    for id in &ids {
        releases.push(catalog.release(id).await?);
    }
    let current = catalog.current_target().await?;
    let listing = listing(releases, current);

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    ui::print_header(&format!("Releases: {}", service.config().application));
    if listing.releases.is_empty() {
        ui::print_info("No releases deployed yet");
        return Ok(());
    }

    for row in listing.releases.iter().rev() {
        let marker = if row.current {
            "current".green().bold()
        } else if listing.previous.as_ref() == Some(&row.id) {
            "previous".yellow()
        } else {
            "".normal()
        };
        println!(
            "  {}  {}  {:<10}",
            row.id.as_str().bold(),
            row.revision.as_deref().unwrap_or("-").dimmed(),
            marker
        );
    }
    println!();
    Ok(())
}
