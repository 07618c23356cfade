//! Backup service - per-domain file and database snapshots
//!
//! Snapshots are named from (domain, release, kind) only, so a partial
//! snapshot can always be found and removed. Restores are destructive
//! (files replaced, database dropped then reloaded) and never retried.
//!
//! A database snapshot carries a copy of the domain's migration ledgers
//! taken in the same command, and restoring it puts those copies back, so
//! the ledgers always describe the database they sit next to.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::for_each_domain;
use crate::config::DomainConfig;
use crate::domain::release::expired;
use crate::domain::{MigrationKind, ReleaseId, RemoteCommand, RestoreReport, SnapshotKind};
use crate::error::{BackupError, RestoreError};
use crate::infrastructure::shell::quote_path;
use crate::infrastructure::{Remote, SiteCli};
use crate::path_builder::DeployLayout;

pub struct BackupService {
    remote: Remote,
    layout: DeployLayout,
    cli: SiteCli,
    group_writable: bool,
}

impl BackupService {
    pub fn new(remote: Remote, layout: DeployLayout, cli: SiteCli, group_writable: bool) -> Self {
        Self {
            remote,
            layout,
            cli,
            group_writable,
        }
    }

    /// Path the site CLI dumps to; it appends `.gz` itself
    fn dump_path(&self, domain: &str, release: &ReleaseId) -> PathBuf {
        let snapshot = self.layout.snapshot_path(domain, release, SnapshotKind::Database);
        let snapshot = snapshot.to_string_lossy();
        PathBuf::from(snapshot.strip_suffix(".gz").unwrap_or(&*snapshot))
    }

    /// Every path a snapshot of `kind` for `release` may leave behind
    fn snapshot_objects(&self, domain: &str, release: &ReleaseId, kind: SnapshotKind) -> Vec<PathBuf> {
        let mut paths = vec![self.layout.snapshot_path(domain, release, kind)];
        if kind == SnapshotKind::Database {
            paths.push(self.dump_path(domain, release));
            for ledger in MigrationKind::ALL {
                paths.push(self.layout.ledger_checkpoint_path(domain, ledger, release));
            }
        }
        paths
    }

    fn remove_line(paths: &[PathBuf]) -> String {
        let quoted: Vec<String> = paths.iter().map(|p| quote_path(p)).collect();
        format!("rm -f {}", quoted.join(" "))
    }

    /// Copy each ledger next to itself; a missing ledger checkpoints as empty
    fn checkpoint_ledgers_line(&self, domain: &str, release: &ReleaseId) -> String {
        let mut line = format!("mkdir -p {}", quote_path(&self.layout.migration_state_path(domain)));
        for kind in MigrationKind::ALL {
            line.push_str(&format!(
                " && if [ -f {0} ]; then cp {0} {1}; else : > {1}; fi",
                quote_path(&self.layout.ledger_path(domain, kind)),
                quote_path(&self.layout.ledger_checkpoint_path(domain, kind, release))
            ));
        }
        line
    }

    fn rewind_ledgers_line(&self, domain: &str, release: &ReleaseId) -> String {
        MigrationKind::ALL
            .iter()
            .map(|&kind| {
                format!(
                    "if [ -f {0} ]; then cp {0} {1}; fi",
                    quote_path(&self.layout.ledger_checkpoint_path(domain, kind, release)),
                    quote_path(&self.layout.ledger_path(domain, kind))
                )
            })
            .collect::<Vec<_>>()
            .join(" && ")
    }

    pub async fn backup(&self, domain: &str, release: &ReleaseId, kind: SnapshotKind) -> Result<PathBuf, BackupError> {
        let snapshot = self.layout.snapshot_path(domain, release, kind);
        let dir = quote_path(&self.layout.snapshot_dir(domain, kind));

        let outcome = match kind {
            SnapshotKind::Files => {
                self.remote
                    .try_sudo(format!(
                        "mkdir -p {} && cd {} && tar cjf {} files",
                        dir,
                        quote_path(&self.layout.domain_shared_path(domain)),
                        quote_path(&snapshot)
                    ))
                    .await
            }
            SnapshotKind::Database => {
                let dump = self.cli.sql_dump(
                    &self.layout.current_path(),
                    domain,
                    &self.dump_path(domain, release),
                );
                self.remote
                    .run(format!(
                        "mkdir -p {} && {} && {}",
                        dir,
                        dump,
                        self.checkpoint_ledgers_line(domain, release)
                    ))
                    .await
            }
        };

        outcome.map_err(|e| BackupError::SnapshotFailed {
            domain: domain.to_string(),
            release: release.to_string(),
            kind,
            source: e,
        })?;

        info!(domain = %domain, release = %release, kind = %kind, "Snapshot written");
        Ok(snapshot)
    }

    /// Snapshot every domain concurrently
    pub async fn backup_all(
        &self,
        domains: &[DomainConfig],
        release: &ReleaseId,
        kind: SnapshotKind,
    ) -> Result<Vec<PathBuf>, BackupError> {
        for_each_domain(domains, |d| self.backup(&d.name, release, kind)).await
    }

    /// Commands deleting every (possibly partial) snapshot of `kind` for `release`
    pub fn cleanup_commands(&self, domains: &[DomainConfig], release: &ReleaseId, kind: SnapshotKind) -> Vec<RemoteCommand> {
        domains
            .iter()
            .map(|d| {
                self.remote
                    .sudo(Self::remove_line(&self.snapshot_objects(&d.name, release, kind)))
            })
            .collect()
    }

    fn restore_files_line(&self, domain: &str, release: &ReleaseId) -> String {
        let shared = quote_path(&self.layout.domain_shared_path(domain));
        let snapshot = quote_path(&self.layout.snapshot_path(domain, release, SnapshotKind::Files));
        let mut line = format!("cd {0} && rm -rf files && tar xjf {1} -C {0}", shared, snapshot);
        if self.group_writable {
            line.push_str(" && chmod -R g+w files");
        }
        line
    }

    fn restore_database_line(&self, domain: &str, release: &ReleaseId) -> String {
        let root = self.layout.current_path();
        let snapshot = quote_path(&self.layout.snapshot_path(domain, release, SnapshotKind::Database));
        let dump_path = self.dump_path(domain, release);
        let dump = quote_path(&dump_path);
        format!(
            "gzip -dc {} > {} && {} && {} && {}; status=$?; rm -f {}; exit $status",
            snapshot,
            dump,
            self.cli.sql_drop(&root, domain),
            self.cli.sql_load(&root, domain, &dump_path),
            self.rewind_ledgers_line(domain, release),
            dump
        )
    }

    /// Restore one domain from the snapshots taken for `release`
    pub async fn restore(&self, domain: &str, release: &ReleaseId) -> Result<RestoreReport, RestoreError> {
        let files_snapshot = self.layout.snapshot_path(domain, release, SnapshotKind::Files);
        let db_snapshot = self.layout.snapshot_path(domain, release, SnapshotKind::Database);

        let files = self.remote.exists(&files_snapshot).await.map_err(|e| RestoreError::FilesFailed {
            domain: domain.to_string(),
            release: release.to_string(),
            source: e,
        })?;
        let database = self.remote.exists(&db_snapshot).await.map_err(|e| RestoreError::DatabaseFailed {
            domain: domain.to_string(),
            release: release.to_string(),
            source: e,
        })?;

        if !files && !database {
            return Err(RestoreError::SnapshotMissing {
                domain: domain.to_string(),
                release: release.to_string(),
            });
        }

        if files {
            self.remote
                .try_sudo(self.restore_files_line(domain, release))
                .await
                .map_err(|e| RestoreError::FilesFailed {
                    domain: domain.to_string(),
                    release: release.to_string(),
                    source: e,
                })?;
            info!(domain = %domain, release = %release, "Files restored");
        }

        if database {
            self.remote
                .run(self.restore_database_line(domain, release))
                .await
                .map_err(|e| RestoreError::DatabaseFailed {
                    domain: domain.to_string(),
                    release: release.to_string(),
                    source: e,
                })?;
            info!(domain = %domain, release = %release, "Database restored");
        }

        Ok(RestoreReport {
            domain: domain.to_string(),
            files,
            database,
        })
    }

    /// Restore every domain; a missing snapshot is an error
    pub async fn restore_all(&self, domains: &[DomainConfig], release: &ReleaseId) -> Result<Vec<RestoreReport>, RestoreError> {
        for_each_domain(domains, |d| self.restore(&d.name, release)).await
    }

    /// Restore every domain that has snapshots, skipping the others
    pub async fn restore_available(
        &self,
        domains: &[DomainConfig],
        release: &ReleaseId,
    ) -> Result<Vec<RestoreReport>, RestoreError> {
        for_each_domain(domains, |d| async move {
            match self.restore(&d.name, release).await {
                Err(RestoreError::SnapshotMissing { .. }) => {
                    warn!(domain = %d.name, release = %release, "No snapshot to restore");
                    Ok(RestoreReport {
                        domain: d.name.clone(),
                        ..RestoreReport::default()
                    })
                }
                other => other,
            }
        })
        .await
    }

    async fn snapshot_releases(&self, domain: &str, kind: SnapshotKind) -> Result<Vec<ReleaseId>, BackupError> {
        let dir = self.layout.snapshot_dir(domain, kind);
        let listing = self
            .remote
            .capture(format!("if [ -d {0} ]; then ls -1 {0}; fi", quote_path(&dir)))
            .await
            .map_err(|e| BackupError::ListFailed {
                domain: domain.to_string(),
                kind,
                source: e,
            })?;

        let mut releases: Vec<ReleaseId> = listing
            .split_whitespace()
            .filter_map(|name| kind.parse_release(domain, name))
            .collect();
        releases.sort();
        releases.dedup();
        Ok(releases)
    }

    async fn prune_domain(&self, domain: &str, keep: usize) -> Result<usize, BackupError> {
        let mut removed = 0;
        for kind in SnapshotKind::ALL {
            let releases = self.snapshot_releases(domain, kind).await?;
            for release in expired(&releases, keep) {
                let snapshot = self.layout.snapshot_path(domain, &release, kind);
                self.remote
                    .try_sudo(Self::remove_line(&self.snapshot_objects(domain, &release, kind)))
                    .await
                    .map_err(|e| BackupError::DeleteFailed {
                        path: snapshot.display().to_string(),
                        source: e,
                    })?;
                debug!(domain = %domain, kind = %kind, release = %release, "Pruned snapshot");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Keep the `keep` most recent snapshots per domain and kind
    pub async fn prune_snapshots(&self, domains: &[DomainConfig], keep: usize) -> Result<usize, BackupError> {
        let removed: usize = for_each_domain(domains, |d| self.prune_domain(&d.name, keep))
            .await?
            .into_iter()
            .sum();
        if removed > 0 {
            info!(removed, keep, "Pruned old snapshots");
        }
        Ok(removed)
    }
}
