//! Release service - orchestrates the release workflow
//!
//! A deployment is one transaction: materialize, finalize and cut over to a
//! new release, then run the enabled post-cutover hooks. The plan is built
//! up front as data and executed by [`TransactionRunner`], which owns the
//! rollback. Retention cleanup follows a successful transaction and never
//! fails the deployment.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::transaction::{StepRunner, TransactionRunner};
use super::{BackupService, MaintenanceService, MigrationService, ReleaseCatalog, SiteService};
use crate::config::DeployConfig;
use crate::domain::{
    Compensation, ReleaseId, ReleasePhase, ReleaseStep, RestoreReport, SnapshotKind, StepPolicy,
    StepResult, TransactionPlan,
};
use crate::error::{ConfigError, DeployError, ReleaseError, SiteError, TransactionError};
use crate::infrastructure::shell::{quote, quote_path};
use crate::infrastructure::source::DependencyReport;
use crate::infrastructure::{Remote, RemoteExecutor, SiteCli, SourceStrategy};
use crate::path_builder::DeployLayout;
use crate::ui;

/// What a standalone rollback did
#[derive(Debug, Clone, Serialize)]
pub struct RollbackSummary {
    /// Release rolled away from
    pub from: ReleaseId,
    /// Release `current` points at now
    pub to: ReleaseId,
    pub restored: Vec<RestoreReport>,
    /// Whether the abandoned release directory was deleted
    pub removed: bool,
}

/// What retention cleanup removed
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub releases: Vec<ReleaseId>,
    pub snapshots: usize,
}

/// Service for orchestrating releases
pub struct ReleaseService {
    config: Arc<DeployConfig>,
    remote: Remote,
    layout: DeployLayout,
    catalog: ReleaseCatalog,
    source: Option<Box<dyn SourceStrategy>>,
    migrations: MigrationService,
    backups: BackupService,
    maintenance: MaintenanceService,
    site: SiteService,
    transactions: TransactionRunner,
}

impl ReleaseService {
    pub fn new(config: Arc<DeployConfig>, executor: Arc<dyn RemoteExecutor>) -> Result<Self, DeployError> {
        let remote = Remote::new(executor, config.file_privilege());
        let layout = config.layout();
        let cli = SiteCli::new(config.site.cli.clone());

        Ok(Self {
            catalog: ReleaseCatalog::new(remote.clone(), layout.clone()),
            migrations: MigrationService::new(
                remote.clone(),
                layout.clone(),
                cli.clone(),
                config.migrations.clone(),
            )?,
            backups: BackupService::new(remote.clone(), layout.clone(), cli.clone(), config.group_writable),
            maintenance: MaintenanceService::new(
                remote.clone(),
                layout.clone(),
                cli,
                config.maintenance_default,
            ),
            site: SiteService::new(remote.clone(), &config),
            transactions: TransactionRunner::new(remote.clone()),
            source: None,
            remote,
            layout,
            config,
        })
    }

    /// Builder: set where release code comes from
    pub fn with_source(mut self, source: Box<dyn SourceStrategy>) -> Self {
        self.source = Some(source);
        self
    }

    fn source(&self) -> Result<&dyn SourceStrategy, ConfigError> {
        self.source.as_deref().ok_or_else(|| ConfigError::MissingField {
            field: "source".to_string(),
        })
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ReleaseCatalog {
        &self.catalog
    }

    pub fn migrations(&self) -> &MigrationService {
        &self.migrations
    }

    pub fn backups(&self) -> &BackupService {
        &self.backups
    }

    pub fn maintenance(&self) -> &MaintenanceService {
        &self.maintenance
    }

    // ========================================================================
    // Deploy
    // ========================================================================

    /// Deploy a new release as one transaction
    pub async fn deploy(&self) -> Result<Vec<StepResult>, DeployError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("deploy", run = %run_id, application = %self.config.application);
        self.deploy_inner().instrument(span).await
    }

    async fn deploy_inner(&self) -> Result<Vec<StepResult>, DeployError> {
        self.source()?;
        let previous = self.catalog.current_release().await?;
        let release = ReleaseId::now();
        if let Some(previous) = &previous {
            if release <= *previous {
                return Err(ReleaseError::NotMonotonic {
                    release: release.to_string(),
                    current: previous.to_string(),
                }
                .into());
            }
        }

        let plan = self.plan(release.clone(), previous.as_ref());
        self.print_header(&plan, previous.as_ref());

        let run = ReleaseRun {
            service: self,
            release_path: self.layout.release_path(&release),
            release: release.clone(),
        };

        match self.transactions.run(&plan, &run).await {
            Ok(results) => {
                self.print_summary(&release, &results, ReleasePhase::Completed);
                self.cleanup_after_deploy().await;
                Ok(results)
            }
            Err(e) => {
                let TransactionError::StepFailed { step, results, .. } = &e;
                self.print_summary(&release, results, ReleasePhase::Failed(*step));
                Err(e.into())
            }
        }
    }

    /// Transaction plan for deploying `release` on top of `previous`
    pub fn plan(&self, release: ReleaseId, previous: Option<&ReleaseId>) -> TransactionPlan {
        let release_path = self.layout.release_path(&release);
        let has_previous = previous.is_some();
        let hooks = &self.config.post_deploy;

        let mut plan = TransactionPlan::new(release.clone())
            .with(
                ReleaseStep::Materialize,
                StepPolicy::Required,
                Compensation::Commands(vec![self.remote.sudo(format!(
                    "chmod -R ug+w {} 2>/dev/null; rm -rf {}",
                    quote_path(&release_path.join("sites")),
                    quote_path(&release_path)
                ))]),
            )
            .with(ReleaseStep::Finalize, StepPolicy::Required, Compensation::None)
            .with(
                ReleaseStep::Cutover,
                StepPolicy::Required,
                self.cutover_compensation(previous),
            );

        let snapshots_taken = has_previous && hooks.backup.step_policy().is_some();

        for step in ReleaseStep::hook_sequence() {
            let applies = match step {
                ReleaseStep::DetectMaintenance | ReleaseStep::BackupFiles | ReleaseStep::BackupDatabase => has_previous,
                ReleaseStep::SiteInstall => self.config.site.install.enabled && !has_previous,
                _ => true,
            };
            if !applies {
                continue;
            }
            let Some(policy) = hooks.policy_for(step).step_policy() else {
                continue;
            };

            let compensation = match step {
                ReleaseStep::BackupFiles => Compensation::Commands(self.backups.cleanup_commands(
                    &self.config.site.domains,
                    &release,
                    SnapshotKind::Files,
                )),
                ReleaseStep::BackupDatabase => Compensation::Commands(self.backups.cleanup_commands(
                    &self.config.site.domains,
                    &release,
                    SnapshotKind::Database,
                )),
                ReleaseStep::MaintenanceOn => Compensation::Invoke(ReleaseStep::MaintenanceOff),
                ReleaseStep::Migrate if snapshots_taken => Compensation::Invoke(ReleaseStep::Restore),
                _ => Compensation::None,
            };
            plan = plan.with(step, policy, compensation);
        }

        plan
    }

    fn cutover_compensation(&self, previous: Option<&ReleaseId>) -> Compensation {
        match previous {
            Some(previous) => Compensation::Commands(vec![self.remote.sudo(self.repoint_line(previous))]),
            None => Compensation::Unavailable {
                cleanup: vec![self.remote.sudo(format!(
                    "rm -f {} {}",
                    quote_path(&self.layout.current_path()),
                    quote_path(&self.layout.current_staging_path())
                ))],
                reason: "no previous release to roll back to".to_string(),
            },
        }
    }

    /// Normalize permissions and link shared children into a release
    pub async fn finalize(&self, release_path: &Path) -> Result<(), DeployError> {
        let mut parts = Vec::new();
        if self.config.group_writable {
            parts.push(format!("chmod -R g+w {}", quote_path(release_path)));
        }

        for child in &self.config.shared_children {
            let child = child.trim_matches('/');
            let target = release_path.join(child);
            let parent = target.parent().map(Path::to_path_buf).unwrap_or_else(|| release_path.to_path_buf());
            parts.push(format!(
                "rm -rf {target} && mkdir -p {parent} && ln -s {shared} {target}",
                target = quote_path(&target),
                parent = quote_path(&parent),
                shared = quote_path(&self.layout.shared_path().join(child)),
            ));
        }

        if parts.is_empty() {
            return Ok(());
        }

        self.remote
            .try_sudo(parts.join(" && "))
            .await
            .map_err(|e| SiteError::Task {
                task: "finalize",
                source: e,
            })?;
        Ok(())
    }

    /// Build the new link beside `current`, then rename it over `current`
    fn repoint_line(&self, release: &ReleaseId) -> String {
        let staging = quote_path(&self.layout.current_staging_path());
        format!(
            "ln -sfn {1} {0} && mv -T {0} {2}",
            staging,
            quote_path(&self.layout.release_path(release)),
            quote_path(&self.layout.current_path())
        )
    }

    /// Point `current` at `release`; `current` is never missing meanwhile
    pub async fn cutover(&self, release: &ReleaseId) -> Result<(), ReleaseError> {
        self.remote
            .try_sudo(self.repoint_line(release))
            .await
            .map_err(|e| ReleaseError::RepointFailed {
                release: release.to_string(),
                source: e,
            })?;
        info!(release = %release, "current now points at {}", release);
        Ok(())
    }

    // ========================================================================
    // Rollback and retention
    // ========================================================================

    /// Return to the previous release, restoring the latest release's snapshots
    pub async fn rollback(&self) -> Result<RollbackSummary, DeployError> {
        let releases = self.catalog.list_releases().await?;
        let (latest, previous) = match releases.as_slice() {
            [.., previous, latest] => (latest.clone(), previous.clone()),
            _ => return Err(ReleaseError::NoPreviousRelease.into()),
        };

        ui::print_header(&format!("Rollback: {} -> {}", latest, previous));
        self.cutover(&previous).await?;

        let domains = &self.config.site.domains;
        let restored = self.backups.restore_available(domains, &latest).await?;

        if let Err(e) = self.site.clear_cache_all(domains).await {
            warn!(error = %e, "Cache clear after rollback failed");
        }

        let removed = self.catalog.current_target().await? != Some(latest.clone());
        if removed {
            self.catalog.delete_release(&latest).await?;
        }

        ui::print_success(&format!("Rolled back to {}", previous));
        Ok(RollbackSummary {
            from: latest,
            to: previous,
            restored,
            removed,
        })
    }

    /// Prune snapshots, then releases, down to `keep` (configured default)
    pub async fn cleanup(&self, keep: Option<usize>) -> Result<CleanupReport, DeployError> {
        let keep = keep.unwrap_or(self.config.keep_releases);
        if keep == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keep".to_string(),
                value: "0 (the current release is always kept)".to_string(),
            }
            .into());
        }

        let snapshots = match self.backups.prune_snapshots(&self.config.site.domains, keep).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Snapshot pruning failed; pruning releases anyway");
                0
            }
        };
        let releases = self.catalog.prune_old_releases(keep).await?;
        Ok(CleanupReport { releases, snapshots })
    }

    async fn cleanup_after_deploy(&self) {
        match self.cleanup(None).await {
            Ok(report) if !report.releases.is_empty() => {
                info!(pruned = report.releases.len(), snapshots = report.snapshots, "Retention cleanup done");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Retention cleanup failed"),
        }
    }

    /// Prerequisites of the source strategy, the hosts and this machine
    pub async fn check(&self) -> DependencyReport {
        let mut report = match &self.source {
            Some(source) => source.check_dependencies(&self.layout.releases_path()).await,
            None => {
                let mut report = DependencyReport::default();
                report.push("source repository is configured", false);
                report
            }
        };

        let program = self.config.site.cli.split_whitespace().last().unwrap_or_default();
        report.push(
            format!("{} is available on the hosts", program),
            self.remote
                .run(format!("test -x {0} || command -v {0}", quote(program)))
                .await
                .is_ok(),
        );
        report.push(
            format!("{} exists", self.layout.deploy_to().display()),
            self.remote
                .run(format!("test -d {}", quote_path(self.layout.deploy_to())))
                .await
                .is_ok(),
        );
        if !self.config.hosts.is_empty() {
            report.push("ssh is available locally", which::which("ssh").is_ok());
        }
        report
    }

    // ========================================================================
    // Output
    // ========================================================================

    fn print_header(&self, plan: &TransactionPlan, previous: Option<&ReleaseId>) {
        ui::print_header(&format!("Release: {} {}", self.config.application, plan.release));
        info!("Deploy to: {}", self.layout.deploy_to().display());
        match previous {
            Some(previous) => info!("Previous release: {}", previous),
            None => info!("First deployment"),
        }
        info!("Domains: {}", self.config.domain_names().join(", "));
        info!("Steps: {}", plan.len());
        println!();
    }

    fn print_summary(&self, release: &ReleaseId, results: &[StepResult], phase: ReleasePhase) {
        println!();
        match phase {
            ReleasePhase::Completed => {
                ui::print_success(&format!("Release completed: {} {}", self.config.application, release))
            }
            ReleasePhase::Failed(step) => ui::print_error(&format!(
                "Release failed at {}: {} {}",
                step.name(),
                self.config.application,
                release
            )),
        }
        ui::print_step_results(results);
    }
}

/// Forward actions for one deployment
struct ReleaseRun<'a> {
    service: &'a ReleaseService,
    release: ReleaseId,
    release_path: PathBuf,
}

#[async_trait]
impl StepRunner for ReleaseRun<'_> {
    async fn forward(&self, step: ReleaseStep) -> Result<(), DeployError> {
        let service = self.service;
        let domains = &service.config.site.domains;

        match step {
            ReleaseStep::Materialize => {
                let revision = service.source()?.materialize(&self.release_path).await?;
                info!(release = %self.release, revision = %revision, "Materialized release");
            }
            ReleaseStep::Finalize => service.finalize(&self.release_path).await?,
            ReleaseStep::Cutover => service.cutover(&self.release).await?,
            ReleaseStep::StageFiles => service.site.stage_files(&self.release_path).await?,
            ReleaseStep::SiteSymlinks => service.site.site_symlinks(&self.release_path, domains).await?,
            ReleaseStep::DetectMaintenance => {
                service.maintenance.detect_all(domains).await;
            }
            ReleaseStep::SiteInstall => service.site.install(&self.release_path).await?,
            ReleaseStep::BackupFiles => {
                service
                    .backups
                    .backup_all(domains, &self.release, SnapshotKind::Files)
                    .await?;
            }
            ReleaseStep::BackupDatabase => {
                service
                    .backups
                    .backup_all(domains, &self.release, SnapshotKind::Database)
                    .await?;
            }
            ReleaseStep::MaintenanceOn => service.maintenance.enable_all(domains).await?,
            ReleaseStep::Migrate => {
                let reports = service.migrations.run_all(domains).await?;
                let applied: usize = reports.iter().map(|r| r.applied.len()).sum();
                info!(release = %self.release, applied, "Migrations applied");
            }
            ReleaseStep::ClearCache => service.site.clear_cache_all(domains).await?,
            ReleaseStep::MaintenanceOff => service.maintenance.disable_all(domains).await?,
            ReleaseStep::Restore => {
                service.backups.restore_available(domains, &self.release).await?;
            }
        }
        Ok(())
    }
}
