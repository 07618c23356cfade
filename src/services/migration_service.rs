//! Migration service - applies pending migrations exactly once
//!
//! For each domain and each migration kind independently: read the history
//! ledger, list the artifacts shipped in the current release, and apply the
//! ones the ledger does not hold yet, in natural order. Every success is
//! appended to the ledger before the next artifact starts, so a re-run
//! after a partial failure resumes at the failed artifact.

use glob::Pattern;
use tracing::{debug, info, warn};

use super::for_each_domain;
use crate::config::{DomainConfig, MigrationsConfig};
use crate::domain::migration::{parse_ledger, parse_script, pending, sort_natural};
use crate::domain::{MigrationKind, MigrationReport};
use crate::error::{ExecutorError, MigrationError};
use crate::infrastructure::shell::{quote, quote_path};
use crate::infrastructure::{Remote, SiteCli};
use crate::path_builder::DeployLayout;

/// Service for applying ledgered migrations
pub struct MigrationService {
    remote: Remote,
    layout: DeployLayout,
    cli: SiteCli,
    config: MigrationsConfig,
    exclude: Vec<Pattern>,
}

impl MigrationService {
    pub fn new(
        remote: Remote,
        layout: DeployLayout,
        cli: SiteCli,
        config: MigrationsConfig,
    ) -> Result<Self, MigrationError> {
        let exclude = config
            .exclude
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| MigrationError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            remote,
            layout,
            cli,
            config,
            exclude,
        })
    }

    fn extension(&self, kind: MigrationKind) -> &str {
        match kind {
            MigrationKind::Script => &self.config.script_extension,
            MigrationKind::Sql => &self.config.sql_extension,
        }
    }

    /// Migrate every domain concurrently
    pub async fn run_all(&self, domains: &[DomainConfig]) -> Result<Vec<MigrationReport>, MigrationError> {
        let reports = for_each_domain(domains, |d| self.run_domain(&d.name)).await?;
        Ok(reports.into_iter().flatten().collect())
    }

    /// Database updates, then script artifacts, then SQL artifacts
    ///
    /// A failing pass does not stop the passes after it; the first failure
    /// is returned once all of them have run.
    pub async fn run_domain(&self, domain: &str) -> Result<Vec<MigrationReport>, MigrationError> {
        let mut first_error = None;
        if self.config.apply_updates {
            if let Err(e) = self.apply_updates(domain).await {
                warn!(domain = %domain, error = %e, "Database updates failed");
                first_error = Some(e);
            }
        }

        let mut reports = Vec::with_capacity(MigrationKind::ALL.len());
        for kind in MigrationKind::ALL {
            match self.apply(domain, kind).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(domain = %domain, kind = %kind, error = %e, "Migration pass failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn apply_updates(&self, domain: &str) -> Result<(), MigrationError> {
        info!(domain = %domain, "Applying database updates");
        self.remote
            .run(self.cli.update_apply(&self.layout.current_path(), domain))
            .await
            .map_err(|e| MigrationError::UpdatesFailed {
                domain: domain.to_string(),
                source: e,
            })?;
        Ok(())
    }

    /// Apply the pending artifacts of one (domain, kind)
    pub async fn apply(&self, domain: &str, kind: MigrationKind) -> Result<MigrationReport, MigrationError> {
        let history = self.read_ledger(domain, kind).await?;
        let available = self.available(domain, kind).await?;

        self.write_scratch(domain, kind, &available).await?;
        let result = self.apply_pending(domain, kind, &available, &history).await;

        let scratch = self.layout.available_path(domain, kind);
        if let Err(e) = self.remote.run(format!("rm -f {}", quote_path(&scratch))).await {
            warn!(domain = %domain, kind = %kind, error = %e, "Could not remove scratch listing");
        }

        result
    }

    /// What `apply` would run, without running it
    pub async fn pending(&self, domain: &str, kind: MigrationKind) -> Result<Vec<String>, MigrationError> {
        let history = self.read_ledger(domain, kind).await?;
        let available = self.available(domain, kind).await?;
        Ok(pending(&available, &history))
    }

    async fn apply_pending(
        &self,
        domain: &str,
        kind: MigrationKind,
        available: &[String],
        history: &[String],
    ) -> Result<MigrationReport, MigrationError> {
        let todo = pending(available, history);
        let mut report = MigrationReport {
            domain: domain.to_string(),
            kind,
            applied: Vec::new(),
            skipped: available.len() - todo.len(),
        };

        if todo.is_empty() {
            debug!(domain = %domain, kind = %kind, "No pending migrations");
            return Ok(report);
        }
        info!(domain = %domain, kind = %kind, pending = todo.len(), "Applying migrations");

        for artifact in todo {
            if let Err(source) = self.apply_artifact(domain, kind, &artifact).await {
                return Err(MigrationError::ApplyFailed {
                    domain: domain.to_string(),
                    kind,
                    artifact,
                    applied: report.applied,
                    source,
                });
            }
            self.record(domain, kind, &artifact).await?;
            info!(domain = %domain, kind = %kind, artifact = %artifact, "Applied migration");
            report.applied.push(artifact);
        }

        Ok(report)
    }

    async fn apply_artifact(&self, domain: &str, kind: MigrationKind, artifact: &str) -> Result<(), ExecutorError> {
        let root = self.layout.current_path();
        let path = self.layout.artifact_path(domain).join(artifact);

        match kind {
            MigrationKind::Sql => {
                self.remote.run(self.cli.sql_load(&root, domain, &path)).await?;
            }
            MigrationKind::Script => {
                let content = self.remote.capture(format!("cat {}", quote_path(&path))).await?;
                for line in parse_script(&content) {
                    debug!(domain = %domain, artifact = %artifact, command = %line, "Running script line");
                    self.remote.run(self.cli.invoke(&root, domain, &line)).await?;
                }
            }
        }
        Ok(())
    }

    async fn read_ledger(&self, domain: &str, kind: MigrationKind) -> Result<Vec<String>, MigrationError> {
        let ledger = self.layout.ledger_path(domain, kind);
        let content = self
            .remote
            .capture(format!("if [ -f {0} ]; then cat {0}; fi", quote_path(&ledger)))
            .await
            .map_err(|e| MigrationError::LedgerRead {
                domain: domain.to_string(),
                kind,
                source: e,
            })?;

        let legacy_prefix = self.layout.artifact_path(domain).display().to_string();
        Ok(parse_ledger(&content, &legacy_prefix))
    }

    /// Artifact identifiers relative to the domain's migration directory, sorted
    async fn available(&self, domain: &str, kind: MigrationKind) -> Result<Vec<String>, MigrationError> {
        let dir = quote_path(&self.layout.artifact_path(domain));
        let listing = self
            .remote
            .capture(format!(
                "if [ -d {0} ]; then cd {0} && find . -type f -name {1}; fi",
                dir,
                quote(&format!("*.{}", self.extension(kind)))
            ))
            .await
            .map_err(|e| MigrationError::Listing {
                domain: domain.to_string(),
                kind,
                source: e,
            })?;

        let names: Vec<String> = listing
            .lines()
            .map(|line| line.trim().trim_start_matches("./"))
            .filter(|name| !name.is_empty())
            .filter(|name| {
                let skip = self.exclude.iter().any(|p| p.matches(name));
                if skip {
                    debug!(domain = %domain, artifact = %name, "Excluded migration");
                }
                !skip
            })
            .map(str::to_string)
            .collect();

        sort_natural(names).map_err(|a| MigrationError::AmbiguousOrder {
            domain: domain.to_string(),
            kind,
            first: a.first,
            second: a.second,
        })
    }

    async fn write_scratch(&self, domain: &str, kind: MigrationKind, available: &[String]) -> Result<(), MigrationError> {
        let dir = quote_path(&self.layout.migration_state_path(domain));
        let scratch = quote_path(&self.layout.available_path(domain, kind));
        let write = if available.is_empty() {
            format!(": > {}", scratch)
        } else {
            let names: Vec<String> = available.iter().map(|n| quote(n)).collect();
            format!("printf '%s\\n' {} > {}", names.join(" "), scratch)
        };

        self.remote
            .run(format!("mkdir -p {} && {}", dir, write))
            .await
            .map_err(|e| MigrationError::Listing {
                domain: domain.to_string(),
                kind,
                source: e,
            })?;
        Ok(())
    }

    async fn record(&self, domain: &str, kind: MigrationKind, artifact: &str) -> Result<(), MigrationError> {
        let ledger = self.layout.ledger_path(domain, kind);
        self.remote
            .run(format!("printf '%s\\n' {} >> {}", quote(artifact), quote_path(&ledger)))
            .await
            .map_err(|e| MigrationError::LedgerAppend {
                domain: domain.to_string(),
                kind,
                artifact: artifact.to_string(),
                source: e,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    const RELEASE: &str = "20230101000000";

    fn service(fixture: &Fixture, config: MigrationsConfig) -> MigrationService {
        let deploy = fixture.config();
        MigrationService::new(
            fixture.remote(),
            fixture.layout(),
            SiteCli::new(deploy.site.cli),
            config,
        )
        .unwrap()
    }

    fn deployed() -> Fixture {
        let fixture = Fixture::new();
        fixture.add_release(RELEASE);
        fixture.set_current(RELEASE);
        fixture
    }

    fn ship_five(fixture: &Fixture) {
        for name in ["001_a.sql", "002_b.sql", "003_c.sql", "004_d.sql", "005_e.sql"] {
            fixture.write_artifact(RELEASE, "default", name, &format!("-- {}\n", name));
        }
    }

    #[tokio::test]
    async fn test_pending_uses_natural_order() {
        let fixture = deployed();
        for name in ["010_index.sql", "001_init.sql", "002_add_col.sql"] {
            fixture.write_artifact(RELEASE, "default", name, "select 1;\n");
        }
        fixture.write_ledger("default", MigrationKind::Sql, "001_init.sql\n");

        let pending = service(&fixture, MigrationsConfig::default())
            .pending("default", MigrationKind::Sql)
            .await
            .unwrap();
        assert_eq!(pending, vec!["002_add_col.sql", "010_index.sql"]);
    }

    #[tokio::test]
    async fn test_second_run_applies_nothing() {
        let fixture = deployed();
        ship_five(&fixture);
        let migrations = service(&fixture, MigrationsConfig::default());

        let first = migrations.apply("default", MigrationKind::Sql).await.unwrap();
        assert_eq!(first.applied.len(), 5);
        let calls = fixture.site_calls().len();

        let second = migrations.apply("default", MigrationKind::Sql).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.skipped, 5);
        assert_eq!(fixture.ledger("default", MigrationKind::Sql).len(), 5);
        assert_eq!(fixture.site_calls().len(), calls);
    }

    #[tokio::test]
    async fn test_partial_failure_resumes_at_failed_artifact() {
        let fixture = deployed();
        ship_five(&fixture);
        let migrations = service(&fixture, MigrationsConfig::default());

        fixture.fail_on("003_c");
        let err = migrations.apply("default", MigrationKind::Sql).await.unwrap_err();
        match &err {
            MigrationError::ApplyFailed { artifact, applied, domain, .. } => {
                assert_eq!(artifact, "003_c.sql");
                assert_eq!(applied, &vec!["001_a.sql".to_string(), "002_b.sql".to_string()]);
                assert_eq!(domain, "default");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fixture.ledger("default", MigrationKind::Sql), vec!["001_a.sql", "002_b.sql"]);
        assert!(!fixture.layout().available_path("default", MigrationKind::Sql).exists());

        fixture.clear_failures();
        let report = migrations.apply("default", MigrationKind::Sql).await.unwrap();
        assert_eq!(report.applied, vec!["003_c.sql", "004_d.sql", "005_e.sql"]);
        assert_eq!(fixture.ledger("default", MigrationKind::Sql).len(), 5);
        assert_eq!(fixture.database().matches("-- 001_a.sql").count(), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_dir_is_noop() {
        let fixture = deployed();
        let reports = service(&fixture, MigrationsConfig::default())
            .run_domain("default")
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(MigrationReport::is_noop));
        assert!(fixture.site_calls()[0].starts_with("updb"));
    }

    #[tokio::test]
    async fn test_script_lines_run_in_order() {
        let fixture = deployed();
        fixture.write_artifact(
            RELEASE,
            "default",
            "001_enable.drush",
            "# enable the shop\nen commerce\n\nvset shop_enabled 1\n",
        );
        let config = MigrationsConfig {
            apply_updates: false,
            ..MigrationsConfig::default()
        };

        let reports = service(&fixture, config).run_domain("default").await.unwrap();
        assert_eq!(reports[0].applied, vec!["001_enable.drush"]);

        let calls = fixture.site_calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("en commerce --root="));
        assert!(calls[1].starts_with("vset shop_enabled 1 --root="));
        assert_eq!(fixture.ledger("default", MigrationKind::Script), vec!["001_enable.drush"]);
    }

    #[tokio::test]
    async fn test_script_failure_still_applies_sql() {
        let fixture = deployed();
        fixture.write_artifact(RELEASE, "default", "001_enable.drush", "en commerce\n");
        fixture.write_artifact(RELEASE, "default", "001_init.sql", "-- 001_init\n");
        fixture.fail_on("commerce");
        let config = MigrationsConfig {
            apply_updates: false,
            ..MigrationsConfig::default()
        };

        let err = service(&fixture, config).run_domain("default").await.unwrap_err();
        assert!(matches!(err, MigrationError::ApplyFailed { kind: MigrationKind::Script, .. }));
        assert!(fixture.ledger("default", MigrationKind::Script).is_empty());
        assert_eq!(fixture.ledger("default", MigrationKind::Sql), vec!["001_init.sql"]);
        assert!(fixture.database().contains("-- 001_init"));
    }

    #[tokio::test]
    async fn test_failed_updates_still_apply_artifacts() {
        let fixture = deployed();
        fixture.write_artifact(RELEASE, "default", "001_init.sql", "-- 001_init\n");
        fixture.fail_on("updb");

        let err = service(&fixture, MigrationsConfig::default())
            .run_domain("default")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::UpdatesFailed { .. }));
        assert_eq!(fixture.ledger("default", MigrationKind::Sql), vec!["001_init.sql"]);
    }

    #[tokio::test]
    async fn test_legacy_ledger_entries_are_recognised() {
        let fixture = deployed();
        fixture.write_artifact(RELEASE, "default", "001_init.sql", "select 1;\n");
        let legacy = fixture.layout().artifact_path("default").join("001_init.sql");
        fixture.write_ledger("default", MigrationKind::Sql, &format!("{}\n", legacy.display()));

        let report = service(&fixture, MigrationsConfig::default())
            .apply("default", MigrationKind::Sql)
            .await
            .unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_excluded_and_nested_artifacts() {
        let fixture = deployed();
        fixture.write_artifact(RELEASE, "default", "001_init.sql", "-- init\n");
        fixture.write_artifact(RELEASE, "default", "002_wip.draft.sql", "-- wip\n");
        fixture.write_artifact(RELEASE, "default", "7.x/003_later.sql", "-- later\n");
        let config = MigrationsConfig {
            exclude: vec!["*.draft.sql".to_string()],
            ..MigrationsConfig::default()
        };

        let pending = service(&fixture, config)
            .pending("default", MigrationKind::Sql)
            .await
            .unwrap();
        assert_eq!(pending, vec!["001_init.sql", "7.x/003_later.sql"]);
    }

    #[tokio::test]
    async fn test_ambiguous_names_are_rejected() {
        let fixture = deployed();
        fixture.write_artifact(RELEASE, "default", "1_init.sql", "");
        fixture.write_artifact(RELEASE, "default", "01_init.sql", "");

        let err = service(&fixture, MigrationsConfig::default())
            .apply("default", MigrationKind::Sql)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::AmbiguousOrder { .. }));
        assert!(fixture.site_calls().is_empty());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let fixture = Fixture::new();
        let config = MigrationsConfig {
            exclude: vec!["[".to_string()],
            ..MigrationsConfig::default()
        };
        let result = MigrationService::new(
            fixture.remote(),
            fixture.layout(),
            SiteCli::new("drush"),
            config,
        );
        assert!(matches!(result, Err(MigrationError::InvalidPattern { .. })));
    }
}
