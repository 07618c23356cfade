//! Source update strategies
//!
//! Materializing a release means populating its directory with code and a
//! `REVISION` file. The revision is resolved once, on the machine driving
//! the deployment, so every host checks out the same commit.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use super::executor::Remote;
use super::shell::{quote, quote_path};
use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::path_builder::DeployLayout;

/// One prerequisite verified by `check`
#[derive(Debug, Clone, Serialize)]
pub struct DependencyCheck {
    pub description: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyReport {
    pub checks: Vec<DependencyCheck>,
}

impl DependencyReport {
    pub fn push(&mut self, description: impl Into<String>, passed: bool) {
        self.checks.push(DependencyCheck {
            description: description.into(),
            passed,
        });
    }

    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DependencyCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn merge(&mut self, other: DependencyReport) {
        self.checks.extend(other.checks);
    }
}

/// Populates a fresh release directory
#[async_trait]
pub trait SourceStrategy: Send + Sync {
    /// Fill `release_path` and write its REVISION file; returns the revision
    async fn materialize(&self, release_path: &Path) -> Result<String, SourceError>;

    /// Verify what this strategy needs on the hosts and locally
    async fn check_dependencies(&self, releases_path: &Path) -> DependencyReport;
}

/// Fresh `git clone` of one revision per release
pub struct GitCheckout {
    remote: Remote,
    repository: String,
    branch: String,
    revision: Option<String>,
}

impl GitCheckout {
    pub fn new(remote: Remote, config: &SourceConfig) -> Self {
        Self {
            remote,
            repository: config.repository.clone(),
            branch: config.branch.clone(),
            revision: config.revision.clone(),
        }
    }

    /// Pinned revision, else the branch head from `git ls-remote`
    pub async fn resolve_revision(&self) -> Result<String, SourceError> {
        if let Some(revision) = self.revision.as_deref().filter(|r| !r.is_empty()) {
            return Ok(revision.to_string());
        }

        let unresolved = |message: String| SourceError::RevisionUnresolved {
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            message,
        };

        let output = self
            .remote
            .execute_locally(&format!(
                "git ls-remote {} {}",
                quote(&self.repository),
                quote(&format!("refs/heads/{}", self.branch))
            ))
            .await
            .map_err(|e| unresolved(e.to_string()))?;

        let revision = output
            .stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(str::to_string)
            .ok_or_else(|| unresolved("branch not found".to_string()))?;

        debug!(branch = %self.branch, revision = %revision, "Resolved revision");
        Ok(revision)
    }

    fn checkout_command(&self, release_path: &Path, revision: &str) -> String {
        let path = quote_path(release_path);
        format!(
            "git clone -q -b {branch} {repo} {path} && cd {path} && git checkout -q -b deploy {rev} && (echo {rev} > {revision_file})",
            branch = quote(&self.branch),
            repo = quote(&self.repository),
            path = path,
            rev = quote(revision),
            revision_file = quote_path(&DeployLayout::revision_file(release_path)),
        )
    }
}

#[async_trait]
impl SourceStrategy for GitCheckout {
    async fn materialize(&self, release_path: &Path) -> Result<String, SourceError> {
        let revision = self.resolve_revision().await?;
        self.remote
            .run(self.checkout_command(release_path, &revision))
            .await
            .map_err(|e| SourceError::CheckoutFailed {
                path: release_path.display().to_string(),
                source: e,
            })?;

        info!(revision = %revision, path = %release_path.display(), "Checked out release");
        Ok(revision)
    }

    async fn check_dependencies(&self, releases_path: &Path) -> DependencyReport {
        let mut report = DependencyReport::default();

        report.push(
            "git is installed on the hosts",
            self.remote.run("command -v git").await.is_ok(),
        );

        let releases = quote_path(releases_path);
        report.push(
            format!("{} exists and is writable", releases_path.display()),
            self.remote
                .try_sudo(format!("test -d {0} && test -w {0}", releases))
                .await
                .is_ok(),
        );

        report.push("git is available locally", which::which("git").is_ok());
        report
    }
}
