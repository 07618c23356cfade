//! Release catalog
//!
//! The ordered set of deployed releases, read from the `releases/`
//! directory on the hosts. Release identifiers are fixed-width timestamps,
//! so sorting them lexicographically sorts them chronologically.

use tracing::{debug, info};

use crate::domain::release::expired;
use crate::domain::{Release, ReleaseId};
use crate::error::ReleaseError;
use crate::infrastructure::shell::quote_path;
use crate::infrastructure::Remote;
use crate::path_builder::DeployLayout;

pub struct ReleaseCatalog {
    remote: Remote,
    layout: DeployLayout,
}

impl ReleaseCatalog {
    pub fn new(remote: Remote, layout: DeployLayout) -> Self {
        Self { remote, layout }
    }

    pub fn layout(&self) -> &DeployLayout {
        &self.layout
    }

    /// Sorted, de-duplicated release identifiers; empty before the first deploy
    pub async fn list_releases(&self) -> Result<Vec<ReleaseId>, ReleaseError> {
        let path = self.layout.releases_path();
        let listing = match self.remote.try_sudo(format!("ls -1 {}", quote_path(&path))).await {
            Ok(output) => output.stdout,
            Err(e) if e.stderr().is_some_and(|s| s.contains("No such file")) => {
                debug!(path = %path.display(), "No releases directory yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ReleaseError::ListFailed {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };

        let mut releases: Vec<ReleaseId> = listing
            .split_whitespace()
            .filter_map(|entry| match ReleaseId::parse(entry) {
                Ok(id) => Some(id),
                Err(_) => {
                    debug!(entry = %entry, "Ignoring non-release entry");
                    None
                }
            })
            .collect();
        releases.sort();
        releases.dedup();
        Ok(releases)
    }

    /// Latest release
    pub async fn current_release(&self) -> Result<Option<ReleaseId>, ReleaseError> {
        Ok(self.list_releases().await?.pop())
    }

    /// Second-to-latest release
    pub async fn previous_release(&self) -> Result<Option<ReleaseId>, ReleaseError> {
        let releases = self.list_releases().await?;
        Ok(releases.len().checked_sub(2).map(|i| releases[i].clone()))
    }

    pub fn release_path(&self, release: &ReleaseId) -> std::path::PathBuf {
        self.layout.release_path(release)
    }

    /// Release with its recorded source revision
    pub async fn release(&self, id: &ReleaseId) -> Result<Release, ReleaseError> {
        let path = self.layout.release_path(id);
        let revision = self.read_revision(&path).await?;
        Ok(Release {
            id: id.clone(),
            path,
            revision,
        })
    }

    /// Source revision of whatever `current` points at
    pub async fn current_revision(&self) -> Result<Option<String>, ReleaseError> {
        self.read_revision(&self.layout.current_path()).await
    }

    async fn read_revision(&self, release_path: &std::path::Path) -> Result<Option<String>, ReleaseError> {
        let file = DeployLayout::revision_file(release_path);
        let content = self
            .remote
            .capture(format!(
                "if [ -f {0} ]; then cat {0}; fi",
                quote_path(&file)
            ))
            .await
            .map_err(|e| ReleaseError::ReadFailed {
                path: file.display().to_string(),
                source: e,
            })?;
        let revision = content.trim();
        Ok((!revision.is_empty()).then(|| revision.to_string()))
    }

    /// Release the `current` symlink points at, if it is a release
    pub async fn current_target(&self) -> Result<Option<ReleaseId>, ReleaseError> {
        let current = self.layout.current_path();
        let target = self
            .remote
            .capture(format!(
                "if [ -L {0} ]; then readlink {0}; fi",
                quote_path(&current)
            ))
            .await
            .map_err(|e| ReleaseError::ReadFailed {
                path: current.display().to_string(),
                source: e,
            })?;

        let name = target.trim().trim_end_matches('/').rsplit('/').next().unwrap_or("");
        Ok(ReleaseId::parse(name).ok())
    }

    /// Delete every release older than the `keep` most recent, oldest first
    pub async fn prune_old_releases(&self, keep: usize) -> Result<Vec<ReleaseId>, ReleaseError> {
        let releases = self.list_releases().await?;
        let doomed = expired(&releases, keep);
        if doomed.is_empty() {
            debug!(total = releases.len(), keep, "Nothing to prune");
            return Ok(doomed);
        }

        if let Some(current) = self.current_target().await? {
            if doomed.contains(&current) {
                return Err(ReleaseError::PruneCurrent {
                    release: current.to_string(),
                });
            }
        }

        for release in &doomed {
            self.delete_release(release).await?;
        }
        info!(pruned = doomed.len(), kept = releases.len() - doomed.len(), "Pruned old releases");
        Ok(doomed)
    }

    pub async fn delete_release(&self, release: &ReleaseId) -> Result<(), ReleaseError> {
        let path = self.layout.release_path(release);
        self.remote
            .try_sudo(format!("rm -rf {}", quote_path(&path)))
            .await
            .map_err(|e| ReleaseError::DeleteFailed {
                release: release.to_string(),
                source: e,
            })?;
        debug!(release = %release, "Deleted release");
        Ok(())
    }
}
