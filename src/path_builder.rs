//! # Path Builder
//!
//! Centralized path construction for the remote deployment layout.
//! Every path that is persisted on a host is derived here, so the layout
//! stays compatible with existing deployments:
//!
//! ```text
//! <deploy_to>/releases/<release_id>/
//! <deploy_to>/current -> releases/<release_id>
//! <deploy_to>/shared/sites/<domain>/files/
//! <deploy_to>/shared/migration/<domain>/{script,sql}.{history,available}
//! <deploy_to>/shared/released_files/<domain>/<domain>_files_<id>.tar.bz2
//! <deploy_to>/shared/released_db/<domain>/<domain>_db_<id>.sql.gz
//! <current>/REVISION
//! ```
//!
//! All functions are pure; nothing here touches a filesystem.

use std::path::{Path, PathBuf};

use crate::domain::{MigrationKind, ReleaseId, SnapshotKind};

const RELEASES_DIR: &str = "releases";
const SHARED_DIR: &str = "shared";
const CURRENT_DIR: &str = "current";
const SITES_DIR: &str = "sites";
const MIGRATION_DIR: &str = "migration";
const REVISION_FILE: &str = "REVISION";

/// Remote deployment layout rooted at `deploy_to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployLayout {
    deploy_to: PathBuf,
}

impl DeployLayout {
    pub fn new(deploy_to: impl Into<PathBuf>) -> Self {
        Self {
            deploy_to: deploy_to.into(),
        }
    }

    pub fn deploy_to(&self) -> &Path {
        &self.deploy_to
    }

    // ========================================================================
    // Releases
    // ========================================================================

    pub fn releases_path(&self) -> PathBuf {
        self.deploy_to.join(RELEASES_DIR)
    }

    pub fn release_path(&self, release: &ReleaseId) -> PathBuf {
        self.releases_path().join(release.as_str())
    }

    /// The `current` symlink
    pub fn current_path(&self) -> PathBuf {
        self.deploy_to.join(CURRENT_DIR)
    }

    /// Where the next `current` link is built before being renamed over it
    pub fn current_staging_path(&self) -> PathBuf {
        self.deploy_to.join(format!("{}.tmp", CURRENT_DIR))
    }

    /// `REVISION` file inside a release (or inside `current`)
    pub fn revision_file(release_path: &Path) -> PathBuf {
        release_path.join(REVISION_FILE)
    }

    // ========================================================================
    // Shared state
    // ========================================================================

    pub fn shared_path(&self) -> PathBuf {
        self.deploy_to.join(SHARED_DIR)
    }

    /// `shared/sites/<domain>`
    pub fn domain_shared_path(&self, domain: &str) -> PathBuf {
        self.shared_path().join(SITES_DIR).join(domain)
    }

    /// `shared/sites/<domain>/files`, the persistent per-domain file store
    pub fn domain_files_path(&self, domain: &str) -> PathBuf {
        self.domain_shared_path(domain).join("files")
    }

    /// `sites/<domain>` inside a release
    pub fn release_site_path(release_path: &Path, domain: &str) -> PathBuf {
        release_path.join(SITES_DIR).join(domain)
    }

    // ========================================================================
    // Migrations
    // ========================================================================

    /// `shared/migration/<domain>`, holding ledgers and scratch listings
    pub fn migration_state_path(&self, domain: &str) -> PathBuf {
        self.shared_path().join(MIGRATION_DIR).join(domain)
    }

    pub fn ledger_path(&self, domain: &str, kind: MigrationKind) -> PathBuf {
        self.migration_state_path(domain)
            .join(format!("{}.history", kind.ledger_name()))
    }

    pub fn available_path(&self, domain: &str, kind: MigrationKind) -> PathBuf {
        self.migration_state_path(domain)
            .join(format!("{}.available", kind.ledger_name()))
    }

    /// Copy of a ledger taken alongside the database snapshot for `release`
    pub fn ledger_checkpoint_path(&self, domain: &str, kind: MigrationKind, release: &ReleaseId) -> PathBuf {
        self.migration_state_path(domain)
            .join(format!("{}.history.{}", kind.ledger_name(), release))
    }

    /// `<current>/migration/<domain>`, where artifacts ship inside the release
    pub fn artifact_path(&self, domain: &str) -> PathBuf {
        self.current_path().join(MIGRATION_DIR).join(domain)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn snapshot_dir(&self, domain: &str, kind: SnapshotKind) -> PathBuf {
        self.shared_path().join(kind.dir_name()).join(domain)
    }

    pub fn snapshot_path(&self, domain: &str, release: &ReleaseId, kind: SnapshotKind) -> PathBuf {
        self.snapshot_dir(domain, kind)
            .join(kind.file_name(domain, release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> DeployLayout {
        DeployLayout::new("/srv/site")
    }

    #[test]
    fn test_release_paths() {
        let id = ReleaseId::parse("20230101000000").unwrap();
        let layout = layout();
        assert_eq!(
            layout.release_path(&id),
            PathBuf::from("/srv/site/releases/20230101000000")
        );
        assert_eq!(layout.current_path(), PathBuf::from("/srv/site/current"));
        assert_eq!(layout.current_staging_path(), PathBuf::from("/srv/site/current.tmp"));
        assert_eq!(
            DeployLayout::revision_file(&layout.current_path()),
            PathBuf::from("/srv/site/current/REVISION")
        );
    }

    #[test]
    fn test_migration_paths() {
        let layout = layout();
        assert_eq!(
            layout.ledger_path("default", MigrationKind::Script),
            PathBuf::from("/srv/site/shared/migration/default/script.history")
        );
        assert_eq!(
            layout.available_path("default", MigrationKind::Sql),
            PathBuf::from("/srv/site/shared/migration/default/sql.available")
        );
        assert_eq!(
            layout.artifact_path("default"),
            PathBuf::from("/srv/site/current/migration/default")
        );
        let id = ReleaseId::parse("20230102000000").unwrap();
        assert_eq!(
            layout.ledger_checkpoint_path("default", MigrationKind::Sql, &id),
            PathBuf::from("/srv/site/shared/migration/default/sql.history.20230102000000")
        );
    }

    #[test]
    fn test_snapshot_paths() {
        let id = ReleaseId::parse("20230102000000").unwrap();
        let layout = layout();
        assert_eq!(
            layout.snapshot_path("shop", &id, SnapshotKind::Files),
            PathBuf::from("/srv/site/shared/released_files/shop/shop_files_20230102000000.tar.bz2")
        );
        assert_eq!(
            layout.snapshot_path("shop", &id, SnapshotKind::Database),
            PathBuf::from("/srv/site/shared/released_db/shop/shop_db_20230102000000.sql.gz")
        );
        assert_eq!(
            layout.domain_files_path("shop"),
            PathBuf::from("/srv/site/shared/sites/shop/files")
        );
    }
}
