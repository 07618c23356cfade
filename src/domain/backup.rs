//! Backup snapshot naming
//!
//! A snapshot is addressed by (domain, release id, kind); the file name is a
//! pure function of that triple so a snapshot can always be found again,
//! and a partial one always deleted.

use serde::Serialize;
use std::fmt;

use super::release::ReleaseId;

/// What a snapshot captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// The domain's shared file tree, as a bzip2 tarball
    Files,
    /// The domain's database, as a gzipped SQL dump
    Database,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 2] = [SnapshotKind::Files, SnapshotKind::Database];

    /// Directory under `shared/` holding snapshots of this kind
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Files => "released_files",
            Self::Database => "released_db",
        }
    }

    fn infix(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Database => "db",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Files => "tar.bz2",
            Self::Database => "sql.gz",
        }
    }

    /// `<domain>_files_<id>.tar.bz2` or `<domain>_db_<id>.sql.gz`
    pub fn file_name(&self, domain: &str, release: &ReleaseId) -> String {
        format!(
            "{}_{}_{}.{}",
            domain,
            self.infix(),
            release,
            self.extension()
        )
    }

    /// Release identifier encoded in a snapshot file name of this domain and kind
    pub fn parse_release(&self, domain: &str, file_name: &str) -> Option<ReleaseId> {
        let prefix = format!("{}_{}_", domain, self.infix());
        let suffix = format!(".{}", self.extension());
        let id = file_name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
        ReleaseId::parse(id).ok()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Database => "database",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a restore actually put back for one domain
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub domain: String,
    pub files: bool,
    pub database: bool,
}
