//! Release domain types
//!
//! Defines release identifiers, the release transaction as an ordered list
//! of steps, and the retention window shared by releases and snapshots.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ReleaseError;

/// strftime pattern of a release identifier (fixed width, sortable)
pub const RELEASE_ID_FORMAT: &str = "%Y%m%d%H%M%S";

const RELEASE_ID_LEN: usize = 14;

/// Identifier of one release directory.
///
/// Fixed-width UTC timestamps, so lexicographic order equals chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Identifier for a release created right now
    pub fn now() -> Self {
        Self::from_time(Utc::now())
    }

    pub fn from_time(time: DateTime<Utc>) -> Self {
        Self(time.format(RELEASE_ID_FORMAT).to_string())
    }

    /// Parse an identifier, rejecting anything that is not a fixed-width timestamp
    pub fn parse(value: &str) -> Result<Self, ReleaseError> {
        let value = value.trim();
        if value.len() != RELEASE_ID_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReleaseError::InvalidId {
                value: value.to_string(),
            });
        }
        NaiveDateTime::parse_from_str(value, RELEASE_ID_FORMAT).map_err(|_| {
            ReleaseError::InvalidId {
                value: value.to_string(),
            }
        })?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creation time encoded in the identifier
    pub fn created_at(&self) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(&self.0, RELEASE_ID_FORMAT)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_default()
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReleaseId {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A deployed release as seen on the remote filesystem
#[derive(Debug, Clone, Serialize)]
pub struct Release {
    pub id: ReleaseId,
    pub path: PathBuf,
    /// Source revision recorded in `<release>/REVISION`, if readable
    pub revision: Option<String>,
}

impl Release {
    pub fn created_at(&self) -> DateTime<Utc> {
        self.id.created_at()
    }
}

/// Entries that fall outside the `keep` most recent, oldest first.
///
/// `sorted` must already be in ascending order.
pub fn expired<T: Clone>(sorted: &[T], keep: usize) -> Vec<T> {
    if sorted.len() <= keep {
        return Vec::new();
    }
    sorted[..sorted.len() - keep].to_vec()
}

/// Individual steps of a release transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseStep {
    /// Check out the source into a new release directory
    Materialize,
    /// Normalize permissions and link shared children
    Finalize,
    /// Repoint `current` at the new release
    Cutover,
    /// Promote stage-specific .htaccess and robots.txt
    StageFiles,
    /// Virtual-host aliases plus settings/files symlinks
    SiteSymlinks,
    /// Discover each domain's maintenance mechanism
    DetectMaintenance,
    /// Install the site on the very first deployment
    SiteInstall,
    /// Snapshot each domain's shared files
    BackupFiles,
    /// Snapshot each domain's database
    BackupDatabase,
    /// Put every domain into maintenance
    MaintenanceOn,
    /// Apply pending migrations
    Migrate,
    /// Clear site caches
    ClearCache,
    /// Take every domain out of maintenance
    MaintenanceOff,
    /// Restore files and databases from this release's snapshots
    Restore,
}

impl ReleaseStep {
    /// Get human-readable name for the step
    pub fn name(&self) -> &'static str {
        match self {
            Self::Materialize => "Materialize",
            Self::Finalize => "Finalize",
            Self::Cutover => "Cutover",
            Self::StageFiles => "Stage Files",
            Self::SiteSymlinks => "Site Symlinks",
            Self::DetectMaintenance => "Detect Maintenance",
            Self::SiteInstall => "Site Install",
            Self::BackupFiles => "Backup Files",
            Self::BackupDatabase => "Backup Database",
            Self::MaintenanceOn => "Maintenance On",
            Self::Migrate => "Migrate",
            Self::ClearCache => "Clear Cache",
            Self::MaintenanceOff => "Maintenance Off",
            Self::Restore => "Restore",
        }
    }

    /// Get emoji for the step
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Materialize => "📦",
            Self::Finalize => "🔧",
            Self::Cutover => "🚀",
            Self::StageFiles => "📝",
            Self::SiteSymlinks => "🔗",
            Self::DetectMaintenance => "🔍",
            Self::SiteInstall => "🏗️",
            Self::BackupFiles => "🗄️",
            Self::BackupDatabase => "💾",
            Self::MaintenanceOn => "🚧",
            Self::Migrate => "🗃️",
            Self::ClearCache => "🧹",
            Self::MaintenanceOff => "✅",
            Self::Restore => "⏪",
        }
    }

    /// The three steps every release transaction starts with
    pub fn core_sequence() -> [ReleaseStep; 3] {
        [Self::Materialize, Self::Finalize, Self::Cutover]
    }

    /// Fixed order of the hooks that follow a successful cutover
    pub fn hook_sequence() -> [ReleaseStep; 10] {
        [
            Self::StageFiles,
            Self::SiteSymlinks,
            Self::DetectMaintenance,
            Self::SiteInstall,
            Self::BackupFiles,
            Self::BackupDatabase,
            Self::MaintenanceOn,
            Self::Migrate,
            Self::ClearCache,
            Self::MaintenanceOff,
        ]
    }
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Current phase of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePhase {
    /// Completed successfully
    Completed,
    /// Failed at a specific step and rolled back
    Failed(ReleaseStep),
}

/// Result of a release step execution
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: ReleaseStep,
    pub success: bool,
    pub duration: Duration,
    pub message: Option<String>,
}

impl StepResult {
    pub fn success(step: ReleaseStep, duration: Duration) -> Self {
        Self {
            step,
            success: true,
            duration,
            message: None,
        }
    }

    pub fn failure(step: ReleaseStep, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            duration,
            message: Some(message.into()),
        }
    }
}
