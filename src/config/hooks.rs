//! Post-cutover hook configuration.
//!
//! Each hook can be skipped, run best-effort, or required. Required hooks
//! abort and compensate the whole release when they fail.

use serde::{Deserialize, Serialize};

use crate::domain::{ReleaseStep, StepPolicy};

/// How a post-cutover hook takes part in the release transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPolicy {
    Skip,
    BestEffort,
    Required,
}

impl HookPolicy {
    /// Transaction policy, or None when the hook is skipped
    pub fn step_policy(&self) -> Option<StepPolicy> {
        match self {
            Self::Skip => None,
            Self::BestEffort => Some(StepPolicy::BestEffort),
            Self::Required => Some(StepPolicy::Required),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDeployConfig {
    #[serde(default = "required")]
    pub stage_files: HookPolicy,

    #[serde(default = "required")]
    pub site_symlinks: HookPolicy,

    #[serde(default = "required")]
    pub site_install: HookPolicy,

    /// Files and database snapshots
    #[serde(default = "best_effort")]
    pub backup: HookPolicy,

    /// Maintenance on before migrating, off afterwards
    #[serde(default = "required")]
    pub maintenance: HookPolicy,

    #[serde(default = "required")]
    pub migrate: HookPolicy,

    #[serde(default = "required")]
    pub clear_cache: HookPolicy,
}

fn required() -> HookPolicy {
    HookPolicy::Required
}

fn best_effort() -> HookPolicy {
    HookPolicy::BestEffort
}

impl Default for PostDeployConfig {
    fn default() -> Self {
        Self {
            stage_files: required(),
            site_symlinks: required(),
            site_install: required(),
            backup: best_effort(),
            maintenance: required(),
            migrate: required(),
            clear_cache: required(),
        }
    }
}

impl PostDeployConfig {
    /// Policy governing a release step
    pub fn policy_for(&self, step: ReleaseStep) -> HookPolicy {
        match step {
            ReleaseStep::Materialize
            | ReleaseStep::Finalize
            | ReleaseStep::Cutover
            | ReleaseStep::Restore => HookPolicy::Required,
            ReleaseStep::StageFiles => self.stage_files,
            ReleaseStep::SiteSymlinks => self.site_symlinks,
            ReleaseStep::DetectMaintenance => match self.maintenance {
                HookPolicy::Skip => HookPolicy::Skip,
                _ => HookPolicy::BestEffort,
            },
            ReleaseStep::SiteInstall => self.site_install,
            ReleaseStep::BackupFiles | ReleaseStep::BackupDatabase => self.backup,
            ReleaseStep::MaintenanceOn | ReleaseStep::MaintenanceOff => self.maintenance,
            ReleaseStep::Migrate => self.migrate,
            ReleaseStep::ClearCache => self.clear_cache,
        }
    }
}
