//! # Deployment Configuration
//!
//! One explicit structure, loaded from `deploy.yaml`, handed to every
//! service at construction. Nothing reads deployment settings ad hoc.
//!
//! ## Example
//!
//! ```yaml
//! application: shop
//! deploy_to: /var/www/shop
//! stage: production
//! keep_releases: 5
//! hosts: [web1.example.com, web2.example.com]
//! source:
//!   repository: git@example.com:shop/site.git
//!   branch: main
//! site:
//!   domains:
//!     - name: default
//!       virtual_hosts: [www.shop.example]
//! post_deploy:
//!   backup: required
//! ```

mod hooks;
mod site;

pub use hooks::{HookPolicy, PostDeployConfig};
pub use site::{DomainConfig, InstallConfig, MigrationsConfig, SiteConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{MaintenanceMechanism, Privilege};
use crate::error::ConfigError;
use crate::path_builder::DeployLayout;

/// Complete deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Application name
    pub application: String,

    /// Deployment root on every host; defaults to /u/apps/<application>
    #[serde(default)]
    pub deploy_to: Option<PathBuf>,

    /// Stage name used to pick stage-specific files (settings, htaccess, robots)
    #[serde(default = "default_stage")]
    pub stage: String,

    /// Releases (and snapshots) retained by cleanup
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,

    /// Make releases and restored files group-writable
    #[serde(default = "default_true")]
    pub group_writable: bool,

    /// Run file operations through sudo
    #[serde(default = "default_true")]
    pub use_sudo: bool,

    /// User sudo runs as; root when unset
    #[serde(default)]
    pub admin_runner: Option<String>,

    /// Per-command timeout, humantime syntax ("30m", "90s")
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    /// Hosts receiving every command; empty means run locally
    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Release-relative paths replaced by symlinks into shared/
    #[serde(default)]
    pub shared_children: Vec<String>,

    /// Mechanism assumed before (or without) detection
    #[serde(default)]
    pub maintenance_default: MaintenanceMechanism,

    /// Where release code comes from; required by `deploy`
    #[serde(default)]
    pub source: Option<SourceConfig>,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub migrations: MigrationsConfig,

    #[serde(default)]
    pub post_deploy: PostDeployConfig,
}

/// SSH transport settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Extra `-o` options, e.g. "StrictHostKeyChecking=no"
    #[serde(default)]
    pub options: Vec<String>,
}

/// Version-control source of release code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Pin a revision instead of resolving the branch head
    #[serde(default)]
    pub revision: Option<String>,
}

fn default_stage() -> String {
    "production".to_string()
}

fn default_keep_releases() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> String {
    "30m".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

impl DeployConfig {
    /// Minimal configuration with every default applied
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            deploy_to: None,
            stage: default_stage(),
            keep_releases: default_keep_releases(),
            group_writable: true,
            use_sudo: true,
            admin_runner: None,
            command_timeout: default_command_timeout(),
            hosts: Vec::new(),
            ssh: SshConfig::default(),
            shared_children: Vec::new(),
            maintenance_default: MaintenanceMechanism::default(),
            source: None,
            site: SiteConfig::default(),
            migrations: MigrationsConfig::default(),
            post_deploy: PostDeployConfig::default(),
        }
    }

    /// Load and validate a YAML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "application".to_string(),
            });
        }
        if self.keep_releases == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keep_releases".to_string(),
                value: "0 (the current release is always kept)".to_string(),
            });
        }
        if self.site.domains.is_empty() {
            return Err(ConfigError::MissingField {
                field: "site.domains".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for domain in &self.site.domains {
            if domain.name.is_empty() || domain.name.contains('/') {
                return Err(ConfigError::InvalidValue {
                    field: "site.domains[].name".to_string(),
                    value: domain.name.clone(),
                });
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "site.domains".to_string(),
                    value: format!("duplicate domain {}", domain.name),
                });
            }
        }

        self.timeout()?;

        if let Some(source) = &self.source {
            if source.repository.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    field: "source.repository".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Deployment root on the hosts
    pub fn deploy_path(&self) -> PathBuf {
        self.deploy_to
            .clone()
            .unwrap_or_else(|| PathBuf::from("/u/apps").join(&self.application))
    }

    pub fn layout(&self) -> DeployLayout {
        DeployLayout::new(self.deploy_path())
    }

    /// Privilege for file operations (try_sudo semantics)
    pub fn file_privilege(&self) -> Privilege {
        if self.use_sudo {
            Privilege::Sudo {
                as_user: self.admin_runner.clone(),
            }
        } else {
            Privilege::User
        }
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.command_timeout).map_err(|e| ConfigError::InvalidValue {
            field: "command_timeout".to_string(),
            value: format!("{} ({})", self.command_timeout, e),
        })
    }

    pub fn domain_names(&self) -> Vec<&str> {
        self.site.domains.iter().map(|d| d.name.as_str()).collect()
    }

    /// Restrict the domain list to one domain, if given
    pub fn select_domains(&self, only: Option<&str>) -> Result<Vec<DomainConfig>, ConfigError> {
        match only {
            None => Ok(self.site.domains.clone()),
            Some(name) => self
                .site
                .domains
                .iter()
                .find(|d| d.name == name)
                .cloned()
                .map(|d| vec![d])
                .ok_or_else(|| ConfigError::InvalidValue {
                    field: "--domain".to_string(),
                    value: format!("{} is not a configured domain", name),
                }),
        }
    }
}
