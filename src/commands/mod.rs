//! Command layer - one module per CLI verb
//!
//! Commands load the configuration, wire the services and report through
//! `ui`. Typed errors from the services get `anyhow` context here.

pub mod backup;
pub mod check;
pub mod cleanup;
pub mod deploy;
pub mod maintenance;
pub mod migrate;
pub mod releases;
pub mod restore;
pub mod rollback;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::DeployConfig;
use crate::infrastructure::{GitCheckout, LocalExecutor, Remote, RemoteExecutor, SshExecutor};
use crate::services::ReleaseService;

pub fn load_config(path: &str) -> Result<Arc<DeployConfig>> {
    let config = DeployConfig::load(Path::new(path))
        .with_context(|| format!("Failed to load deployment configuration from {}", path))?;
    debug!(
        application = %config.application,
        deploy_to = %config.deploy_path().display(),
        hosts = config.hosts.len(),
        "Loaded configuration"
    );
    Ok(Arc::new(config))
}

/// SSH fan-out when hosts are configured, the local shell otherwise
pub fn executor(config: &DeployConfig) -> Result<Arc<dyn RemoteExecutor>> {
    let timeout = config.timeout()?;
    if config.hosts.is_empty() {
        debug!("No hosts configured, running commands locally");
        Ok(Arc::new(LocalExecutor::new(timeout)))
    } else {
        Ok(Arc::new(SshExecutor::new(config.hosts.clone(), &config.ssh, timeout)))
    }
}

/// Release service for the configuration at `path`
pub fn release_service(path: &str) -> Result<ReleaseService> {
    let config = load_config(path)?;
    let executor = executor(&config)?;
    let mut service = ReleaseService::new(config.clone(), executor.clone())
        .context("Failed to set up the release service")?;

    if let Some(source) = &config.source {
        let remote = Remote::new(executor, config.file_privilege());
        service = service.with_source(Box::new(GitCheckout::new(remote, source)));
    }
    Ok(service)
}
