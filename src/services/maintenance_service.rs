//! Maintenance service - per-domain maintenance toggling
//!
//! The mechanism of each domain is detected once per run and cached. Toggles
//! before detection, or after a failed detection, use the configured default.

use futures::future::join_all;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::for_each_domain;
use crate::config::DomainConfig;
use crate::domain::MaintenanceMechanism;
use crate::error::MaintenanceError;
use crate::infrastructure::{Remote, SiteCli};
use crate::path_builder::DeployLayout;

pub struct MaintenanceService {
    remote: Remote,
    layout: DeployLayout,
    cli: SiteCli,
    default: MaintenanceMechanism,
    detected: RwLock<HashMap<String, MaintenanceMechanism>>,
}

impl MaintenanceService {
    pub fn new(remote: Remote, layout: DeployLayout, cli: SiteCli, default: MaintenanceMechanism) -> Self {
        Self {
            remote,
            layout,
            cli,
            default,
            detected: RwLock::new(HashMap::new()),
        }
    }

    async fn query(&self, domain: &str) -> Result<MaintenanceMechanism, MaintenanceError> {
        let status = self
            .remote
            .capture(self.cli.module_status(&self.layout.current_path(), domain))
            .await
            .map_err(|e| MaintenanceError::DetectionFailed {
                domain: domain.to_string(),
                source: e,
            })?;
        Ok(MaintenanceMechanism::from_module_status(&status))
    }

    /// Detect and cache a domain's mechanism; never fails
    pub async fn detect(&self, domain: &str) -> MaintenanceMechanism {
        let mechanism = match self.query(domain).await {
            Ok(mechanism) => mechanism,
            Err(e) => {
                warn!(domain = %domain, error = %e, fallback = %self.default, "Using default maintenance mechanism");
                self.default
            }
        };
        self.detected.write().await.insert(domain.to_string(), mechanism);
        info!(domain = %domain, mechanism = %mechanism, "Maintenance mechanism selected");
        mechanism
    }

    pub async fn detect_all(&self, domains: &[DomainConfig]) -> Vec<(String, MaintenanceMechanism)> {
        let detected = join_all(domains.iter().map(|d| self.detect(&d.name))).await;
        domains.iter().map(|d| d.name.clone()).zip(detected).collect()
    }

    /// Cached mechanism, or the default before detection
    pub async fn mechanism(&self, domain: &str) -> MaintenanceMechanism {
        self.detected
            .read()
            .await
            .get(domain)
            .copied()
            .unwrap_or(self.default)
    }

    async fn toggle(&self, domain: &str, on: bool) -> Result<MaintenanceMechanism, MaintenanceError> {
        let mechanism = self.mechanism(domain).await;
        let state = if on { "on" } else { "off" };
        let value = if on { "1" } else { "0" };

        self.remote
            .run(self.cli.variable_set(
                &self.layout.current_path(),
                domain,
                mechanism.variable_key(),
                value,
            ))
            .await
            .map_err(|e| MaintenanceError::ToggleFailed {
                domain: domain.to_string(),
                mechanism,
                state,
                source: e,
            })?;

        info!(domain = %domain, mechanism = %mechanism, "Maintenance {}", state);
        Ok(mechanism)
    }

    /// Put a domain into maintenance
    pub async fn enable(&self, domain: &str) -> Result<MaintenanceMechanism, MaintenanceError> {
        self.toggle(domain, true).await
    }

    /// Take a domain out of maintenance
    pub async fn disable(&self, domain: &str) -> Result<MaintenanceMechanism, MaintenanceError> {
        self.toggle(domain, false).await
    }

    pub async fn enable_all(&self, domains: &[DomainConfig]) -> Result<(), MaintenanceError> {
        for_each_domain(domains, |d| self.enable(&d.name)).await?;
        Ok(())
    }

    pub async fn disable_all(&self, domains: &[DomainConfig]) -> Result<(), MaintenanceError> {
        for_each_domain(domains, |d| self.disable(&d.name)).await?;
        Ok(())
    }
}
