//! Site service - per-release site fixups
//!
//! Stage-file promotion, virtual-host aliases, settings/files symlinks, the
//! first-deployment install and cache clearing.

use std::path::Path;
use tracing::{debug, info};

use super::for_each_domain;
use crate::config::{DeployConfig, DomainConfig, InstallConfig};
use crate::error::SiteError;
use crate::infrastructure::shell::{quote, quote_path};
use crate::infrastructure::{Remote, SiteCli};
use crate::path_builder::DeployLayout;

pub struct SiteService {
    remote: Remote,
    layout: DeployLayout,
    cli: SiteCli,
    stage: String,
    default_domain: String,
    install: InstallConfig,
}

impl SiteService {
    pub fn new(remote: Remote, config: &DeployConfig) -> Self {
        Self {
            remote,
            layout: config.layout(),
            cli: SiteCli::new(config.site.cli.clone()),
            stage: config.stage.clone(),
            default_domain: config.site.default_domain.clone(),
            install: config.site.install.clone(),
        }
    }

    /// Promote `htaccess-<stage>` and `robots-<stage>.txt`, dropping the other variants
    pub async fn stage_files(&self, release_path: &Path) -> Result<(), SiteError> {
        let htaccess = quote(&format!("htaccess-{}", self.stage));
        let robots = quote(&format!("robots-{}.txt", self.stage));
        let line = format!(
            "cd {root} && \
             if [ -f {htaccess} ]; then mv {htaccess} .htaccess; elif [ -f htaccess ]; then mv htaccess .htaccess; fi && \
             rm -f htaccess htaccess-* && \
             if [ -f {robots} ]; then mv {robots} robots.txt; fi && \
             rm -f robots-*.txt",
            root = quote_path(release_path),
            htaccess = htaccess,
            robots = robots,
        );

        self.remote
            .try_sudo(line)
            .await
            .map_err(|e| SiteError::Task {
                task: "stage file promotion",
                source: e,
            })?;
        debug!(stage = %self.stage, "Promoted stage files");
        Ok(())
    }

    /// Alias directories and settings/files links for one domain
    async fn link_domain(&self, release_path: &Path, domain: &DomainConfig) -> Result<(), SiteError> {
        let site = DeployLayout::release_site_path(release_path, &domain.name);
        let shared = self.layout.domain_shared_path(&domain.name);
        let stage_settings = quote(&format!("settings.{}.php", self.stage));
        let shared_settings = quote_path(&shared.join("settings.php"));

        let mut line = format!(
            "mkdir -p {site} && cd {site} && \
             if [ -f {stage_settings} ]; then ln -sfn {stage_settings} settings.php; \
             elif [ -f {shared_settings} ]; then ln -sfn {shared_settings} settings.php; fi && \
             rm -rf files && ln -s {files} files",
            site = quote_path(&site),
            stage_settings = stage_settings,
            shared_settings = shared_settings,
            files = quote_path(&self.layout.domain_files_path(&domain.name)),
        );

        for alias in &domain.virtual_hosts {
            let alias_path = DeployLayout::release_site_path(release_path, alias);
            line.push_str(&format!(
                " && rm -rf {alias} && ln -s {site} {alias}",
                alias = quote_path(&alias_path),
                site = quote_path(&site),
            ));
        }

        self.remote
            .try_sudo(line)
            .await
            .map_err(|e| SiteError::DomainTask {
                task: "site symlinks",
                domain: domain.name.clone(),
                source: e,
            })?;
        debug!(domain = %domain.name, aliases = domain.virtual_hosts.len(), "Linked site");
        Ok(())
    }

    pub async fn site_symlinks(&self, release_path: &Path, domains: &[DomainConfig]) -> Result<(), SiteError> {
        for_each_domain(domains, |d| self.link_domain(release_path, d)).await?;
        Ok(())
    }

    /// Install the site into a first release, then move its settings into shared
    pub async fn install(&self, release_path: &Path) -> Result<(), SiteError> {
        let db_url = self.install.db_url.as_deref().ok_or(SiteError::MissingDbUrl)?;
        let domain = self.default_domain.as_str();
        let task_error = |e| SiteError::DomainTask {
            task: "site install",
            domain: domain.to_string(),
            source: e,
        };

        info!(domain = %domain, profile = %self.install.profile, "Installing site");
        self.remote
            .run(self.cli.site_install(release_path, &self.install, db_url))
            .await
            .map_err(task_error)?;

        let site = DeployLayout::release_site_path(release_path, domain);
        let shared = self.layout.domain_shared_path(domain);
        self.remote
            .try_sudo(format!(
                "mkdir -p {shared} && cp {settings} {shared}/settings.php && rm -rf {settings} {files}",
                shared = quote_path(&shared),
                settings = quote_path(&site.join("settings.php")),
                files = quote_path(&site.join("files")),
            ))
            .await
            .map_err(task_error)?;

        self.link_domain(release_path, &DomainConfig::new(domain)).await
    }

    pub async fn clear_cache_all(&self, domains: &[DomainConfig]) -> Result<(), SiteError> {
        let root = self.layout.current_path();
        for_each_domain(domains, |d| {
            let line = self.cli.cache_clear(&root, &d.name);
            async move {
                self.remote
                    .run(line)
                    .await
                    .map_err(|e| SiteError::DomainTask {
                        task: "cache clear",
                        domain: d.name.clone(),
                        source: e,
                    })?;
                debug!(domain = %d.name, "Cache cleared");
                Ok::<(), SiteError>(())
            }
        })
        .await?;
        Ok(())
    }
}
