//! Site-management CLI (drush) command lines
//!
//! Pure builders: every method returns the line to hand to the executor.
//! Each per-domain command carries `--root=<release> --uri=<domain> -y`.

use std::path::Path;

use super::shell::{quote, quote_path};
use crate::config::InstallConfig;

#[derive(Debug, Clone)]
pub struct SiteCli {
    program: String,
}

impl SiteCli {
    /// `program` is used verbatim, so it may carry its own arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn target(root: &Path, domain: &str) -> String {
        format!("--root={} --uri={} -y", quote_path(root), quote(domain))
    }

    fn for_domain(&self, args: &str, root: &Path, domain: &str) -> String {
        format!("{} {} {}", self.program, args, Self::target(root, domain))
    }

    /// Enabled modules; its output drives maintenance detection
    pub fn module_status(&self, root: &Path, domain: &str) -> String {
        self.for_domain("pml --status=enabled", root, domain)
    }

    pub fn cache_clear(&self, root: &Path, domain: &str) -> String {
        self.for_domain("cc all", root, domain)
    }

    pub fn variable_set(&self, root: &Path, domain: &str, key: &str, value: &str) -> String {
        self.for_domain(&format!("vset {} {}", quote(key), quote(value)), root, domain)
    }

    /// Gzipped dump; the CLI appends `.gz` to `result_file`
    pub fn sql_dump(&self, root: &Path, domain: &str, result_file: &Path) -> String {
        self.for_domain(
            &format!("sql-dump --gzip --result-file={}", quote_path(result_file)),
            root,
            domain,
        )
    }

    pub fn sql_drop(&self, root: &Path, domain: &str) -> String {
        self.for_domain("sql-drop", root, domain)
    }

    pub fn sql_load(&self, root: &Path, domain: &str, file: &Path) -> String {
        self.for_domain(&format!("sqlq --file={}", quote_path(file)), root, domain)
    }

    /// Pending database updates (`updb`)
    pub fn update_apply(&self, root: &Path, domain: &str) -> String {
        self.for_domain("updb", root, domain)
    }

    /// One line of a script migration, passed through unquoted
    pub fn invoke(&self, root: &Path, domain: &str, line: &str) -> String {
        self.for_domain(line, root, domain)
    }

    pub fn site_install(&self, root: &Path, install: &InstallConfig, db_url: &str) -> String {
        format!(
            "{} si {} --root={} --db-url={} --site-name={} --account-name={} --account-pass={} -y",
            self.program,
            quote(&install.profile),
            quote_path(root),
            quote(db_url),
            quote(&install.site_name),
            quote(&install.admin_user),
            quote(&install.admin_pass),
        )
    }
}
