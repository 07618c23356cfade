//! Test doubles shared by the service tests
//!
//! - [`RecordingExecutor`] answers commands from substring rules and logs them
//! - [`Fixture`] lays out a real deploy root in a temp dir, with a fake
//!   site CLI, so services run end-to-end through [`LocalExecutor`]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::config::DeployConfig;
use crate::domain::{MigrationKind, Privilege, RemoteCommand};
use crate::error::{ExecutorError, SourceError};
use crate::infrastructure::source::DependencyReport;
use crate::infrastructure::{CommandOutput, LocalExecutor, Remote, RemoteExecutor, SourceStrategy};
use crate::path_builder::DeployLayout;

enum Reply {
    Stdout(String),
    Fail(String),
    FailOnce(String),
}

/// Executor that never runs anything
#[derive(Default)]
pub struct RecordingExecutor {
    rules: Mutex<Vec<(String, Reply)>>,
    log: Mutex<Vec<RemoteCommand>>,
    local_log: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` print `stdout`
    pub fn respond(&self, needle: &str, stdout: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), Reply::Stdout(stdout.to_string())));
    }

    /// Commands containing `needle` fail with `stderr`
    pub fn fail(&self, needle: &str, stderr: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), Reply::Fail(stderr.to_string())));
    }

    /// The first command containing `needle` fails; later ones fall through
    pub fn fail_once(&self, needle: &str, stderr: &str) {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), Reply::FailOnce(stderr.to_string())));
    }

    /// Remote command lines, in dispatch order
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|c| c.line.clone()).collect()
    }

    pub fn executed(&self) -> Vec<RemoteCommand> {
        self.log.lock().unwrap().clone()
    }

    pub fn local_commands(&self) -> Vec<String> {
        self.local_log.lock().unwrap().clone()
    }

    /// Index of the first remote command containing `needle`
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(needle))
    }

    fn reply(&self, line: &str) -> Result<CommandOutput, ExecutorError> {
        let mut rules = self.rules.lock().unwrap();
        let Some(index) = rules.iter().position(|(needle, _)| line.contains(needle.as_str())) else {
            return Ok(CommandOutput::default());
        };
        let failed = |stderr: &str| ExecutorError::CommandFailed {
            command: line.to_string(),
            status: 1,
            stderr: stderr.to_string(),
        };
        match &rules[index].1 {
            Reply::Stdout(stdout) => Ok(CommandOutput {
                stdout: stdout.clone(),
                stderr: String::new(),
            }),
            Reply::Fail(stderr) => Err(failed(stderr)),
            Reply::FailOnce(stderr) => {
                let err = failed(stderr);
                rules.remove(index);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ExecutorError> {
        self.log.lock().unwrap().push(command.clone());
        self.reply(&command.line)
    }

    async fn execute_locally(&self, command: &str) -> Result<CommandOutput, ExecutorError> {
        self.local_log.lock().unwrap().push(command.to_string());
        self.reply(command)
    }
}

/// Stand-in site CLI. Logs its arguments, fails when an argument contains a
/// token from the fail file, keeps the "database" as a plain file:
/// `sqlq --file` appends, `sql-drop` truncates, `sql-dump` gzips it.
const FAKE_SITE_CLI: &str = r#"#!/bin/sh
printf '%s\n' "$*" >> "@LOG@"
if [ -f "@FAIL@" ]; then
  while IFS= read -r token; do
    [ -z "$token" ] && continue
    case " $* " in
      *"$token"*) echo "site cli refused: $token" >&2; exit 1 ;;
    esac
  done < "@FAIL@"
fi
touch "@DB@"
case "$1" in
  pml)
    if [ -f "@READONLY@" ]; then
      echo " Other   Read Only Mode (readonlymode)   Module  Enabled  7.x-1.6"
    fi
    echo " Core    System (system)                 Module  Enabled  7.59"
    ;;
  sql-dump)
    for arg in "$@"; do
      case "$arg" in
        --result-file=*) gzip -c "@DB@" > "${arg#--result-file=}.gz" ;;
      esac
    done
    ;;
  sql-drop)
    : > "@DB@"
    ;;
  sqlq)
    for arg in "$@"; do
      case "$arg" in
        --file=*) cat "${arg#--file=}" >> "@DB@" ;;
      esac
    done
    ;;
esac
exit 0
"#;

/// Real deploy root with one `default` domain
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
    site_cli: PathBuf,
    log: PathBuf,
    fail: PathBuf,
    readonly: PathBuf,
    db: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("deploy");
        let tools = dir.path().join("tools");
        fs::create_dir_all(root.join("releases")).unwrap();
        fs::create_dir_all(&tools).unwrap();

        let fixture = Self {
            site_cli: tools.join("site-cli"),
            log: tools.join("site-cli.log"),
            fail: tools.join("site-cli.fail"),
            readonly: tools.join("readonly-enabled"),
            db: tools.join("database.sql"),
            root,
            _dir: dir,
        };

        let script = FAKE_SITE_CLI
            .replace("@LOG@", &fixture.log.display().to_string())
            .replace("@FAIL@", &fixture.fail.display().to_string())
            .replace("@READONLY@", &fixture.readonly.display().to_string())
            .replace("@DB@", &fixture.db.display().to_string());
        fs::write(&fixture.site_cli, script).unwrap();

        fixture.add_domain("default");
        fixture
    }

    pub fn config(&self) -> DeployConfig {
        let mut config = DeployConfig::new("shop");
        config.deploy_to = Some(self.root.clone());
        config.use_sudo = false;
        config.command_timeout = "60s".to_string();
        config.site.cli = format!("sh {}", self.site_cli.display());
        config
    }

    pub fn remote(&self) -> Remote {
        Remote::new(
            Arc::new(LocalExecutor::new(Duration::from_secs(60))),
            Privilege::User,
        )
    }

    pub fn layout(&self) -> DeployLayout {
        DeployLayout::new(&self.root)
    }

    /// Shared file store for a domain, seeded with one file
    pub fn add_domain(&self, domain: &str) {
        let files = self.layout().domain_files_path(domain);
        fs::create_dir_all(&files).unwrap();
        fs::write(files.join("logo.txt"), format!("{} logo", domain)).unwrap();
    }

    pub fn add_release(&self, id: &str) -> PathBuf {
        let path = self.root.join("releases").join(id);
        fs::create_dir_all(path.join("sites").join("default")).unwrap();
        fs::write(path.join("REVISION"), format!("rev-{}\n", id)).unwrap();
        path
    }

    pub fn set_current(&self, id: &str) {
        let current = self.root.join("current");
        if fs::symlink_metadata(&current).is_ok() {
            fs::remove_file(&current).unwrap();
        }
        std::os::unix::fs::symlink(self.root.join("releases").join(id), current).unwrap();
    }

    /// Release id `current` points at
    pub fn current_target(&self) -> Option<String> {
        fs::read_link(self.root.join("current"))
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
    }

    pub fn release_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = fs::read_dir(self.root.join("releases"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Ship a migration artifact inside a release
    pub fn write_artifact(&self, release: &str, domain: &str, name: &str, content: &str) {
        let path = self
            .root
            .join("releases")
            .join(release)
            .join("migration")
            .join(domain)
            .join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn write_ledger(&self, domain: &str, kind: MigrationKind, content: &str) {
        let path = self.layout().ledger_path(domain, kind);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn ledger(&self, domain: &str, kind: MigrationKind) -> Vec<String> {
        fs::read_to_string(self.layout().ledger_path(domain, kind))
            .map(|c| c.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Every site CLI invocation, arguments joined by spaces
    pub fn site_calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .map(|c| c.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Make the site CLI fail whenever an argument contains `token`
    pub fn fail_on(&self, token: &str) {
        let mut content = fs::read_to_string(&self.fail).unwrap_or_default();
        content.push_str(token);
        content.push('\n');
        fs::write(&self.fail, content).unwrap();
    }

    pub fn clear_failures(&self) {
        let _ = fs::remove_file(&self.fail);
    }

    pub fn enable_readonly_module(&self) {
        fs::write(&self.readonly, "").unwrap();
    }

    pub fn database(&self) -> String {
        fs::read_to_string(&self.db).unwrap_or_default()
    }

    pub fn set_database(&self, content: &str) {
        fs::write(&self.db, content).unwrap();
    }
}

/// Source strategy writing a release straight to the local filesystem
pub struct FakeSource {
    pub revision: String,
    /// Release-relative files to create
    pub files: Vec<(String, String)>,
    pub fail: bool,
    /// Whether materializing touches the local filesystem
    pub write: bool,
}

impl FakeSource {
    pub fn new(revision: &str) -> Self {
        Self {
            revision: revision.to_string(),
            files: Vec::new(),
            fail: false,
            write: true,
        }
    }

    /// Reports a revision without creating anything, for recorded runs
    pub fn remote_only(revision: &str) -> Self {
        Self {
            write: false,
            ..Self::new(revision)
        }
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }
}

#[async_trait]
impl SourceStrategy for FakeSource {
    async fn materialize(&self, release_path: &Path) -> Result<String, SourceError> {
        if self.fail {
            return Err(SourceError::CheckoutFailed {
                path: release_path.display().to_string(),
                source: ExecutorError::CommandFailed {
                    command: "git clone".to_string(),
                    status: 128,
                    stderr: "fatal: could not read from remote repository".to_string(),
                },
            });
        }
        if !self.write {
            return Ok(self.revision.clone());
        }
        fs::create_dir_all(release_path.join("sites").join("default")).unwrap();
        for (path, content) in &self.files {
            let target = release_path.join(path);
            fs::create_dir_all(target.parent().unwrap()).unwrap();
            fs::write(target, content).unwrap();
        }
        fs::write(DeployLayout::revision_file(release_path), &self.revision).unwrap();
        Ok(self.revision.clone())
    }

    async fn check_dependencies(&self, _releases_path: &Path) -> DependencyReport {
        let mut report = DependencyReport::default();
        report.push("fake source is always available", true);
        report
    }
}

/// True when an external tool the real commands need is installed
pub fn have(tool: &str) -> bool {
    which::which(tool).is_ok()
}
