//! Remote executor
//!
//! The only way the core reaches a host. Implementations run one command
//! line with blocking request/response semantics and report success,
//! captured stdout, or a typed failure.
//!
//! - [`LocalExecutor`] runs commands through `sh -c` on this machine
//! - [`SshExecutor`] broadcasts each command to every configured host

use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use super::shell::{self, quote_path};
use crate::config::SshConfig;
use crate::domain::{Privilege, RemoteCommand};
use crate::error::ExecutorError;

/// Captured output of a successful command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs command lines on the deployment hosts
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run on the hosts with the command's privilege
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ExecutorError>;

    /// Run on the machine driving the deployment
    async fn execute_locally(&self, command: &str) -> Result<CommandOutput, ExecutorError>;
}

fn sh(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

/// Spawn, wait with a timeout, and map the exit status
async fn run_process(
    mut cmd: Command,
    shown: &str,
    timeout: Duration,
) -> Result<CommandOutput, ExecutorError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| ExecutorError::Timeout {
            command: shown.to_string(),
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|e| ExecutorError::Spawn {
            command: shown.to_string(),
            message: e.to_string(),
        })?;

    debug!(
        command = %shown,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "command finished"
    );

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    if !output.status.success() {
        return Err(ExecutorError::CommandFailed {
            command: shown.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

/// Executes commands on this machine
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ExecutorError> {
        debug!(command = %command, "executing");
        run_process(sh(&shell::wrap(command)), &command.line, self.timeout).await
    }

    async fn execute_locally(&self, command: &str) -> Result<CommandOutput, ExecutorError> {
        debug!(command = %command, "executing locally");
        run_process(sh(command), command, self.timeout).await
    }
}

/// Broadcasts every command to a group of hosts over ssh
#[derive(Debug, Clone)]
pub struct SshExecutor {
    hosts: Vec<String>,
    user: Option<String>,
    port: Option<u16>,
    options: Vec<String>,
    timeout: Duration,
}

impl SshExecutor {
    pub fn new(hosts: Vec<String>, config: &SshConfig, timeout: Duration) -> Self {
        Self {
            hosts,
            user: config.user.clone(),
            port: config.port,
            options: config.options.clone(),
            timeout,
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }

    /// `ssh` invocation for one host; the line is interpreted by the remote shell
    fn ssh_command(&self, host: &str, line: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"]);
        if let Some(port) = self.port {
            cmd.arg("-p").arg(port.to_string());
        }
        for option in &self.options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg(self.destination(host)).arg(line);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ExecutorError> {
        let line = shell::wrap(command);
        debug!(command = %command, hosts = self.hosts.len(), "executing on hosts");

        let runs = self.hosts.iter().map(|host| {
            let cmd = self.ssh_command(host, &line);
            async move {
                run_process(cmd, &command.line, self.timeout)
                    .await
                    .map_err(|e| ExecutorError::Host {
                        host: host.clone(),
                        source: Box::new(e),
                    })
            }
        });

        let mut first_output = None;
        let mut first_error = None;
        for result in join_all(runs).await {
            match result {
                Ok(output) => {
                    first_output.get_or_insert(output);
                }
                Err(e) => {
                    warn!(error = %e, "command failed on host");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(first_output.unwrap_or_default()),
        }
    }

    async fn execute_locally(&self, command: &str) -> Result<CommandOutput, ExecutorError> {
        debug!(command = %command, "executing locally");
        run_process(sh(command), command, self.timeout).await
    }
}

/// Executor handle bound to the configured file-operation privilege
#[derive(Clone)]
pub struct Remote {
    executor: Arc<dyn RemoteExecutor>,
    file_privilege: Privilege,
}

impl Remote {
    pub fn new(executor: Arc<dyn RemoteExecutor>, file_privilege: Privilege) -> Self {
        Self {
            executor,
            file_privilege,
        }
    }

    /// Command run as the connecting user
    pub fn user(&self, line: impl Into<String>) -> RemoteCommand {
        RemoteCommand::user(line)
    }

    /// Command run with the file-operation privilege (sudo when configured)
    pub fn sudo(&self, line: impl Into<String>) -> RemoteCommand {
        RemoteCommand::new(line, self.file_privilege.clone())
    }

    pub async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, ExecutorError> {
        self.executor.execute(command).await
    }

    pub async fn run(&self, line: impl Into<String>) -> Result<CommandOutput, ExecutorError> {
        self.execute(&self.user(line)).await
    }

    pub async fn try_sudo(&self, line: impl Into<String>) -> Result<CommandOutput, ExecutorError> {
        self.execute(&self.sudo(line)).await
    }

    /// stdout of a command run as the connecting user
    pub async fn capture(&self, line: impl Into<String>) -> Result<String, ExecutorError> {
        Ok(self.run(line).await?.stdout)
    }

    pub async fn exists(&self, path: &Path) -> Result<bool, ExecutorError> {
        let out = self
            .capture(format!("if [ -e {} ]; then echo yes; fi", quote_path(path)))
            .await?;
        Ok(out.trim() == "yes")
    }

    pub async fn execute_locally(&self, command: &str) -> Result<CommandOutput, ExecutorError> {
        self.executor.execute_locally(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_local_executor_captures_stdout() {
        let executor = LocalExecutor::new(Duration::from_secs(10));
        let output = assert_ok!(executor.execute(&RemoteCommand::user("echo hello")).await);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_executor_reports_failure() {
        let executor = LocalExecutor::new(Duration::from_secs(10));
        let err = executor
            .execute(&RemoteCommand::user("echo broken >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            ExecutorError::CommandFailed { status, stderr, command } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "broken");
                assert!(command.contains("exit 3"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_local_executor_times_out() {
        let executor = LocalExecutor::new(Duration::from_millis(200));
        let err = executor.execute_locally("sleep 5").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_remote_exists() {
        let dir = tempfile::tempdir().unwrap();
        let remote = Remote::new(Arc::new(LocalExecutor::default()), Privilege::User);
        assert!(remote.exists(dir.path()).await.unwrap());
        assert!(!remote.exists(&dir.path().join("missing")).await.unwrap());
    }

    #[test]
    fn test_ssh_destination() {
        let config = SshConfig {
            user: Some("deploy".to_string()),
            port: Some(2222),
            options: vec![],
        };
        let executor = SshExecutor::new(vec!["web1".to_string()], &config, Duration::from_secs(5));
        assert_eq!(executor.destination("web1"), "deploy@web1");
        assert_eq!(executor.hosts(), ["web1".to_string()]);
    }
}
