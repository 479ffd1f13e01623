//! Shell command execution
//!
//! Stage commands are opaque shell strings run through `sh -c`.
//! Stdout is captured into the run log at Info level and stderr at
//! Error level, line by line, so the per-stage log reads like the
//! terminal output of the command.

use async_trait::async_trait;
use gantry_core::error::StageError;
use gantry_core::log::RunLog;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Executes one stage command and reports its exit code
///
/// Abstracted so the stage executor can be driven by a recording fake
/// in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command with the given environment, capturing output
    /// into `log`. Returns the process exit code.
    async fn run(
        &self,
        command: &str,
        env: &[(String, String)],
        log: &Arc<RunLog>,
    ) -> Result<i32, StageError>;
}

/// Command runner backed by `sh -c`
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        env: &[(String, String)],
        log: &Arc<RunLog>,
    ) -> Result<i32, StageError> {
        debug!("Executing command: {}", command);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StageError::Spawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_log = log.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stdout_log.info(line);
            }
        });

        let stderr_log = log.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_log.error(line);
            }
        });

        let status = child.wait().await.map_err(|e| StageError::Spawn {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        // Output tasks finish once the pipes close
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::log::LogLevel;

    #[tokio::test]
    async fn test_exit_codes() {
        let runner = ShellRunner::new();
        let log = Arc::new(RunLog::new());

        assert_eq!(runner.run("true", &[], &log).await.unwrap(), 0);
        assert_eq!(runner.run("exit 3", &[], &log).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stdout_captured_as_info() {
        let runner = ShellRunner::new();
        let log = Arc::new(RunLog::new());

        runner.run("echo hello", &[], &log).await.unwrap();

        let entries = log.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[0].message, "hello");
    }

    #[tokio::test]
    async fn test_stderr_captured_as_error() {
        let runner = ShellRunner::new();
        let log = Arc::new(RunLog::new());

        runner.run("echo oops >&2", &[], &log).await.unwrap();

        let entries = log.drain();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[0].message, "oops");
    }

    #[tokio::test]
    async fn test_env_is_exported() {
        let runner = ShellRunner::new();
        let log = Arc::new(RunLog::new());

        let env = vec![("GANTRY_OS".to_string(), "linux".to_string())];
        runner.run("echo $GANTRY_OS", &env, &log).await.unwrap();

        let entries = log.drain();
        assert_eq!(entries[0].message, "linux");
    }

    #[tokio::test]
    async fn test_missing_command_exits_nonzero() {
        let runner = ShellRunner::new();
        let log = Arc::new(RunLog::new());

        // sh itself always spawns; the missing command exits 127 instead
        let code = runner
            .run("definitely-not-a-command", &[], &log)
            .await
            .unwrap();
        assert_eq!(code, 127);
    }
}
