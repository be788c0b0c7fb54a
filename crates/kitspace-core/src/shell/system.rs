//! `sh -c` backed command runner.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use super::command::{ShellCommand, ShellOutput};
use super::error::ShellError;
use crate::traits::shell::CommandRunner;

/// Longest stderr excerpt kept in an error.
const MAX_STDERR_CHARS: usize = 4000;

/// Runs commands through the system shell.
#[derive(Debug, Clone, Default)]
pub struct SystemShell;

impl SystemShell {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemShell {
    async fn run(&self, command: &ShellCommand) -> Result<ShellOutput, ShellError> {
        let line = command.render();
        let start = Instant::now();

        tracing::debug!(command = %line, "Executing shell command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = command.working_dir() {
            cmd.current_dir(dir);
        }

        let output = match command.timeout_duration() {
            Some(timeout) => match tokio::time::timeout(timeout, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::error!(
                        command = %line,
                        timeout_seconds = timeout.as_secs(),
                        "Shell command timed out"
                    );
                    return Err(ShellError::Timeout {
                        command: line,
                        timeout_seconds: timeout.as_secs(),
                    });
                }
            },
            None => cmd.output().await,
        }
        .map_err(|e| ShellError::Spawn {
            command: line.clone(),
            reason: e.to_string(),
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            tracing::warn!(
                command = %line,
                exit_code = code,
                duration_ms,
                "Shell command failed"
            );
            return Err(ShellError::NonZeroExit {
                command: line,
                code,
                stderr: stderr.chars().take(MAX_STDERR_CHARS).collect(),
                stdout,
            });
        }

        tracing::debug!(command = %line, duration_ms, "Shell command completed");

        Ok(ShellOutput {
            stdout,
            stderr,
            duration_ms,
        })
    }
}
