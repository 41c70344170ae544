//! Uniform local/remote command execution.
//!
//! Every filesystem operation on a backup location goes through a
//! [`CommandRunner`], so the layers above never care whether the root lives
//! on this machine or behind `ssh`.
//!
//! A non-zero exit of the command itself comes back as an ordinary
//! [`CommandOutput`]. Only a failure of the remote shell channel (ssh exit
//! status 255) is turned into [`BackupError::Transport`].

use crate::utils::errors::{BackupError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Exit status ssh reserves for its own failures (connection, auth, ...).
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Captured result of one command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status; -1 when the process was killed by a signal
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs shell expressions locally or on a remote host.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    host: Option<String>,
    ssh_options: Vec<String>,
}

impl CommandRunner {
    /// Runner for the local machine
    pub fn local() -> Self {
        Self::default()
    }

    /// Runner for `user@host`, forwarding `ssh_options` to every ssh call
    pub fn remote(host: impl Into<String>, ssh_options: Vec<String>) -> Self {
        Self {
            host: Some(host.into()),
            ssh_options,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }

    /// Remote-shell command line for tools that take one (`rsync -e`)
    pub fn ssh_command(&self) -> String {
        let mut parts = vec!["ssh".to_string()];
        parts.extend(self.ssh_options.iter().cloned());
        parts.join(" ")
    }

    fn command(&self, expression: &str) -> Command {
        match &self.host {
            None => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(expression);
                cmd
            }
            Some(host) => {
                let mut cmd = Command::new("ssh");
                cmd.args(&self.ssh_options).arg(host).arg(expression);
                cmd
            }
        }
    }

    /// Run a shell expression and capture its output.
    pub async fn run(&self, expression: &str) -> Result<CommandOutput> {
        debug!(host = self.host.as_deref().unwrap_or("local"), "run: {}", expression);

        let output = self
            .command(expression)
            .stdin(Stdio::null())
            .output()
            .await?;

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if let Some(host) = &self.host {
            if result.status == SSH_TRANSPORT_FAILURE {
                return Err(BackupError::Transport {
                    host: host.clone(),
                    status: result.status,
                    message: result.stderr.trim().to_string(),
                });
            }
        }

        Ok(result)
    }

    /// Run an expression whose exit status answers a yes/no question.
    pub async fn test(&self, expression: &str) -> Result<bool> {
        Ok(self.run(expression).await?.success())
    }

    /// Run an expression that must succeed.
    pub async fn run_checked(&self, expression: &str) -> Result<CommandOutput> {
        let output = self.run(expression).await?;
        if !output.success() {
            return Err(BackupError::CommandFailed {
                command: expression.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Single-quote a string for a POSIX shell.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Single-quote a path for a POSIX shell.
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_run_captures_output() {
        let runner = CommandRunner::local();
        let output = runner.run("echo hello").await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_local_run_evaluates_shell_syntax() {
        let runner = CommandRunner::local();
        let output = runner
            .run("printf 'a\\nb\\nc\\n' | wc -l && test -d / || echo unreachable")
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "3");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let runner = CommandRunner::local();
        let output = runner.run("exit 3").await.unwrap();

        assert_eq!(output.status, 3);
        assert!(!runner.test("test -e /definitely/not/here").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_status_255_is_an_ordinary_result() {
        let output = CommandRunner::local().run("exit 255").await.unwrap();
        assert_eq!(output.status, 255);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_transport_failure() {
        let runner = CommandRunner::remote(
            "u@nonexistent.invalid",
            ["-o", "BatchMode=yes", "-o", "ConnectTimeout=2"]
                .map(String::from)
                .to_vec(),
        );

        let err = runner.run("true").await.unwrap_err();

        match err {
            BackupError::Transport { host, status, .. } => {
                assert_eq!(host, "u@nonexistent.invalid");
                assert_eq!(status, 255);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_checked_reports_failure() {
        let runner = CommandRunner::local();
        let err = runner.run_checked("echo oops >&2; exit 2").await.unwrap_err();

        match err {
            BackupError::CommandFailed { status, stderr, .. } => {
                assert_eq!(status, 2);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_quote_survives_the_shell() {
        let runner = CommandRunner::local();
        for value in ["plain", "with space", "it's", "$HOME `x` \"q\"", "a'b'c"] {
            let output = runner
                .run(&format!("printf %s {}", quote(value)))
                .await
                .unwrap();
            assert_eq!(output.stdout, value);
        }
    }

    #[test]
    fn test_remote_command_line() {
        let runner = CommandRunner::remote(
            "backup@nas",
            vec!["-p".to_string(), "2222".to_string()],
        );
        let cmd = runner.command("ls /srv");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.as_std().get_program(), "ssh");
        assert_eq!(args, vec!["-p", "2222", "backup@nas", "ls /srv"]);
        assert_eq!(runner.ssh_command(), "ssh -p 2222");
    }
}
