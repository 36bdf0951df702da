//! Subprocess boundary for the build toolchain.
//!
//! The pipeline never spawns processes directly; it goes through
//! [`ToolchainRunner`] so tests can substitute scripted runners.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::BuildError;

/// One command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    /// The argument following `flag`, if present.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering for logs and diagnostics.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How a process ended, observed after it terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitOutcome {
    /// Exited normally with this code.
    Code { code: i32 },
    /// Killed by a signal; there is no exit code.
    Signal { signal: Option<i32> },
}

impl ExitOutcome {
    /// Only an observed exit code of zero counts as success.
    pub fn success(&self) -> bool {
        matches!(self, ExitOutcome::Code { code: 0 })
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Code { code } => Some(*code),
            ExitOutcome::Signal { .. } => None,
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => ExitOutcome::Code { code },
            None => ExitOutcome::Signal {
                signal: signal_of(&status),
            },
        }
    }
}

#[cfg(unix)]
fn signal_of(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &ExitStatus) -> Option<i32> {
    None
}

impl std::fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitOutcome::Code { code } => write!(f, "exit code {code}"),
            ExitOutcome::Signal { signal: Some(s) } => write!(f, "killed by signal {s}"),
            ExitOutcome::Signal { signal: None } => write!(f, "terminated without exit code"),
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs toolchain commands to completion.
#[async_trait]
pub trait ToolchainRunner: Send + Sync {
    /// Run `invocation` and return only after the process has terminated.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ProcessOutput, BuildError>;
}

/// Real subprocesses via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ToolchainRunner for TokioProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ProcessOutput, BuildError> {
        let start = Instant::now();
        debug!(command = %invocation.command_line(), cwd = %invocation.cwd.display(), "spawning");

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::Launch {
                program: invocation.program.clone(),
                source: e,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        program = %invocation.program,
                        limit_secs = limit.as_secs(),
                        "toolchain timed out, killing"
                    );
                    return Err(BuildError::Timeout {
                        program: invocation.program.clone(),
                        limit_secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| BuildError::Wait {
            program: invocation.program.clone(),
            source: e,
        })?;

        Ok(ProcessOutput {
            status: ExitOutcome::from(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolInvocation {
        ToolInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            cwd: std::env::temp_dir(),
            env: vec![],
            timeout: Some(Duration::from_secs(30)),
        }
    }

    #[test]
    fn test_arg_after() {
        let inv = ToolInvocation {
            program: "cargo".to_string(),
            args: vec!["build".to_string(), "--target-dir".to_string(), "/tmp/x".to_string()],
            cwd: PathBuf::from("/"),
            env: vec![],
            timeout: None,
        };
        assert_eq!(inv.arg_after("--target-dir"), Some("/tmp/x"));
        assert_eq!(inv.arg_after("--release"), None);
        assert_eq!(inv.command_line(), "cargo build --target-dir /tmp/x");
    }

    #[test]
    fn test_only_code_zero_is_success() {
        assert!(ExitOutcome::Code { code: 0 }.success());
        assert!(!ExitOutcome::Code { code: 1 }.success());
        assert!(!ExitOutcome::Signal { signal: Some(9) }.success());
        assert!(!ExitOutcome::Signal { signal: None }.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_exit_codes_are_observed() {
        for code in [0, 1, 127] {
            let out = TokioProcessRunner
                .run(&sh(&format!("echo out; echo err >&2; exit {code}")))
                .await
                .unwrap();
            assert_eq!(out.status, ExitOutcome::Code { code });
            assert_eq!(out.stdout, "out\n");
            assert_eq!(out.stderr, "err\n");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_is_not_an_exit_code() {
        let out = TokioProcessRunner.run(&sh("kill -9 $$")).await.unwrap();
        assert_eq!(out.status, ExitOutcome::Signal { signal: Some(9) });
        assert!(!out.status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        let mut inv = sh("sleep 30");
        inv.timeout = Some(Duration::from_millis(200));
        let err = TokioProcessRunner.run(&inv).await.unwrap_err();
        assert!(matches!(err, BuildError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let inv = ToolInvocation {
            program: "fwflash-no-such-toolchain".to_string(),
            args: vec![],
            cwd: std::env::temp_dir(),
            env: vec![],
            timeout: None,
        };
        let err = TokioProcessRunner.run(&inv).await.unwrap_err();
        assert!(matches!(err, BuildError::Launch { .. }));
    }
}
