//! Build Invoker: run the project's toolchain into a staged directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fwflash_core::ProjectHandle;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::BuildError;
use crate::runner::{ExitOutcome, ProcessOutput, ToolInvocation, ToolchainRunner};

/// Default build timeout (15 minutes).
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 900;

/// How the toolchain is invoked.
///
/// The final command line is `<program> <args..> [--release] <target_dir_flag> <out_dir>`,
/// run from the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub program: String,
    pub args: Vec<String>,
    pub target_dir_flag: String,
    pub release: bool,
    pub timeout_secs: u64,
    pub env: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["build".to_string()],
            target_dir_flag: "--target-dir".to_string(),
            release: false,
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            env: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    /// The invocation for building `project_root` into `out_dir`.
    pub fn invocation(&self, project_root: &Path, out_dir: &Path) -> ToolInvocation {
        let mut args = self.args.clone();
        if self.release {
            args.push("--release".to_string());
        }
        args.push(self.target_dir_flag.clone());
        args.push(out_dir.to_string_lossy().into_owned());

        ToolInvocation {
            program: self.program.clone(),
            args,
            cwd: project_root.to_path_buf(),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}

/// Classified outcome of a build that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    Success {
        duration_ms: u64,
        stdout: String,
        stderr: String,
    },
    /// Both streams exactly as captured.
    Failure {
        status: ExitOutcome,
        stdout: String,
        stderr: String,
    },
}

impl BuildResult {
    pub fn classify(output: ProcessOutput) -> Self {
        if output.status.success() {
            BuildResult::Success {
                duration_ms: output.duration_ms,
                stdout: output.stdout,
                stderr: output.stderr,
            }
        } else {
            BuildResult::Failure {
                status: output.status,
                stdout: output.stdout,
                stderr: output.stderr,
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildResult::Success { .. })
    }

    pub fn into_result(self) -> Result<Self, BuildError> {
        match self {
            BuildResult::Failure {
                status,
                stdout,
                stderr,
            } => Err(BuildError::Failed {
                status,
                stdout,
                stderr,
            }),
            success => Ok(success),
        }
    }
}

/// Runs builds through an injected [`ToolchainRunner`].
pub struct BuildInvoker {
    runner: Arc<dyn ToolchainRunner>,
    config: BuildConfig,
}

impl BuildInvoker {
    pub fn new(runner: Arc<dyn ToolchainRunner>, config: BuildConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build `project` into `out_dir` and wait for the toolchain to exit.
    ///
    /// Launch failures and timeouts are errors; a build that ran and exited
    /// non-zero is a [`BuildResult::Failure`].
    pub async fn build(
        &self,
        project: &ProjectHandle,
        out_dir: &Path,
    ) -> Result<BuildResult, BuildError> {
        let invocation = self.config.invocation(project.root(), out_dir);
        info!(command = %invocation.command_line(), "starting build");

        let output = self.runner.run(&invocation).await?;
        let result = BuildResult::classify(output);
        match &result {
            BuildResult::Success { duration_ms, .. } => {
                info!(duration_ms, "build succeeded");
            }
            BuildResult::Failure { status, .. } => {
                warn!(status = %status, "build failed");
            }
        }
        Ok(result)
    }
}
