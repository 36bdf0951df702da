//! Scripted toolchain runners (testing only)
//!
//! `ScriptedRunner` satisfies the `ToolchainRunner` contract without spawning
//! anything. It records every invocation and answers from a script.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::BuildError;
use crate::runner::{ExitOutcome, ProcessOutput, ToolInvocation, ToolchainRunner};

type Script = Box<dyn Fn(&ToolInvocation) -> Result<ProcessOutput, BuildError> + Send + Sync>;

/// Fake runner driven by a closure.
pub struct ScriptedRunner {
    script: Script,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    pub fn new(
        script: impl Fn(&ToolInvocation) -> Result<ProcessOutput, BuildError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Exit with `code`, printing `stdout` and `stderr`, producing nothing.
    pub fn exiting(code: i32, stdout: &str, stderr: &str) -> Self {
        let (stdout, stderr) = (stdout.to_string(), stderr.to_string());
        Self::new(move |_| Ok(output(ExitOutcome::Code { code }, &stdout, &stderr)))
    }

    /// Write each `(relative path, bytes)` under the target directory passed
    /// via `target_dir_flag`, then exit 0.
    pub fn producing(target_dir_flag: &str, files: Vec<(String, Vec<u8>)>) -> Self {
        let flag = target_dir_flag.to_string();
        Self::new(move |inv| {
            let out_dir = inv.arg_after(&flag).map(PathBuf::from).ok_or_else(|| {
                BuildError::Launch {
                    program: inv.program.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("missing {flag}"),
                    ),
                }
            })?;
            for (rel, bytes) in &files {
                write_file(&out_dir, rel, bytes).map_err(|e| BuildError::Wait {
                    program: inv.program.clone(),
                    source: e,
                })?;
            }
            Ok(output(
                ExitOutcome::Code { code: 0 },
                "   Compiling fw v0.1.0\n",
                "    Finished `dev` profile\n",
            ))
        })
    }

    /// Fail to launch, as if the toolchain were not installed.
    pub fn missing_toolchain() -> Self {
        Self::new(|inv| {
            Err(BuildError::Launch {
                program: inv.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            })
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

fn output(status: ExitOutcome, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 1,
    }
}

fn write_file(root: &Path, rel: &str, bytes: &[u8]) -> std::io::Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)
}

#[async_trait]
impl ToolchainRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ProcessOutput, BuildError> {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.script)(invocation)
    }
}
