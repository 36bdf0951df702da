//! Pipeline error types and exit-code mapping.

use fwflash_core::{IntegrityError, ProjectError, ResolveError, StagingError};
use fwflash_transport::FlashError;
use thiserror::Error;

use crate::runner::ExitOutcome;
use crate::stage::Stage;

/// Build stage failures.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The toolchain could not be started (not installed, not executable).
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the toolchain process failed.
    #[error("failed waiting on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {limit_secs}s")]
    Timeout { program: String, limit_secs: u64 },

    /// The build ran and did not succeed. Both streams are kept exactly as
    /// the toolchain wrote them.
    #[error("build failed ({status}):\n{stdout}{stderr}")]
    Failed {
        status: ExitOutcome,
        stdout: String,
        stderr: String,
    },
}

/// Any failure that aborts a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Flash(#[from] FlashError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Project(ProjectError::NotADirectory { .. })
            | PipelineError::Project(ProjectError::Unresolvable { .. }) => 1,
            PipelineError::Project(ProjectError::ManifestMissing { .. })
            | PipelineError::Project(ProjectError::ManifestUnreadable { .. }) => 2,
            PipelineError::Build(_) => 3,
            PipelineError::Staging(_) => 4,
            PipelineError::Resolve(_) => 5,
            PipelineError::Integrity(_) => 6,
            PipelineError::Flash(_) => 7,
            PipelineError::Config(_) => 8,
        }
    }

    /// The stage this error belongs to. Project validation happens while
    /// staging; configuration errors precede every stage.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Project(_) | PipelineError::Staging(_) => Some(Stage::Staging),
            PipelineError::Build(_) => Some(Stage::Building),
            PipelineError::Resolve(_) => Some(Stage::Resolving),
            PipelineError::Integrity(_) => Some(Stage::Recording),
            PipelineError::Flash(_) => Some(Stage::Flashing),
            PipelineError::Config(_) => None,
        }
    }
}
