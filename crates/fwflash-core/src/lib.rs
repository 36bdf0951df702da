//! fwflash core library
//!
//! Everything the pipeline does before a byte reaches hardware:
//! - `ProjectHandle`: validated project directory and its scanned manifest
//! - `WorkspaceStager`: collision-free, run-scoped build output directories
//! - `ArtifactResolver`: three-tier lookup of the binary to flash
//! - `IntegrityRecorder`: checksum + base64 audit record, written once per run

pub mod artifact;
pub mod checksum;
pub mod error;
pub mod integrity;
pub mod manifest;
pub mod obs;
pub mod project;
pub mod staging;
pub mod telemetry;

pub use artifact::{Artifact, ArtifactResolver, ResolutionTier};
pub use checksum::Checksum;
pub use error::{IntegrityError, ProjectError, ResolveError, StagingError};
pub use integrity::{IntegrityRecord, IntegrityRecorder};
pub use manifest::BuildManifest;
pub use obs::{
    emit_run_aborted, emit_run_finished, emit_run_started, emit_stage_completed,
    emit_stage_entered, run_span,
};
pub use project::{ProjectHandle, MANIFEST_FILE_NAME};
pub use staging::{
    StagedBuildDir, WorkspaceStager, DEFAULT_STAGING_ATTEMPTS, RECORD_FILE_SUFFIX,
    STAGING_DIR_PREFIX, STAGING_SUFFIX_RANGE,
};
pub use telemetry::init_tracing;

/// fwflash version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
