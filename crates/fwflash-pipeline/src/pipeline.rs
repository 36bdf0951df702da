//! Pipeline orchestration: stage, build, resolve, record, flash.
//!
//! Stages run strictly in order and the first failure ends the run. Nothing is
//! retried; in particular a failed flash is reported, never re-attempted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fwflash_core::{
    emit_run_aborted, emit_run_finished, emit_run_started, emit_stage_completed,
    emit_stage_entered, run_span, Artifact, ArtifactResolver, IntegrityRecord, IntegrityRecorder,
    ProjectHandle, StagedBuildDir, WorkspaceStager,
};
use fwflash_transport::{DeviceTarget, DeviceTransport, TransferReceipt};
use thiserror::Error;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::build::BuildInvoker;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::flasher::Flasher;
use crate::runner::{TokioProcessRunner, ToolchainRunner};
use crate::stage::{RunState, Stage, StageTiming};

/// A run that reached `Done`.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: String,
    pub project: PathBuf,
    pub staged_dir: PathBuf,
    /// Whether the cleanup policy removed `staged_dir`.
    pub staged_removed: bool,
    pub record_path: PathBuf,
    pub artifact: Artifact,
    pub record: IntegrityRecord,
    pub receipt: TransferReceipt,
    /// Stages entered, in order.
    pub history: Vec<Stage>,
    pub timings: Vec<StageTiming>,
    pub duration_ms: u64,
}

impl PipelineRun {
    pub fn state(&self) -> RunState {
        RunState::Done
    }
}

/// A run that ended in `Aborted`.
#[derive(Debug, Error)]
#[error("run {run_id} aborted{}: {error}", in_stage(.stage))]
pub struct Aborted {
    pub run_id: String,
    /// Stage that failed; `None` when the run never started a stage.
    pub stage: Option<Stage>,
    #[source]
    pub error: PipelineError,
    pub history: Vec<Stage>,
    /// Staged directory left on disk, if any.
    pub staged_dir: Option<PathBuf>,
    /// Integrity record written before the failure, if any.
    pub record_path: Option<PathBuf>,
}

fn in_stage(stage: &Option<Stage>) -> String {
    stage.map(|s| format!(" while {s}")).unwrap_or_default()
}

impl Aborted {
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }

    pub fn state(&self) -> RunState {
        RunState::Aborted {
            stage: self.stage,
            reason: self.error.to_string(),
        }
    }
}

/// Stage bookkeeping for one run.
struct Progress<'a> {
    run_id: &'a str,
    history: Vec<Stage>,
    timings: Vec<StageTiming>,
    current: Option<(Stage, Instant)>,
}

impl<'a> Progress<'a> {
    fn new(run_id: &'a str) -> Self {
        Self {
            run_id,
            history: Vec::new(),
            timings: Vec::new(),
            current: None,
        }
    }

    fn enter(&mut self, stage: Stage) {
        emit_stage_entered(self.run_id, stage.name());
        self.history.push(stage);
        self.current = Some((stage, Instant::now()));
    }

    fn complete(&mut self) {
        if let Some((stage, started)) = self.current.take() {
            let duration_ms = started.elapsed().as_millis() as u64;
            emit_stage_completed(self.run_id, stage.name(), duration_ms);
            self.timings.push(StageTiming { stage, duration_ms });
        }
    }

    fn failed_stage(&self) -> Option<Stage> {
        self.current.map(|(stage, _)| stage)
    }
}

struct Delivered {
    project: PathBuf,
    record_path: PathBuf,
    artifact: Artifact,
    record: IntegrityRecord,
    receipt: TransferReceipt,
}

/// Runs projects through the full pipeline against one device.
///
/// A pipeline holds no per-run state, so one instance can drive several
/// concurrent runs; each gets its own staged directory.
pub struct FlashPipeline {
    config: PipelineConfig,
    device: DeviceTarget,
    stager: WorkspaceStager,
    builder: BuildInvoker,
    flasher: Flasher,
}

impl FlashPipeline {
    /// Build a pipeline with explicit collaborators.
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn ToolchainRunner>,
        transport: Arc<dyn DeviceTransport>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let device = config
            .device
            .clone()
            .ok_or_else(|| PipelineError::Config("no device target configured".to_string()))?;

        Ok(Self {
            stager: WorkspaceStager::new(config.staging_attempts),
            builder: BuildInvoker::new(runner, config.build.clone()),
            flasher: Flasher::new(transport, Duration::from_secs(config.flash_timeout_secs)),
            device,
            config,
        })
    }

    /// Real toolchain, transport chosen by `config.transport`.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate_transport()?;
        let transport = config.transport.build();
        Self::new(config, Arc::new(TokioProcessRunner), transport)
    }

    /// Replace the workspace stager.
    pub fn with_stager(mut self, stager: WorkspaceStager) -> Self {
        self.stager = stager;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn device(&self) -> &DeviceTarget {
        &self.device
    }

    /// Run the whole pipeline for the project at `project_path`.
    pub async fn run(&self, project_path: impl AsRef<Path>) -> Result<PipelineRun, Aborted> {
        let project_path = project_path.as_ref();
        let run_id = Uuid::new_v4().to_string();
        let span = run_span(&run_id, &project_path.display().to_string());
        self.run_with_id(run_id, project_path).instrument(span).await
    }

    async fn run_with_id(&self, run_id: String, project_path: &Path) -> Result<PipelineRun, Aborted> {
        let start = Instant::now();
        emit_run_started(&run_id, &project_path.display().to_string());

        let mut progress = Progress::new(&run_id);
        let mut staged: Option<StagedBuildDir> = None;
        let outcome = self.execute(project_path, &mut progress, &mut staged).await;

        let record_path = staged.as_ref().map(StagedBuildDir::record_path);
        let staged_dir = staged.as_ref().map(|s| s.path().to_path_buf());
        let staged_removed = self.apply_cleanup(staged, outcome.is_ok());
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(delivered) => {
                emit_run_finished(
                    &run_id,
                    duration_ms,
                    delivered.receipt.bytes_written,
                    delivered.record.checksum.as_str(),
                );
                Ok(PipelineRun {
                    run_id: run_id.clone(),
                    project: delivered.project,
                    staged_dir: staged_dir.unwrap_or_default(),
                    staged_removed,
                    record_path: delivered.record_path,
                    artifact: delivered.artifact,
                    record: delivered.record,
                    receipt: delivered.receipt,
                    history: progress.history,
                    timings: progress.timings,
                    duration_ms,
                })
            }
            Err(error) => {
                let stage = progress.failed_stage().or_else(|| error.stage());
                emit_run_aborted(
                    &run_id,
                    stage.map_or("none", |s| s.name()),
                    duration_ms,
                    &error,
                );
                Err(Aborted {
                    run_id: run_id.clone(),
                    stage,
                    error,
                    history: progress.history,
                    staged_dir: staged_dir.filter(|_| !staged_removed),
                    record_path: record_path.filter(|p| p.exists()),
                })
            }
        }
    }

    async fn execute(
        &self,
        project_path: &Path,
        progress: &mut Progress<'_>,
        staged_slot: &mut Option<StagedBuildDir>,
    ) -> Result<Delivered, PipelineError> {
        progress.enter(Stage::Staging);
        let project = ProjectHandle::open(project_path)?;
        let staged = self.stager.stage(project.root())?;
        let out_dir = staged.path().to_path_buf();
        let record_path = staged.record_path();
        *staged_slot = Some(staged);
        progress.complete();

        progress.enter(Stage::Building);
        self.builder.build(&project, &out_dir).await?.into_result()?;
        progress.complete();

        progress.enter(Stage::Resolving);
        let artifact = ArtifactResolver::resolve(&out_dir, project.manifest(), project.dir_name())?;
        progress.complete();

        progress.enter(Stage::Recording);
        let record = IntegrityRecorder::record(&artifact, project.root(), &record_path)?;
        progress.complete();

        progress.enter(Stage::Flashing);
        let receipt = self.flasher.flash(&artifact, &record, &self.device).await?;
        progress.complete();

        info!(
            artifact = %artifact.path().display(),
            device = %self.device,
            transport = self.flasher.transport_kind(),
            "artifact delivered"
        );
        Ok(Delivered {
            project: project.root().to_path_buf(),
            record_path,
            artifact,
            record,
            receipt,
        })
    }

    /// Remove the staged directory if the policy says so. Returns whether it
    /// was removed; a failed removal is logged and does not change the outcome.
    fn apply_cleanup(&self, staged: Option<StagedBuildDir>, succeeded: bool) -> bool {
        let Some(staged) = staged else {
            return false;
        };
        if !self.config.cleanup.should_remove(succeeded) {
            return false;
        }
        match staged.remove() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "staging cleanup failed");
                false
            }
        }
    }
}
