//! Structured observability hooks for pipeline runs.
//!
//! - `run_span` tagging every log line of a run with its id
//! - emitters for run and stage lifecycle events
//!
//! Verbosity follows `RUST_LOG`; JSON output is selected by the CLI `--json` flag.

use tracing::{info, warn, Span};

/// Span covering one pipeline run. Attach it with `Instrument::instrument`
/// so it follows the run across `.await` points.
///
/// ```ignore
/// pipeline.run_inner(path).instrument(run_span(&run_id, "/work/fw")).await
/// ```
pub fn run_span(run_id: &str, project: &str) -> Span {
    tracing::info_span!("fwflash.run", run_id = %run_id, project = %project)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, project: &str) {
    info!(event = "run.started", run_id = %run_id, project = %project);
}

/// Emit event: the pipeline moved into `stage`.
pub fn emit_stage_entered(run_id: &str, stage: &str) {
    info!(event = "stage.entered", run_id = %run_id, stage = %stage);
}

/// Emit event: `stage` finished successfully.
pub fn emit_stage_completed(run_id: &str, stage: &str, duration_ms: u64) {
    info!(
        event = "stage.completed",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
    );
}

/// Emit event: run aborted in `stage` (warning level).
pub fn emit_run_aborted(
    run_id: &str,
    stage: &str,
    duration_ms: u64,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "run.aborted",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        error = %error,
    );
}

/// Emit event: run finished, artifact delivered.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, bytes_flashed: u64, checksum: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        bytes_flashed = bytes_flashed,
        checksum = %checksum,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id", "/tmp/fw");
        let _guard = span.enter();
        emit_stage_entered("test-run-id", "staging");
    }

    #[test]
    fn test_lifecycle_emitters() {
        let span = run_span("run-2", "/tmp/fw");
        let _guard = span.enter();
        emit_run_started("run-2", "/tmp/fw");
        emit_stage_entered("run-2", "building");
        emit_stage_completed("run-2", "building", 12);
        emit_run_finished("run-2", 40, 1024, &"0".repeat(64));
        emit_run_aborted("run-2", "flashing", 40, &"device rejected image");
    }
}
