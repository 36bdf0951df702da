//! fwflash pipeline
//!
//! Drives one project from source to device:
//!
//! ```text
//! Staging -> Building -> Resolving -> Recording -> Flashing -> Done
//!                       (any failure) ------------------------> Aborted(stage, reason)
//! ```
//!
//! The toolchain sits behind [`ToolchainRunner`] and the hardware behind
//! `fwflash_transport::DeviceTransport`, so both can be replaced in tests.

pub mod build;
pub mod config;
pub mod error;
pub mod fakes;
pub mod flasher;
pub mod pipeline;
pub mod runner;
pub mod stage;

pub use build::{BuildConfig, BuildInvoker, BuildResult, DEFAULT_BUILD_TIMEOUT_SECS};
pub use config::{CleanupPolicy, PipelineConfig};
pub use error::{BuildError, PipelineError};
pub use flasher::{Flasher, DEFAULT_FLASH_TIMEOUT_SECS};
pub use pipeline::{Aborted, FlashPipeline, PipelineRun};
pub use runner::{ExitOutcome, ProcessOutput, TokioProcessRunner, ToolInvocation, ToolchainRunner};
pub use stage::{RunState, Stage, StageTiming};
