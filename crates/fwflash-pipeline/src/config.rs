//! Pipeline configuration: JSON file, then environment, then CLI flags.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use fwflash_core::DEFAULT_STAGING_ATTEMPTS;
use fwflash_transport::{DeviceTarget, TransportConfig};
use serde::{Deserialize, Serialize};

use crate::build::BuildConfig;
use crate::error::PipelineError;
use crate::flasher::DEFAULT_FLASH_TIMEOUT_SECS;

/// What happens to the staged build directory when a run ends.
///
/// The integrity record is never removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Keep it for inspection.
    #[default]
    Retain,
    /// Remove it after a successful flash only.
    OnSuccess,
    /// Remove it whatever the outcome.
    Always,
}

impl CleanupPolicy {
    pub fn should_remove(&self, succeeded: bool) -> bool {
        match self {
            CleanupPolicy::Retain => false,
            CleanupPolicy::OnSuccess => succeeded,
            CleanupPolicy::Always => true,
        }
    }
}

impl FromStr for CleanupPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "retain" | "keep" => Ok(CleanupPolicy::Retain),
            "on-success" => Ok(CleanupPolicy::OnSuccess),
            "always" => Ok(CleanupPolicy::Always),
            other => Err(PipelineError::Config(format!(
                "unknown cleanup policy {other:?} (expected retain, on-success or always)"
            ))),
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CleanupPolicy::Retain => "retain",
            CleanupPolicy::OnSuccess => "on-success",
            CleanupPolicy::Always => "always",
        })
    }
}

/// Everything a run needs besides the project path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub build: BuildConfig,
    pub flash_timeout_secs: u64,
    pub staging_attempts: u32,
    pub cleanup: CleanupPolicy,
    pub transport: TransportConfig,
    pub device: Option<DeviceTarget>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            flash_timeout_secs: DEFAULT_FLASH_TIMEOUT_SECS,
            staging_attempts: DEFAULT_STAGING_ATTEMPTS,
            cleanup: CleanupPolicy::default(),
            transport: TransportConfig::default(),
            device: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Apply `FWFLASH_*` overrides from the process environment.
    pub fn with_process_env(self) -> Result<Self, PipelineError> {
        self.with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`:
    ///
    /// - `FWFLASH_BUILD_TIMEOUT_SECS`
    /// - `FWFLASH_FLASH_TIMEOUT_SECS`
    /// - `FWFLASH_CLEANUP` (`retain`, `on-success`, `always`)
    /// - `FWFLASH_RELEASE` (`true` builds with `--release`)
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PipelineError> {
        if let Some(v) = lookup("FWFLASH_BUILD_TIMEOUT_SECS") {
            self.build.timeout_secs = parse_secs("FWFLASH_BUILD_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FWFLASH_FLASH_TIMEOUT_SECS") {
            self.flash_timeout_secs = parse_secs("FWFLASH_FLASH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("FWFLASH_CLEANUP") {
            self.cleanup = v.parse()?;
        }
        if let Some(v) = lookup("FWFLASH_RELEASE") {
            self.build.release = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        Ok(self)
    }

    /// Reject settings a run cannot start with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.build.program.trim().is_empty() {
            return Err(PipelineError::Config("build program is empty".to_string()));
        }
        if self.build.target_dir_flag.trim().is_empty() {
            return Err(PipelineError::Config(
                "build target-dir flag is empty".to_string(),
            ));
        }
        if self.flash_timeout_secs == 0 {
            return Err(PipelineError::Config(
                "flash timeout must be at least one second".to_string(),
            ));
        }
        if self.staging_attempts == 0 {
            return Err(PipelineError::Config(
                "staging attempts must be at least one".to_string(),
            ));
        }
        match &self.device {
            Some(d) if !d.address.trim().is_empty() => Ok(()),
            _ => Err(PipelineError::Config(
                "no device target configured".to_string(),
            )),
        }
    }

    /// Reject a transport whose arguments need a chip name the device lacks.
    pub fn validate_transport(&self) -> Result<(), PipelineError> {
        let has_chip = self
            .device
            .as_ref()
            .is_some_and(|d| d.chip.as_deref().is_some_and(|c| !c.trim().is_empty()));
        if self.transport.requires_chip() && !has_chip {
            return Err(PipelineError::Config(format!(
                "{} transport needs a chip name (--chip or device.chip)",
                self.transport
            )));
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64, PipelineError> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{key}={value:?} is not a number of seconds")))
}
