//! Pipeline stages and run states.

use serde::{Deserialize, Serialize};

/// The stages of a run, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Validate the project and create the staged build directory.
    Staging,
    /// Run the toolchain into the staged directory.
    Building,
    /// Locate the binary in the build output.
    Resolving,
    /// Checksum, encode and persist the integrity record.
    Recording,
    /// Hand the verified image to the device transport.
    Flashing,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Staging,
        Stage::Building,
        Stage::Resolving,
        Stage::Recording,
        Stage::Flashing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Staging => "staging",
            Stage::Building => "building",
            Stage::Resolving => "resolving",
            Stage::Recording => "recording",
            Stage::Flashing => "flashing",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Done,
    Aborted { stage: Option<Stage>, reason: String },
}

/// Time spent in one completed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration_ms: u64,
}
