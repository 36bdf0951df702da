//! Transport selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::mass_storage::{MassStorageTransport, DEFAULT_IMAGE_FILE_NAME};
use crate::network::NetworkTransport;
use crate::programmer::{
    ProgrammerTransport, PROBE_ARGS, PROBE_PROGRAM, SERIAL_ARGS, SERIAL_PROGRAM,
};
use crate::transport::DeviceTransport;

/// Which transport to build, and how.
///
/// ```json
/// { "kind": "serial" }
/// { "kind": "probe", "program": "/opt/probe-rs/bin/probe-rs" }
/// { "kind": "mass_storage", "file_name": "CURRENT.UF2" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    MassStorage {
        #[serde(default = "default_image_file_name")]
        file_name: String,
    },
    Serial {
        #[serde(default = "default_serial_program")]
        program: String,
        #[serde(default = "default_serial_args")]
        args: Vec<String>,
    },
    Probe {
        #[serde(default = "default_probe_program")]
        program: String,
        #[serde(default = "default_probe_args")]
        args: Vec<String>,
    },
    Network,
}

fn default_image_file_name() -> String {
    DEFAULT_IMAGE_FILE_NAME.to_string()
}

fn default_serial_program() -> String {
    SERIAL_PROGRAM.to_string()
}

fn default_serial_args() -> Vec<String> {
    SERIAL_ARGS.iter().map(|a| a.to_string()).collect()
}

fn default_probe_program() -> String {
    PROBE_PROGRAM.to_string()
}

fn default_probe_args() -> Vec<String> {
    PROBE_ARGS.iter().map(|a| a.to_string()).collect()
}

/// A debug probe: cargo links ELF, and `probe-rs` is the tool here that
/// flashes ELF sections where they belong.
impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Probe {
            program: default_probe_program(),
            args: default_probe_args(),
        }
    }
}

impl TransportConfig {
    /// Kind name as it appears in config files and on the command line.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::MassStorage { .. } => "mass_storage",
            TransportConfig::Serial { .. } => "serial",
            TransportConfig::Probe { .. } => "probe",
            TransportConfig::Network => "network",
        }
    }

    /// Whether the argument template needs `DeviceTarget::chip`.
    pub fn requires_chip(&self) -> bool {
        match self {
            TransportConfig::Serial { args, .. } | TransportConfig::Probe { args, .. } => {
                args.iter().any(|a| a.contains("{chip}"))
            }
            TransportConfig::MassStorage { .. } | TransportConfig::Network => false,
        }
    }

    /// Build the configured transport.
    pub fn build(&self) -> Arc<dyn DeviceTransport> {
        match self {
            TransportConfig::MassStorage { file_name } => {
                Arc::new(MassStorageTransport::new(file_name.clone()))
            }
            TransportConfig::Serial { program, args } => Arc::new(ProgrammerTransport::new(
                "serial",
                program.clone(),
                args.clone(),
            )),
            TransportConfig::Probe { program, args } => Arc::new(
                ProgrammerTransport::new("probe", program.clone(), args.clone()).accepting_elf(),
            ),
            TransportConfig::Network => Arc::new(NetworkTransport::new()),
        }
    }
}

/// Unrecognised transport kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport {0:?} (expected mass_storage, serial, probe or network)")]
pub struct UnknownTransport(pub String);

/// Parses a bare kind name with default settings (`--transport probe`).
impl FromStr for TransportConfig {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "mass_storage" | "uf2" => Ok(TransportConfig::MassStorage {
                file_name: default_image_file_name(),
            }),
            "serial" => Ok(TransportConfig::Serial {
                program: default_serial_program(),
                args: default_serial_args(),
            }),
            "probe" | "jtag" | "swd" => Ok(TransportConfig::default()),
            "network" | "tcp" => Ok(TransportConfig::Network),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}
