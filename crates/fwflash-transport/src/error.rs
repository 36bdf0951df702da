//! Errors reported by device transports.

use thiserror::Error;

/// A failed transfer. Every variant is terminal for the run; nothing here is
/// retried automatically.
#[derive(Error, Debug)]
pub enum FlashError {
    /// The bytes that arrived do not hash to the expected checksum.
    #[error("checksum mismatch on {side} side: expected {expected}, got {actual}")]
    ChecksumMismatch {
        side: VerifySide,
        expected: String,
        actual: String,
    },

    /// The device refused the image.
    #[error("device {device} rejected the image: {reason}")]
    Rejected { device: String, reason: String },

    /// Device could not be reached at all.
    #[error("device {device} is unreachable: {reason}")]
    Unreachable { device: String, reason: String },

    /// Nothing to flash.
    #[error("refusing to flash an empty image")]
    EmptyImage,

    /// The integrity record and the artifact handed to the flasher disagree.
    #[error("integrity record does not match the artifact: {0}")]
    RecordMismatch(String),

    /// The target description is unusable for this transport.
    #[error("invalid device target: {0}")]
    InvalidTarget(String),

    /// The external programming tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The external programming tool ran and reported failure.
    #[error("{tool} failed ({}): {stderr}", describe_code(.code))]
    Programmer {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The transfer did not finish within the allowed time.
    #[error("transfer timed out after {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    /// Malformed exchange with a network programmer.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which end of the link detected a checksum mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifySide {
    /// Before any byte left the host.
    Sender,
    /// After the bytes arrived, before the write was committed.
    Receiver,
}

impl std::fmt::Display for VerifySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifySide::Sender => write!(f, "sending"),
            VerifySide::Receiver => write!(f, "receiving"),
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "terminated by signal".to_string(),
    }
}

/// Result alias for transport operations.
pub type FlashResult<T> = std::result::Result<T, FlashError>;
