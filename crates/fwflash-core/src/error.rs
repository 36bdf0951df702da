//! Error taxonomy for the stages that run before anything touches hardware.

use std::path::{Path, PathBuf};

/// Errors produced while validating a project directory.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("project path is not a directory: {}", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("unable to resolve project path {}: {source}", .path.display())]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build manifest not found at {}", .path.display())]
    ManifestMissing { path: PathBuf },

    #[error("build manifest {} is unreadable: {source}", .path.display())]
    ManifestUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by the workspace stager.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("cannot stage under {}: not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("cannot stage under {}: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create staging directory {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no free staging directory name under {} after {attempts} attempt(s)", .root.display())]
    Exhausted { root: PathBuf, attempts: u32 },

    #[error("failed to remove staging directory {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by the artifact resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "no binary named {expected:?} under {}; {} other candidate(s): {}",
        .out_dir.display(),
        .candidates.len(),
        display_paths(.candidates)
    )]
    NotFound {
        out_dir: PathBuf,
        expected: Vec<String>,
        candidates: Vec<PathBuf>,
    },

    #[error(
        "ambiguous binary under {}: {}",
        .out_dir.display(),
        display_paths(.candidates)
    )]
    Ambiguous {
        out_dir: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("failed to scan {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// Candidate files discovered before resolution gave up.
    pub fn candidates(&self) -> &[PathBuf] {
        match self {
            ResolveError::NotFound { candidates, .. } => candidates,
            ResolveError::Ambiguous { candidates, .. } => candidates,
            ResolveError::Io { .. } => &[],
        }
    }
}

/// Errors produced while recording or re-verifying an integrity record.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact {} is empty", .path.display())]
    EmptyArtifact { path: PathBuf },

    #[error(
        "artifact {} changed between resolution ({expected} bytes) and recording ({actual} bytes)",
        .path.display()
    )]
    SizeChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("integrity record already exists at {}", .path.display())]
    AlreadyRecorded { path: PathBuf },

    #[error("encoded content is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntegrityError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_every_candidate() {
        let err = ResolveError::Ambiguous {
            out_dir: PathBuf::from("/tmp/out"),
            candidates: vec![
                PathBuf::from("/tmp/out/debug/alpha"),
                PathBuf::from("/tmp/out/debug/beta"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("alpha"));
        assert!(msg.contains("beta"));
        assert_eq!(err.candidates().len(), 2);
    }

    #[test]
    fn test_not_found_with_no_candidates() {
        let err = ResolveError::NotFound {
            out_dir: PathBuf::from("/tmp/out"),
            expected: vec!["blinky".to_string()],
            candidates: vec![],
        };
        assert!(err.to_string().contains("none"));
        assert!(err.to_string().contains("blinky"));
        assert!(err.candidates().is_empty());
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let err = IntegrityError::ChecksumMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }
}
