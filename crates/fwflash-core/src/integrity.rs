//! Integrity records: what bytes were about to be flashed, and from where.
//!
//! The artifact is read exactly once. Checksum and transport encoding are both
//! derived from that single buffer, so a file rewritten between resolution and
//! recording cannot produce a record whose hash and content disagree.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::artifact::Artifact;
use crate::checksum::Checksum;
use crate::error::IntegrityError;

/// Persisted audit record for one pipeline run.
///
/// Serialized field names are part of the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    /// Absolute artifact path.
    pub path: String,
    /// SHA-256 of the artifact content.
    pub checksum: Checksum,
    /// When the record was created (RFC 3339).
    pub timestamp: DateTime<Utc>,
    /// Standard base64 of the artifact content.
    pub content_b64: String,
    /// Absolute project root the artifact was built from.
    pub project: String,
}

impl IntegrityRecord {
    /// Decode the stored content without checking it.
    pub fn decode_content(&self) -> Result<Vec<u8>, IntegrityError> {
        Ok(STANDARD.decode(self.content_b64.as_bytes())?)
    }

    /// Decode the stored content and confirm it still hashes to `checksum`.
    pub fn verify(&self) -> Result<Vec<u8>, IntegrityError> {
        let content = self.decode_content()?;
        self.checksum.verify(&content)?;
        Ok(content)
    }

    /// Whether this record was made for the file at `path`.
    ///
    /// `path` is stored lossily, so the comparison uses the same rendering.
    pub fn describes(&self, path: &Path) -> bool {
        self.path == path.to_string_lossy()
    }

    /// Load a persisted record.
    pub fn load(path: &Path) -> Result<Self, IntegrityError> {
        let text = fs::read_to_string(path).map_err(|e| IntegrityError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Builds and persists [`IntegrityRecord`]s.
pub struct IntegrityRecorder;

impl IntegrityRecorder {
    /// Record `artifact` at the current time and persist it to `destination`.
    pub fn record(
        artifact: &Artifact,
        project_root: &Path,
        destination: &Path,
    ) -> Result<IntegrityRecord, IntegrityError> {
        Self::record_at(artifact, project_root, destination, Utc::now())
    }

    /// Record with a fixed timestamp (deterministic tests).
    ///
    /// `destination` is written once: an existing file is never replaced.
    pub fn record_at(
        artifact: &Artifact,
        project_root: &Path,
        destination: &Path,
        timestamp: DateTime<Utc>,
    ) -> Result<IntegrityRecord, IntegrityError> {
        let path = artifact.path();
        let content = fs::read(path).map_err(|e| IntegrityError::io(path, e))?;
        if content.is_empty() {
            return Err(IntegrityError::EmptyArtifact {
                path: path.to_path_buf(),
            });
        }
        if content.len() as u64 != artifact.size() {
            return Err(IntegrityError::SizeChanged {
                path: path.to_path_buf(),
                expected: artifact.size(),
                actual: content.len() as u64,
            });
        }

        let record = IntegrityRecord {
            path: path.to_string_lossy().into_owned(),
            checksum: Checksum::compute(&content),
            timestamp,
            content_b64: STANDARD.encode(&content),
            project: project_root.to_string_lossy().into_owned(),
        };

        persist_once(destination, &serde_json::to_vec_pretty(&record)?)?;
        info!(
            record = %destination.display(),
            checksum = %record.checksum.short(),
            bytes = content.len(),
            "integrity record written"
        );
        Ok(record)
    }
}

/// Atomic write that refuses to replace an existing file.
fn persist_once(destination: &Path, data: &[u8]) -> Result<(), IntegrityError> {
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| IntegrityError::io(dir, e))?;
    tmp.write_all(data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| IntegrityError::io(tmp.path(), e))?;
    tmp.persist_noclobber(destination).map_err(|e| {
        if e.error.kind() == ErrorKind::AlreadyExists {
            IntegrityError::AlreadyRecorded {
                path: destination.to_path_buf(),
            }
        } else {
            IntegrityError::io(destination, e.error)
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ResolutionTier;

    fn fixed_timestamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .expect("parse timestamp")
            .with_timezone(&Utc)
    }

    fn artifact_with(dir: &Path, bytes: &[u8]) -> Artifact {
        let path = dir.join("fw.bin");
        fs::write(&path, bytes).unwrap();
        Artifact::from_path(&path, ResolutionTier::Declared).unwrap()
    }

    #[test]
    fn test_record_fields() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_with(dir.path(), b"\x7fELF firmware");
        let dest = dir.path().join("run.integrity.json");

        let record =
            IntegrityRecorder::record_at(&artifact, dir.path(), &dest, fixed_timestamp()).unwrap();

        assert_eq!(record.checksum, Checksum::compute(b"\x7fELF firmware"));
        assert_eq!(record.timestamp, fixed_timestamp());
        assert_eq!(record.verify().unwrap(), b"\x7fELF firmware");
        assert!(record.path.ends_with("fw.bin"));
    }

    #[test]
    fn test_persisted_json_schema() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_with(dir.path(), b"abc");
        let dest = dir.path().join("run.integrity.json");
        IntegrityRecorder::record_at(&artifact, dir.path(), &dest, fixed_timestamp()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&dest).unwrap()).unwrap();
        let obj = raw.as_object().expect("record object");
        for key in ["path", "checksum", "timestamp", "content_b64", "project"] {
            assert!(obj[key].is_string(), "{key} should be a string");
        }
        assert_eq!(obj.len(), 5);
        assert_eq!(raw["content_b64"], "YWJj");
        assert_eq!(raw["timestamp"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_record_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_with(dir.path(), b"abc");
        let dest = dir.path().join("run.integrity.json");
        IntegrityRecorder::record(&artifact, dir.path(), &dest).unwrap();

        match IntegrityRecorder::record(&artifact, dir.path(), &dest) {
            Err(IntegrityError::AlreadyRecorded { path }) => assert_eq!(path, dest),
            other => panic!("expected AlreadyRecorded, got {other:?}"),
        }
    }

    #[test]
    fn test_vanished_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_with(dir.path(), b"abc");
        fs::remove_file(artifact.path()).unwrap();
        let dest = dir.path().join("run.integrity.json");

        assert!(matches!(
            IntegrityRecorder::record(&artifact, dir.path(), &dest),
            Err(IntegrityError::Io { .. })
        ));
        assert!(!dest.exists());
    }

    #[test]
    fn test_rewritten_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_with(dir.path(), b"abc");
        fs::write(artifact.path(), b"abcdef").unwrap();
        let dest = dir.path().join("run.integrity.json");

        assert!(matches!(
            IntegrityRecorder::record(&artifact, dir.path(), &dest),
            Err(IntegrityError::SizeChanged {
                expected: 3,
                actual: 6,
                ..
            })
        ));
    }

    #[test]
    fn test_tampered_record_fails_verify() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = artifact_with(dir.path(), b"abc");
        let dest = dir.path().join("run.integrity.json");
        let mut record = IntegrityRecorder::record(&artifact, dir.path(), &dest).unwrap();

        record.content_b64 = STANDARD.encode(b"abd");
        assert!(matches!(
            record.verify(),
            Err(IntegrityError::ChecksumMismatch { .. })
        ));

        record.content_b64 = "!!not base64!!".to_string();
        assert!(matches!(record.verify(), Err(IntegrityError::Decode(_))));
    }
}
