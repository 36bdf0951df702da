//! Validated firmware project handle.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ProjectError;
use crate::manifest::BuildManifest;

/// Build manifest file name. Matched case-sensitively on every platform.
pub const MANIFEST_FILE_NAME: &str = "Cargo.toml";

/// An existing project directory whose build manifest was readable when the
/// handle was opened. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectHandle {
    root: PathBuf,
    manifest_path: PathBuf,
    manifest: BuildManifest,
}

impl ProjectHandle {
    /// Validate `path` and read its build manifest.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();

        let meta = fs::metadata(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProjectError::NotADirectory {
                path: path.to_path_buf(),
            },
            _ => ProjectError::Unresolvable {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        if !meta.is_dir() {
            return Err(ProjectError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let root = fs::canonicalize(path).map_err(|e| ProjectError::Unresolvable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest_path = root.join(MANIFEST_FILE_NAME);

        // Case-insensitive filesystems would happily open `cargo.toml`.
        if !has_exact_entry(&root, MANIFEST_FILE_NAME)? || !manifest_path.is_file() {
            return Err(ProjectError::ManifestMissing {
                path: manifest_path,
            });
        }

        let text =
            fs::read_to_string(&manifest_path).map_err(|e| ProjectError::ManifestUnreadable {
                path: manifest_path.clone(),
                source: e,
            })?;
        let manifest = BuildManifest::scan(&text);
        debug!(
            project = %root.display(),
            declared = ?manifest.declared_binary(),
            "opened project"
        );

        Ok(Self {
            root,
            manifest_path,
            manifest,
        })
    }

    /// Absolute project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the build manifest.
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Names scanned from the build manifest.
    pub fn manifest(&self) -> &BuildManifest {
        &self.manifest
    }

    /// Final component of the project root, the fallback binary stem.
    pub fn dir_name(&self) -> Option<&str> {
        self.root.file_name().and_then(|n| n.to_str())
    }
}

fn has_exact_entry(dir: &Path, name: &str) -> Result<bool, ProjectError> {
    let entries = fs::read_dir(dir).map_err(|e| ProjectError::Unresolvable {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries.flatten() {
        if entry.file_name() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_valid_project() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("blinky");
        fs::create_dir(&project).unwrap();
        fs::write(
            project.join("Cargo.toml"),
            "[package]\nname = \"blinky\"\n",
        )
        .unwrap();

        let handle = ProjectHandle::open(&project).unwrap();
        assert!(handle.root().is_absolute());
        assert_eq!(handle.dir_name(), Some("blinky"));
        assert_eq!(handle.manifest().declared_binary(), Some("blinky"));
        assert!(handle.manifest_path().ends_with("Cargo.toml"));
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectHandle::open(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ProjectError::NotADirectory { .. }));
    }

    #[test]
    fn test_file_is_not_a_project() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Cargo.toml");
        fs::write(&file, "").unwrap();
        let err = ProjectHandle::open(&file).unwrap_err();
        assert!(matches!(err, ProjectError::NotADirectory { .. }));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProjectHandle::open(dir.path()).unwrap_err();
        assert!(matches!(err, ProjectError::ManifestMissing { .. }));
    }

    #[test]
    fn test_manifest_name_is_case_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cargo.toml"), "[package]\nname = \"x\"\n").unwrap();
        let err = ProjectHandle::open(dir.path()).unwrap_err();
        assert!(matches!(err, ProjectError::ManifestMissing { .. }));
    }

    #[test]
    fn test_manifest_directory_is_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Cargo.toml")).unwrap();
        let err = ProjectHandle::open(dir.path()).unwrap_err();
        assert!(matches!(err, ProjectError::ManifestMissing { .. }));
    }
}
