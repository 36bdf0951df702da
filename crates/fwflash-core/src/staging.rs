//! Run-scoped build output directories.
//!
//! Every pipeline run builds into its own directory under the project root so
//! concurrent runs against the same project never share output.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::error::StagingError;

/// Literal prefix of every staged directory name.
pub const STAGING_DIR_PREFIX: &str = "remote_flashing_tmp_dir_";

/// Range the random numeric suffix is drawn from.
pub const STAGING_SUFFIX_RANGE: RangeInclusive<u32> = 100_000..=999_999;

/// Default cap on name collisions before staging gives up.
pub const DEFAULT_STAGING_ATTEMPTS: u32 = 32;

/// Suffix of the integrity record written next to a staged directory.
pub const RECORD_FILE_SUFFIX: &str = ".integrity.json";

type SuffixSource = Arc<dyn Fn() -> u32 + Send + Sync>;

/// A directory created by [`WorkspaceStager::stage`] for exactly one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBuildDir {
    path: PathBuf,
    name: String,
}

impl StagedBuildDir {
    /// Absolute path of the staged directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name (`remote_flashing_tmp_dir_NNNNNN`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where this run's integrity record lives: a sibling of the staged directory.
    pub fn record_path(&self) -> PathBuf {
        let file = format!("{}{}", self.name, RECORD_FILE_SUFFIX);
        match self.path.parent() {
            Some(parent) => parent.join(file),
            None => PathBuf::from(file),
        }
    }

    /// Delete the staged directory and everything built into it.
    pub fn remove(self) -> Result<(), StagingError> {
        fs::remove_dir_all(&self.path).map_err(|e| StagingError::Remove {
            path: self.path.clone(),
            source: e,
        })?;
        info!(staged = %self.path.display(), "removed staging directory");
        Ok(())
    }
}

/// Creates collision-free staging directories.
#[derive(Clone)]
pub struct WorkspaceStager {
    max_attempts: u32,
    suffix: SuffixSource,
}

impl fmt::Debug for WorkspaceStager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceStager")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl Default for WorkspaceStager {
    fn default() -> Self {
        Self::new(DEFAULT_STAGING_ATTEMPTS)
    }
}

impl WorkspaceStager {
    /// Stager drawing random suffixes, giving up after `max_attempts` collisions.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            suffix: Arc::new(|| rand::thread_rng().gen_range(STAGING_SUFFIX_RANGE)),
        }
    }

    /// Replace the suffix generator (deterministic tests).
    pub fn with_suffix_source(mut self, source: impl Fn() -> u32 + Send + Sync + 'static) -> Self {
        self.suffix = Arc::new(source);
        self
    }

    /// Create a fresh, uniquely named directory under `project_root`.
    ///
    /// Names are claimed with an exclusive `create_dir`, so an existing entry is
    /// never reused. Collisions draw a new suffix; any other creation error
    /// fails immediately.
    pub fn stage(&self, project_root: &Path) -> Result<StagedBuildDir, StagingError> {
        let not_a_dir = || StagingError::NotADirectory {
            path: project_root.to_path_buf(),
        };
        match fs::metadata(project_root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(not_a_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_a_dir()),
            Err(e) => {
                return Err(StagingError::Inaccessible {
                    path: project_root.to_path_buf(),
                    source: e,
                })
            }
        }

        for attempt in 1..=self.max_attempts {
            let name = format!("{}{}", STAGING_DIR_PREFIX, (self.suffix)());
            let path = project_root.join(&name);

            match fs::create_dir(&path) {
                Ok(()) => {
                    info!(staged = %path.display(), attempt, "created staging directory");
                    return Ok(StagedBuildDir { path, name });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(candidate = %path.display(), attempt, "staging name collision");
                }
                Err(e) => return Err(StagingError::Create { path, source: e }),
            }
        }

        Err(StagingError::Exhausted {
            root: project_root.to_path_buf(),
            attempts: self.max_attempts,
        })
    }
}
