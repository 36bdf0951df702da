//! Locating the binary to flash inside a staged build tree.
//!
//! Resolution order:
//! 1. the name the manifest declares (`[[bin]]` or `[package]`),
//! 2. the project directory name,
//! 3. give up with [`ResolveError::Ambiguous`] or [`ResolveError::NotFound`],
//!    carrying every plausible candidate. Nothing is guessed.
//!
//! Only cargo's output convention is searched:
//! `<out>/<profile>/<name>` and `<out>/<triple>/<profile>/<name>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ResolveError;
use crate::manifest::BuildManifest;

/// Cargo bookkeeping directories that never hold the final binary.
const IGNORED_DIRS: &[&str] = &["deps", "build", "incremental", ".fingerprint", "examples", "doc"];

/// Extensions a firmware image may carry; matched by stem.
const BINARY_EXTENSIONS: &[&str] = &["elf", "bin", "hex", "uf2", "exe"];

/// Which rule produced the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    /// Matched the name declared in the build manifest.
    Declared,
    /// Matched the project directory name.
    DirectoryName,
}

/// A resolved, non-empty binary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
    size: u64,
    tier: ResolutionTier,
}

impl Artifact {
    /// Wrap an existing file, checking that it is a non-empty regular file.
    pub fn from_path(path: impl AsRef<Path>, tier: ResolutionTier) -> io::Result<Self> {
        let path = fs::canonicalize(path.as_ref())?;
        let meta = fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        if meta.len() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is empty", path.display()),
            ));
        }
        Ok(Self {
            path,
            size: meta.len(),
            tier,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes observed at resolution time.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tier(&self) -> ResolutionTier {
        self.tier
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    path: PathBuf,
    modified: SystemTime,
}

/// Stateless resolver over a staged output tree.
pub struct ArtifactResolver;

impl ArtifactResolver {
    /// Resolve the binary to flash.
    ///
    /// `fallback_name` is the project directory name used when the manifest
    /// declares nothing or its declared name is not found. Results depend only
    /// on the tree contents, so repeated calls over the same tree agree.
    pub fn resolve(
        out_dir: &Path,
        manifest: &BuildManifest,
        fallback_name: Option<&str>,
    ) -> Result<Artifact, ResolveError> {
        let candidates = collect_candidates(out_dir)?;
        debug!(
            out_dir = %out_dir.display(),
            candidates = candidates.len(),
            "scanned build output"
        );

        let mut expected = Vec::new();
        let tiers = [
            (ResolutionTier::Declared, manifest.declared_binary()),
            (ResolutionTier::DirectoryName, fallback_name),
        ];

        for (tier, name) in tiers {
            let Some(name) = name else {
                continue;
            };
            if expected.iter().any(|e| e == name) {
                continue;
            }
            expected.push(name.to_string());

            if let Some(hit) = most_recent(candidates.iter().filter(|c| matches_name(&c.path, name))) {
                let artifact = Artifact::from_path(&hit.path, tier).map_err(|e| ResolveError::Io {
                    path: hit.path.clone(),
                    source: e,
                })?;
                info!(
                    artifact = %artifact.path().display(),
                    size = artifact.size(),
                    tier = ?tier,
                    "resolved artifact"
                );
                return Ok(artifact);
            }
            debug!(binary = name, tier = ?tier, "no artifact matched");
        }

        let paths: Vec<PathBuf> = candidates.into_iter().map(|c| c.path).collect();
        if paths.len() >= 2 {
            warn!(candidates = paths.len(), "artifact resolution is ambiguous");
            return Err(ResolveError::Ambiguous {
                out_dir: out_dir.to_path_buf(),
                candidates: paths,
            });
        }
        warn!(expected = ?expected, "no artifact found");
        Err(ResolveError::NotFound {
            out_dir: out_dir.to_path_buf(),
            expected,
            candidates: paths,
        })
    }
}

fn most_recent<'a>(matches: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    // Path breaks mtime ties so the choice is stable.
    matches.max_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.path.cmp(&b.path))
    })
}

fn matches_name(path: &Path, name: &str) -> bool {
    if path.file_name().and_then(|n| n.to_str()) == Some(name) {
        return true;
    }
    let stem = path.file_stem().and_then(|s| s.to_str());
    let ext = path.extension().and_then(|e| e.to_str());
    stem == Some(name) && ext.is_some_and(|e| BINARY_EXTENSIONS.contains(&e))
}

fn is_plausible_binary(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if file_name.starts_with('.') {
        return false;
    }
    match path.extension().and_then(|e| e.to_str()) {
        None => true,
        Some(ext) => BINARY_EXTENSIONS.contains(&ext),
    }
}

/// Non-empty plausible binaries at profile depth, sorted by path.
fn collect_candidates(out_dir: &Path) -> Result<Vec<Candidate>, ResolveError> {
    let mut found = Vec::new();
    for first in subdirs(out_dir)? {
        collect_files(&first, &mut found)?;
        for second in subdirs(&first)? {
            collect_files(&second, &mut found)?;
        }
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, ResolveError> {
    let mut dirs = Vec::new();
    for entry in read_dir(dir)? {
        let path = entry.path();
        let ignored = entry
            .file_name()
            .to_str()
            .map_or(true, |n| IGNORED_DIRS.contains(&n));
        if !ignored && path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn collect_files(dir: &Path, out: &mut Vec<Candidate>) -> Result<(), ResolveError> {
    for entry in read_dir(dir)? {
        let path = entry.path();
        if !is_plausible_binary(&path) {
            continue;
        }
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        out.push(Candidate {
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            path,
        });
    }
    Ok(())
}

fn read_dir(dir: &Path) -> Result<Vec<fs::DirEntry>, ResolveError> {
    let io_err = |e| ResolveError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)
}
