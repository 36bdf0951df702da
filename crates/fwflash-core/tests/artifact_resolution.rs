//! Artifact resolution over realistic cargo output trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use fwflash_core::{ArtifactResolver, BuildManifest, ResolutionTier, ResolveError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write(root: &Path, rel: &str, bytes: &[u8]) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, bytes).unwrap();
    path
}

fn set_mtime(path: &Path, secs_after_epoch: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs_after_epoch))
        .unwrap();
}

fn manifest(text: &str) -> BuildManifest {
    BuildManifest::scan(text)
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap()
}

/// Populate the noise cargo leaves next to real binaries.
fn cargo_noise(root: &Path, profile: &str) {
    write(root, &format!("{profile}/deps/blinky-0123abcd"), b"dep binary");
    write(root, &format!("{profile}/build/cortex-m-rt-1/out/link.x"), b"x");
    write(root, &format!("{profile}/.fingerprint/blinky-1/bin-blinky"), b"fp");
    write(root, &format!("{profile}/blinky.d"), b"deps file");
    write(root, &format!("{profile}/libboard.rlib"), b"rlib");
    write(root, &format!("{profile}/.cargo-lock"), b"");
    write(root, "CACHEDIR.TAG", b"Signature: 8a477f597d28d172789f06886806bc55");
}

// ---------------------------------------------------------------------------
// Tier 1: declared name
// ---------------------------------------------------------------------------

#[test]
fn declared_package_name_is_found_in_profile_dir() {
    let out = tempfile::tempdir().unwrap();
    cargo_noise(out.path(), "debug");
    let bin = write(out.path(), "debug/blinky", b"\x7fELF....");

    let artifact = ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"blinky\"\n"),
        Some("fw"),
    )
    .expect("resolve");

    assert_eq!(artifact.path(), canonical(&bin));
    assert_eq!(artifact.tier(), ResolutionTier::Declared);
    assert_eq!(artifact.size(), 8);
}

#[test]
fn declared_name_is_found_under_target_triple() {
    let out = tempfile::tempdir().unwrap();
    cargo_noise(out.path(), "thumbv7em-none-eabihf/release");
    let bin = write(out.path(), "thumbv7em-none-eabihf/release/blinky", b"firmware");

    let artifact = ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"blinky\"\n"),
        None,
    )
    .expect("resolve");
    assert_eq!(artifact.path(), canonical(&bin));
}

#[test]
fn declared_name_with_image_extension_matches_by_stem() {
    let out = tempfile::tempdir().unwrap();
    let bin = write(out.path(), "release/blinky.elf", b"firmware");

    let artifact = ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"blinky\"\n"),
        None,
    )
    .expect("resolve");
    assert_eq!(artifact.path(), canonical(&bin));
}

#[test]
fn most_recently_built_profile_wins() {
    let out = tempfile::tempdir().unwrap();
    let debug = write(out.path(), "debug/blinky", b"debug build");
    let release = write(out.path(), "release/blinky", b"release build");
    set_mtime(&debug, 2_000_000);
    set_mtime(&release, 1_000_000);

    let m = manifest("[package]\nname = \"blinky\"\n");
    let artifact = ArtifactResolver::resolve(out.path(), &m, None).expect("resolve");
    assert_eq!(artifact.path(), canonical(&debug));

    set_mtime(&release, 3_000_000);
    let artifact = ArtifactResolver::resolve(out.path(), &m, None).expect("resolve");
    assert_eq!(artifact.path(), canonical(&release));
}

#[test]
fn single_bin_target_beats_package_name() {
    let out = tempfile::tempdir().unwrap();
    write(out.path(), "debug/boards", b"package-named");
    let bin = write(out.path(), "debug/telemetry", b"bin-named");

    let m = manifest("[package]\nname = \"boards\"\n\n[[bin]]\nname = \"telemetry\"\n");
    let artifact = ArtifactResolver::resolve(out.path(), &m, None).expect("resolve");
    assert_eq!(artifact.path(), canonical(&bin));
}

#[test]
fn empty_declared_match_is_skipped() {
    let out = tempfile::tempdir().unwrap();
    write(out.path(), "debug/blinky", b"");
    let fallback = write(out.path(), "debug/fw", b"non-empty");

    let artifact = ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"blinky\"\n"),
        Some("fw"),
    )
    .expect("resolve");
    assert_eq!(artifact.path(), canonical(&fallback));
    assert_eq!(artifact.tier(), ResolutionTier::DirectoryName);
}

// ---------------------------------------------------------------------------
// Tier 2: project directory name
// ---------------------------------------------------------------------------

#[test]
fn directory_name_fallback_when_manifest_declares_nothing() {
    let out = tempfile::tempdir().unwrap();
    write(out.path(), "debug/other", b"other");
    let bin = write(out.path(), "debug/stm32l476rg", b"board image");

    let artifact = ArtifactResolver::resolve(
        out.path(),
        &manifest("[workspace]\nmembers = []\n"),
        Some("stm32l476rg"),
    )
    .expect("resolve");
    assert_eq!(artifact.path(), canonical(&bin));
    assert_eq!(artifact.tier(), ResolutionTier::DirectoryName);
}

#[test]
fn directory_name_fallback_when_declared_name_missing() {
    let out = tempfile::tempdir().unwrap();
    let bin = write(out.path(), "release/navigation", b"nav");

    let artifact = ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"renamed\"\n"),
        Some("navigation"),
    )
    .expect("resolve");
    assert_eq!(artifact.path(), canonical(&bin));
}

// ---------------------------------------------------------------------------
// Tier 3: refuse to guess
// ---------------------------------------------------------------------------

#[test]
fn two_unmatched_binaries_are_ambiguous() {
    let out = tempfile::tempdir().unwrap();
    cargo_noise(out.path(), "debug");
    let a = write(out.path(), "debug/pod", b"pod");
    let b = write(out.path(), "debug/navigation", b"navigation");

    let m = manifest("[package]\nname = \"boards\"\n[[bin]]\nname = \"pod\"\n[[bin]]\nname = \"navigation\"\n");
    match ArtifactResolver::resolve(out.path(), &m, Some("fw")) {
        Err(ResolveError::Ambiguous { candidates, .. }) => {
            assert_eq!(candidates.len(), 2);
            assert!(candidates.contains(&a));
            assert!(candidates.contains(&b));
        }
        other => panic!("expected Ambiguous, got {other:?}"),
    }
}

#[test]
fn empty_tree_is_not_found() {
    let out = tempfile::tempdir().unwrap();

    match ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"blinky\"\n"),
        Some("fw"),
    ) {
        Err(ResolveError::NotFound {
            expected,
            candidates,
            ..
        }) => {
            assert_eq!(expected, vec!["blinky".to_string(), "fw".to_string()]);
            assert!(candidates.is_empty());
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn only_noise_is_not_found() {
    let out = tempfile::tempdir().unwrap();
    cargo_noise(out.path(), "debug");

    let err = ArtifactResolver::resolve(out.path(), &BuildManifest::default(), None).unwrap_err();
    assert!(matches!(err, ResolveError::NotFound { .. }));
    assert!(err.candidates().is_empty());
}

#[test]
fn single_unmatched_binary_is_reported_not_flashed() {
    let out = tempfile::tempdir().unwrap();
    let stray = write(out.path(), "debug/something-else", b"stray");

    match ArtifactResolver::resolve(
        out.path(),
        &manifest("[package]\nname = \"blinky\"\n"),
        Some("fw"),
    ) {
        Err(ResolveError::NotFound { candidates, .. }) => assert_eq!(candidates, vec![stray]),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn missing_output_dir_is_io_error() {
    let out = tempfile::tempdir().unwrap();
    let err = ArtifactResolver::resolve(
        &out.path().join("never-built"),
        &BuildManifest::default(),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, ResolveError::Io { .. }));
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn resolution_is_deterministic() {
    let out = tempfile::tempdir().unwrap();
    cargo_noise(out.path(), "debug");
    write(out.path(), "debug/blinky", b"debug");
    write(out.path(), "release/blinky", b"release");
    write(out.path(), "thumbv6m-none-eabi/release/blinky", b"cross");

    let m = manifest("[package]\nname = \"blinky\"\n");
    let first = ArtifactResolver::resolve(out.path(), &m, None).expect("first");
    let second = ArtifactResolver::resolve(out.path(), &m, None).expect("second");
    assert_eq!(first, second);

    let amb = manifest("");
    write(out.path(), "debug/other", b"other");
    let e1 = ArtifactResolver::resolve(out.path(), &amb, None).unwrap_err();
    let e2 = ArtifactResolver::resolve(out.path(), &amb, None).unwrap_err();
    assert_eq!(e1.candidates(), e2.candidates());
}
