//! Minimal, tolerant scan of a cargo manifest for declared output names.
//!
//! This is not a TOML parser. Only `[package] name` and `[[bin]] name` are
//! extracted; anything the scanner does not understand is skipped. Uncertainty
//! surfaces as "no declared name" and is settled by the artifact resolver's
//! fallback order instead of by parser sophistication.

use serde::{Deserialize, Serialize};

/// Output names declared by a project's build manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// `[package] name`, if present.
    pub package_name: Option<String>,

    /// Every `[[bin]] name` in declaration order.
    pub bin_names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Other,
    Package,
    Bin,
}

impl BuildManifest {
    /// Scan manifest text. Never fails.
    pub fn scan(text: &str) -> Self {
        let mut manifest = BuildManifest::default();
        let mut table = Table::Other;

        for raw in text.lines() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix("[[").and_then(|l| l.strip_suffix("]]")) {
                table = match header.trim() {
                    "bin" => Table::Bin,
                    _ => Table::Other,
                };
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                table = match header.trim() {
                    "package" => Table::Package,
                    _ => Table::Other,
                };
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.trim() != "name" {
                continue;
            }
            // Non-literal values (e.g. `name.workspace = true`) never reach here
            // because the key would not be exactly `name`.
            let Some(value) = unquote(value.trim()) else {
                continue;
            };

            match table {
                Table::Package if manifest.package_name.is_none() => {
                    manifest.package_name = Some(value.to_string());
                }
                Table::Bin => manifest.bin_names.push(value.to_string()),
                _ => {}
            }
        }

        manifest
    }

    /// The binary name the manifest explicitly asks for.
    ///
    /// A single `[[bin]]` target wins over the package name. Several `[[bin]]`
    /// targets are ambiguous, so no name is declared.
    pub fn declared_binary(&self) -> Option<&str> {
        match self.bin_names.as_slice() {
            [only] => Some(only.as_str()),
            [] => self.package_name.as_deref(),
            _ => None,
        }
    }

    /// Project identifier from the manifest, if any.
    pub fn project_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (idx, ch) in line.char_indices() {
        match (quote, ch) {
            (None, '"') | (None, '\'') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, '#') => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn unquote(value: &str) -> Option<&str> {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))?;
    if inner.is_empty() || inner.contains(['"', '\'']) {
        return None;
    }
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name() {
        let m = BuildManifest::scan(
            r#"
[package]
name = "blinky"
version = "0.1.0"

[dependencies]
name = "not-this-one"
"#,
        );
        assert_eq!(m.package_name.as_deref(), Some("blinky"));
        assert_eq!(m.declared_binary(), Some("blinky"));
    }

    #[test]
    fn test_single_bin_overrides_package() {
        let m = BuildManifest::scan(
            r#"
[package]
name = "board-support"

[[bin]]
name = "telemetry"
path = "src/bin/telemetry.rs"
"#,
        );
        assert_eq!(m.declared_binary(), Some("telemetry"));
        assert_eq!(m.project_name(), Some("board-support"));
    }

    #[test]
    fn test_multiple_bins_declare_nothing() {
        let m = BuildManifest::scan(
            r#"
[package]
name = "boards"

[[bin]]
name = "pod"

[[bin]]
name = "navigation"
"#,
        );
        assert_eq!(m.bin_names, vec!["pod", "navigation"]);
        assert_eq!(m.declared_binary(), None);
    }

    #[test]
    fn test_comments_and_spacing() {
        let m = BuildManifest::scan(
            "[ package ]   # the crate\n  name   =   'hash#tag'   # trailing\n",
        );
        assert_eq!(m.package_name.as_deref(), Some("hash#tag"));
    }

    #[test]
    fn test_unparseable_values_are_skipped() {
        let m = BuildManifest::scan(
            r#"
[package]
name.workspace = true
name = some_bare_word
"#,
        );
        assert_eq!(m, BuildManifest::default());
        assert_eq!(m.declared_binary(), None);
    }

    #[test]
    fn test_workspace_manifest_has_no_name() {
        let m = BuildManifest::scan(
            r#"
[workspace]
members = ["boards/stm32l476rg"]
"#,
        );
        assert_eq!(m.declared_binary(), None);
        assert_eq!(m.project_name(), None);
    }
}
