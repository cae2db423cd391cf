//! # Package Metadata
//!
//! Parses the `key = value` text emitted by `makepkg --printsrcinfo` (and
//! stored as `.SRCINFO` next to every recipe) into a [`PackageMetadata`]
//! record.
//!
//! `.SRCINFO` is a flat list of assignments. Array fields (`pkgname`,
//! `source`, `depends`, ...) simply repeat the key; everything else is a
//! scalar. Split packages open a new `pkgname = ...` section whose overrides we
//! ignore: the update pipeline only cares about the base identity.
//!
//! A parsed record is immutable. After the recipe is mutated, the `.SRCINFO`
//! is regenerated and parsed again into a fresh record.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{Error, Result};

/// Name of the metadata sidecar written next to each recipe.
pub const SRCINFO_FILE: &str = ".SRCINFO";

/// Keys that are arrays even when they appear only once.
const ARRAY_KEYS: &[&str] = &[
    "pkgname",
    "arch",
    "license",
    "groups",
    "depends",
    "makedepends",
    "checkdepends",
    "optdepends",
    "provides",
    "conflicts",
    "replaces",
    "backup",
    "options",
    "source",
    "noextract",
    "validpgpkeys",
    "md5sums",
    "sha1sums",
    "sha224sums",
    "sha256sums",
    "sha384sums",
    "sha512sums",
    "b2sums",
];

/// Parsed recipe identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// `pkgbase`, or the first `pkgname` when no base is declared.
    pub name: String,
    /// `pkgver`. Opaque: compared only for equality.
    pub version: String,
    /// `pkgrel`. Always at least 1.
    pub release: u32,
    pub epoch: Option<String>,
    /// Every `pkgname` produced by the recipe (more than one for split
    /// packages).
    pub package_names: Vec<String>,
    pub description: Option<String>,
    /// `source` entries in declaration order, architecture-specific ones
    /// (`source_x86_64`) appended after the generic ones.
    pub source_urls: Vec<String>,
    pub install: Option<String>,
    pub changelog: Option<String>,
}

impl PackageMetadata {
    /// Read and parse a `.SRCINFO` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Srcinfo {
            path: path.to_path_buf(),
            message: format!("cannot read: {}", e),
        })?;
        parse_srcinfo(&content, path)
    }

    /// Render `[epoch:]pkgver-pkgrel`.
    pub fn full_version(&self) -> String {
        match &self.epoch {
            Some(epoch) => format!("{}:{}-{}", epoch, self.version, self.release),
            None => format!("{}-{}", self.version, self.release),
        }
    }

    /// A copy with a different version and release.
    ///
    /// Used to synthesize post-mutation metadata when the recipe is not
    /// actually rewritten.
    pub fn with_version(&self, version: &str, release: u32) -> Self {
        Self {
            version: version.to_string(),
            release,
            ..self.clone()
        }
    }

    /// Local files the recipe references: non-URL `source` entries plus the
    /// `install` and `changelog` scripts. Returned as file names relative to
    /// the recipe directory, deduplicated, in declaration order.
    pub fn local_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        let sources = self.source_urls.iter().filter_map(|s| local_source(s));
        let scripts = self.install.iter().chain(self.changelog.iter()).cloned();

        for file in sources.chain(scripts) {
            if !files.contains(&file) {
                files.push(file);
            }
        }
        files
    }
}

/// The on-disk file name of a `source` entry, or `None` for remote sources.
///
/// `name::url` entries name the downloaded file `name`; they are local only
/// when `url` is not itself remote.
fn local_source(entry: &str) -> Option<String> {
    let (rename, location) = match entry.split_once("::") {
        Some((rename, location)) => (Some(rename), location),
        None => (None, entry),
    };

    if location.contains("://") {
        return None;
    }

    let file = rename.unwrap_or(location);
    Path::new(file)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Parse `.SRCINFO` text. `path` is only used for error messages.
pub fn parse_srcinfo(content: &str, path: &Path) -> Result<PackageMetadata> {
    let fail = |message: String| Error::Srcinfo {
        path: path.to_path_buf(),
        message,
    };

    let mut scalars: BTreeMap<String, String> = BTreeMap::new();
    let mut arrays: BTreeMap<String, Vec<String>> = BTreeMap::new();
    // Once the first pkgname section starts, only further pkgnames count.
    let mut in_package_section = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            warn!("Skipping malformed .SRCINFO line in {}: '{}'", path.display(), line);
            continue;
        };
        let key = key.trim();
        let value = value.trim().to_string();

        if key == "pkgname" {
            in_package_section = true;
            arrays.entry(key.to_string()).or_default().push(value);
            continue;
        }
        if in_package_section {
            continue;
        }

        let base_key = key.split_once('_').map(|(k, _)| k).unwrap_or(key);
        if ARRAY_KEYS.contains(&key) || ARRAY_KEYS.contains(&base_key) {
            let slot = if base_key == "source" { "source" } else { key };
            arrays.entry(slot.to_string()).or_default().push(value);
        } else if scalars.contains_key(key) {
            warn!(
                "Scalar key '{}' appears more than once in {}; keeping the first value",
                key,
                path.display()
            );
        } else {
            scalars.insert(key.to_string(), value);
        }
    }

    let package_names = arrays.remove("pkgname").unwrap_or_default();
    let name = scalars
        .remove("pkgbase")
        .or_else(|| package_names.first().cloned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| fail("no pkgbase or pkgname".to_string()))?;

    let version = scalars
        .remove("pkgver")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| fail("missing pkgver".to_string()))?;

    let raw_release = scalars
        .remove("pkgrel")
        .ok_or_else(|| fail("missing pkgrel".to_string()))?;
    let release = parse_release(&raw_release).ok_or_else(|| {
        fail(format!(
            "pkgrel must be a positive integer, got '{}'",
            raw_release
        ))
    })?;

    Ok(PackageMetadata {
        name,
        version,
        release,
        epoch: scalars.remove("epoch").filter(|e| !e.is_empty()),
        package_names,
        description: scalars.remove("pkgdesc"),
        source_urls: arrays.remove("source").unwrap_or_default(),
        install: scalars.remove("install"),
        changelog: scalars.remove("changelog"),
    })
}

/// Parse a `pkgrel` value as a positive integer.
pub fn parse_release(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|r| *r >= 1)
}

/// Path of the `.SRCINFO` sidecar for a recipe directory.
pub fn srcinfo_path(recipe_dir: &Path) -> PathBuf {
    recipe_dir.join(SRCINFO_FILE)
}
