//! # Recipe Mutation
//!
//! Rewrites the `pkgver` / `pkgrel` assignments of a `PKGBUILD` and then
//! regenerates what depends on them: source checksums (`updpkgsums`) and the
//! `.SRCINFO` sidecar (`makepkg --printsrcinfo`). The regenerated metadata is
//! parsed again and compared with what was requested; any mismatch fails the
//! mutation before anything is built.
//!
//! The text rewrite is a pure function ([`apply_change`]) so it can be
//! property-tested. The external tools sit behind [`RecipeTools`].

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use regex::{Captures, Regex};

use crate::error::{Error, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::srcinfo::{self, PackageMetadata};

/// File name of a package-build recipe.
pub const RECIPE_FILE: &str = "PKGBUILD";

/// What to do to a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeChange {
    /// New upstream version: `pkgver := version`, `pkgrel := 1`.
    SetVersion(String),
    /// Rebuild of the same version: `pkgrel := pkgrel + 1`.
    BumpRelease,
}

/// The version and release a recipe holds after a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeTarget {
    pub version: String,
    pub release: u32,
}

/// A rewritten recipe text and the values it now declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenRecipe {
    pub content: String,
    pub target: RecipeTarget,
}

const PKGVER_PATTERN: &str = r"(?m)^pkgver=([^\s#]*)";
const PKGREL_PATTERN: &str = r"(?m)^pkgrel=([^\s#]*)";

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// Whether `version` is acceptable as a `pkgver` value.
///
/// makepkg rejects empty versions and versions containing `-`, `:`, `/` or
/// whitespace.
pub fn is_valid_pkgver(version: &str) -> bool {
    !version.is_empty()
        && !version
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '-' | ':' | '/' | '#' | '"' | '\''))
}

/// Apply `change` to recipe text. `path` only labels errors.
///
/// Only the first unindented `pkgver=` and `pkgrel=` assignments are
/// touched; trailing comments survive. A missing `pkgrel=` is inserted on the
/// line after `pkgver=` for a version change.
pub fn apply_change(content: &str, change: &RecipeChange, path: &Path) -> Result<RewrittenRecipe> {
    let fail = |message: String| Error::RecipeMutation {
        path: path.to_path_buf(),
        message,
    };
    let pkgver_re = Regex::new(PKGVER_PATTERN)?;
    let pkgrel_re = Regex::new(PKGREL_PATTERN)?;

    let pkgver = pkgver_re
        .captures(content)
        .ok_or_else(|| fail("no 'pkgver=' assignment".to_string()))?;
    let current_version = unquote(&pkgver[1]).to_string();
    let current_release = pkgrel_re.captures(content).map(|c| unquote(&c[1]).to_string());

    let target = match change {
        RecipeChange::SetVersion(version) => {
            if !is_valid_pkgver(version) {
                return Err(fail(format!("'{}' is not a valid pkgver", version)));
            }
            RecipeTarget {
                version: version.clone(),
                release: 1,
            }
        }
        RecipeChange::BumpRelease => {
            let raw = current_release.ok_or_else(|| fail("no 'pkgrel=' assignment to bump".to_string()))?;
            let release = srcinfo::parse_release(&raw)
                .ok_or_else(|| fail(format!("pkgrel '{}' is not a positive integer", raw)))?;
            let release = release
                .checked_add(1)
                .ok_or_else(|| fail(format!("pkgrel {} cannot be bumped any further", release)))?;
            RecipeTarget {
                version: current_version,
                release,
            }
        }
    };

    let version_line = format!("pkgver={}", target.version);
    let release_line = format!("pkgrel={}", target.release);

    let mut rewritten = pkgver_re
        .replacen(content, 1, |_: &Captures| version_line.clone())
        .into_owned();

    if pkgrel_re.is_match(&rewritten) {
        rewritten = pkgrel_re
            .replacen(&rewritten, 1, |_: &Captures| release_line.clone())
            .into_owned();
    } else {
        let line_end = pkgver_re
            .find(&rewritten)
            .map(|m| {
                rewritten[m.end()..]
                    .find('\n')
                    .map(|i| m.end() + i)
                    .unwrap_or(rewritten.len())
            })
            .ok_or_else(|| fail("pkgver assignment vanished during rewrite".to_string()))?;
        rewritten.insert_str(line_end, &format!("\n{}", release_line));
    }

    Ok(RewrittenRecipe {
        content: rewritten,
        target,
    })
}

/// External tools that regenerate derived recipe data.
pub trait RecipeTools: Send + Sync {
    /// Recompute the checksum arrays in place.
    fn update_checksums(&self, recipe_dir: &Path) -> Result<()>;

    /// Produce `.SRCINFO` text for the recipe.
    fn print_srcinfo(&self, recipe_dir: &Path) -> Result<String>;
}

/// [`RecipeTools`] backed by `updpkgsums` and `makepkg --printsrcinfo`.
pub struct MakepkgTools {
    runner: Arc<dyn CommandRunner>,
    builder_user: Option<String>,
}

impl MakepkgTools {
    pub fn new(runner: Arc<dyn CommandRunner>, builder_user: Option<String>) -> Self {
        Self {
            runner,
            builder_user,
        }
    }
}

impl RecipeTools for MakepkgTools {
    fn update_checksums(&self, recipe_dir: &Path) -> Result<()> {
        let spec = CommandSpec::new("updpkgsums")
            .current_dir(recipe_dir)
            .as_user(self.builder_user.as_deref());
        self.runner.run_checked(&spec)?;
        Ok(())
    }

    fn print_srcinfo(&self, recipe_dir: &Path) -> Result<String> {
        let spec = CommandSpec::new("makepkg")
            .args(["--printsrcinfo", "--nocolor"])
            .current_dir(recipe_dir)
            .as_user(self.builder_user.as_deref());
        let output = self.runner.run_checked(&spec)?;
        Ok(output.stdout)
    }
}

/// Applies [`RecipeChange`]s to recipes on disk.
pub struct RecipeMutator {
    tools: Box<dyn RecipeTools>,
}

impl RecipeMutator {
    pub fn new(tools: Box<dyn RecipeTools>) -> Self {
        Self { tools }
    }

    /// Current metadata of the recipe in `recipe_dir`.
    ///
    /// Reads the committed `.SRCINFO`; when there is none, asks makepkg for
    /// it without writing anything.
    pub fn describe(&self, recipe_dir: &Path) -> Result<PackageMetadata> {
        let srcinfo_path = srcinfo::srcinfo_path(recipe_dir);
        if srcinfo_path.is_file() {
            return PackageMetadata::from_file(&srcinfo_path);
        }

        debug!("No {} in {}; generating it", srcinfo::SRCINFO_FILE, recipe_dir.display());
        let text = self.tools.print_srcinfo(recipe_dir).map_err(|e| Error::RecipeMutation {
            path: recipe_dir.join(RECIPE_FILE),
            message: format!("makepkg --printsrcinfo failed: {}", e),
        })?;
        srcinfo::parse_srcinfo(&text, &srcinfo_path)
    }

    /// The target `change` would produce for the recipe at `recipe_path`,
    /// validated against the recipe text but not written.
    pub fn preview(&self, recipe_path: &Path, change: &RecipeChange) -> Result<RecipeTarget> {
        let content = fs::read_to_string(recipe_path).map_err(|e| Error::RecipeMutation {
            path: recipe_path.to_path_buf(),
            message: format!("cannot read: {}", e),
        })?;
        Ok(apply_change(&content, change, recipe_path)?.target)
    }

    /// Rewrite the recipe at `recipe_path` in place.
    pub fn rewrite(&self, recipe_path: &Path, change: &RecipeChange) -> Result<RecipeTarget> {
        let fail = |message: String| Error::RecipeMutation {
            path: recipe_path.to_path_buf(),
            message,
        };

        let content = fs::read_to_string(recipe_path).map_err(|e| fail(format!("cannot read: {}", e)))?;
        let rewritten = apply_change(&content, change, recipe_path)?;
        fs::write(recipe_path, &rewritten.content).map_err(|e| fail(format!("cannot write: {}", e)))?;

        info!(
            "Rewrote {} to {}-{}",
            recipe_path.display(),
            rewritten.target.version,
            rewritten.target.release
        );
        Ok(rewritten.target)
    }

    /// Regenerate checksums and `.SRCINFO` for the recipe in `recipe_dir`
    /// and return the re-parsed metadata.
    ///
    /// Fails unless the metadata declares exactly `expected`.
    pub fn regenerate(&self, recipe_dir: &Path, expected: &RecipeTarget) -> Result<PackageMetadata> {
        let recipe_path = recipe_dir.join(RECIPE_FILE);
        let fail = |message: String| Error::RecipeMutation {
            path: recipe_path.clone(),
            message,
        };

        debug!("Updating checksums in {}", recipe_dir.display());
        self.tools
            .update_checksums(recipe_dir)
            .map_err(|e| fail(format!("updpkgsums failed: {}", e)))?;

        let text = self
            .tools
            .print_srcinfo(recipe_dir)
            .map_err(|e| fail(format!("makepkg --printsrcinfo failed: {}", e)))?;
        if text.trim().is_empty() {
            return Err(fail("makepkg --printsrcinfo produced no output".to_string()));
        }

        let srcinfo_path = srcinfo::srcinfo_path(recipe_dir);
        fs::write(&srcinfo_path, &text)?;
        let metadata = srcinfo::parse_srcinfo(&text, &srcinfo_path)?;

        if metadata.version != expected.version || metadata.release != expected.release {
            return Err(fail(format!(
                "regenerated metadata declares {}-{}, expected {}-{}",
                metadata.version, metadata.release, expected.version, expected.release
            )));
        }

        Ok(metadata)
    }
}
