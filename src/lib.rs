//! # gh-aur-updater Library
//!
//! Keeps a repository of Arch Linux package recipes (`PKGBUILD` files) in step
//! with upstream. For every recipe found in the workspace the library asks
//! nvchecker for the latest upstream version and, when it changed, rewrites
//! the recipe, rebuilds it with makepkg, publishes the packages as a GitHub
//! release, commits the updated recipe back to the source repository and
//! pushes it to the AUR.
//!
//! The library is driven by the `gh-aur-updater` binary, usually from a
//! scheduled CI workflow.
//!
//! ## Quick Example
//!
//! ```
//! use std::path::Path;
//! use gh_aur_updater::recipe::{apply_change, RecipeChange};
//! use gh_aur_updater::srcinfo::parse_srcinfo;
//!
//! let srcinfo = "pkgbase = foo\n\tpkgver = 1.2.0\n\tpkgrel = 3\n\npkgname = foo\n";
//! let meta = parse_srcinfo(srcinfo, Path::new(".SRCINFO")).unwrap();
//! assert_eq!(meta.full_version(), "1.2.0-3");
//!
//! let recipe = "pkgname=foo\npkgver=1.2.0\npkgrel=3\n";
//! let rewritten = apply_change(
//!     recipe,
//!     &RecipeChange::SetVersion("1.3.0".to_string()),
//!     Path::new("PKGBUILD"),
//! )
//! .unwrap();
//! assert_eq!(rewritten.content, "pkgname=foo\npkgver=1.3.0\npkgrel=1\n");
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: One immutable [`config::RunConfiguration`]
//!   resolved from environment variables and flags.
//! - **Discovery (`workspace`, `srcinfo`)**: Locating recipes and reading their
//!   identity from `.SRCINFO`.
//! - **Adapters (`nvchecker`, `recipe`, `builder`, `release`, `registry`,
//!   `source_sync`)**: Each external tool sits behind a trait, with the real
//!   implementation shelling out through [`process::CommandRunner`].
//! - **AUR state (`aur`, `vercmp`)**: What the maintainer has published on the
//!   AUR, compared with pacman's version ordering.
//! - **Pipeline (`pipeline`)**: The per-package stage machine. Failures are
//!   contained per package.
//! - **Orchestrator (`orchestrator`)**: Runs the pipeline over every recipe
//!   and turns the results into a summary and an exit code.

pub mod aur;
pub mod builder;
pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod logging;
pub mod nvchecker;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod recipe;
pub mod registry;
pub mod release;
pub mod source_sync;
pub mod srcinfo;
pub mod vercmp;
pub mod workspace;

#[cfg(test)]
mod recipe_proptest;

/// Process exit codes.
pub mod exit_codes {
    /// Every package was skipped or updated.
    pub const SUCCESS: u8 = 0;
    /// At least one package failed, or the run could not be set up.
    pub const FAILURE: u8 = 1;
    /// Invalid invocation, such as a missing required variable.
    pub const USAGE: u8 = 2;
}
