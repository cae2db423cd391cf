//! Default values for gh-aur-updater configuration.
//!
//! This module provides centralized default values used by the CLI and the
//! configuration resolver, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

pub const DEFAULT_RUN_ID: &str = "local-run";
pub const DEFAULT_ACTOR: &str = "github-actions[bot]";
pub const DEFAULT_COMMIT_MESSAGE_PREFIX: &str = "CI: Auto update";
pub const DEFAULT_AUR_REMOTE_BASE: &str = "ssh://aur@aur.archlinux.org";
pub const DEFAULT_SEARCH_PATTERN: &str = "**/PKGBUILD";
pub const DEFAULT_AUR_RPC_URL: &str = "https://aur.archlinux.org/rpc";

/// Directory name for retained build artifacts, under the workspace.
pub const ARTIFACTS_DIR_NAME: &str = "artifacts";

/// The current user's home directory.
///
/// Falls back to `/tmp` if the home directory cannot be determined.
fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Returns the default base directory for per-package working directories.
///
/// `$HOME/arch_package_builds`. Overridden by `PACKAGE_BUILD_BASE_DIR`.
pub fn default_build_base_dir() -> PathBuf {
    home().join("arch_package_builds")
}

/// Returns the default working directory for nvchecker runs.
///
/// `$HOME/nvchecker_run`. Overridden by `NVCHECKER_RUN_DIR`.
pub fn default_nvchecker_run_dir() -> PathBuf {
    home().join("nvchecker_run")
}
