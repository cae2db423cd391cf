//! # Output Configuration
//!
//! Controls how the end-of-run summary looks: emoji status markers on
//! terminals that can show them, bracketed plain-text markers everywhere
//! else (CI log files, dumb terminals, piped output).
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag
//! - `NO_COLOR` - disables markers when set (per https://no-color.org/)
//! - `CLICOLOR=0` - disables markers
//! - `CLICOLOR_FORCE=1` - forces markers even when stdout is not a TTY
//! - `TERM=dumb` - disables markers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gh_aur_updater::output::{updated_marker, OutputConfig};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! println!("{} foo 1.2.0-1 -> 1.3.0-1", updated_marker(&config));
//! ```

use std::env;

/// Output configuration for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from the environment and CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - The value of the --color CLI flag: "always", "never", or "auto"
    ///
    /// # Behavior
    /// - `--color=always`: Force emoji markers on (overrides NO_COLOR)
    /// - `--color=never`: Force plain markers
    /// - `--color=auto`: Detect based on environment
    ///
    /// In auto mode, plain markers are used if:
    /// - `NO_COLOR` environment variable is set (any value, including empty)
    /// - `CLICOLOR=0` is set
    /// - `TERM=dumb` is set
    /// - stdout is not a TTY (unless `CLICOLOR_FORCE=1`)
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    /// Detect whether color output is supported based on environment.
    fn detect_color_support() -> bool {
        // The presence of NO_COLOR (even if empty) disables colors
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        // TTY and terminal capability detection
        console::Term::stdout().features().colors_supported()
    }

    /// Create a configuration with emoji markers always enabled.
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    /// Create a configuration with plain markers, as used in CI logs and
    /// tests.
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Returns the appropriate string based on color configuration.
///
/// When colors are enabled, returns the emoji. When disabled, returns
/// the plain text alternative.
///
/// # Arguments
/// * `config` - The output configuration
/// * `emoji_str` - The emoji to use when colors are enabled
/// * `plain` - The plain text to use when colors are disabled
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Marker for a package that was updated and published.
///
/// `✅` with colors, `[DONE]` without. Used for the per-package lines of
/// the run summary.
pub fn updated_marker(config: &OutputConfig) -> &'static str {
    emoji(config, "\u{2705}", "[DONE]")
}

/// Marker for a package that needed no work.
///
/// `⏭️` with colors, `[SKIP]` without. The summary line carries the skip
/// reason after the version.
pub fn skipped_marker(config: &OutputConfig) -> &'static str {
    emoji(config, "\u{23ED}\u{FE0F}", "[SKIP]")
}

/// Marker for a package whose update failed.
///
/// `❌` with colors, `[FAIL]` without. Any failed package makes the run
/// exit with status 1.
pub fn failed_marker(config: &OutputConfig) -> &'static str {
    emoji(config, "\u{274C}", "[FAIL]")
}
