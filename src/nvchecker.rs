//! # Upstream Version Checks
//!
//! Wraps `nvchecker`. Each package directory carries a `.nvchecker.toml`
//! describing where its upstream versions come from; running nvchecker on it
//! yields the latest upstream version, which is compared (as an opaque
//! string) with the recipe's `pkgver`.
//!
//! nvchecker is run with `--logger json`, which emits one JSON object per
//! line:
//!
//! ```text
//! {"event": "updated", "name": "foo", "version": "1.3.0", "old_version": null, ...}
//! {"event": "up-to-date", "name": "foo", "version": "1.3.0", ...}
//! {"event": "unexpected error happened", "name": "foo", "level": "error", ...}
//! ```
//!
//! Older nvchecker versions, or runs where the JSON logger is unavailable,
//! print `foo: updated to 1.3.0` / `foo: current 1.3.0` instead; both forms
//! are understood.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::srcinfo::PackageMetadata;

/// Per-package version source configuration file name.
pub const NVCHECKER_CONFIG_FILE: &str = ".nvchecker.toml";

/// File name of the API keyfile written into the nvchecker run directory.
pub const KEYFILE_NAME: &str = "keyfile.toml";

/// Current vs. latest version for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheckResult {
    pub package_name: String,
    pub current_version: String,
    pub latest_version: String,
    /// Always `current_version != latest_version`.
    pub has_update: bool,
}

impl VersionCheckResult {
    pub fn new(
        package_name: impl Into<String>,
        current_version: impl Into<String>,
        latest_version: impl Into<String>,
    ) -> Self {
        let current_version = current_version.into();
        let latest_version = latest_version.into();
        Self {
            package_name: package_name.into(),
            has_update: current_version != latest_version,
            current_version,
            latest_version,
        }
    }
}

/// Trait for upstream version lookups - allows mocking in tests
pub trait VersionChecker: Send + Sync {
    /// Look up the latest upstream version of `metadata`'s package using the
    /// version source at `nvchecker_config`.
    fn check(&self, metadata: &PackageMetadata, nvchecker_config: &Path) -> Result<VersionCheckResult>;
}

/// [`VersionChecker`] that shells out to `nvchecker`.
pub struct NvChecker {
    runner: Arc<dyn CommandRunner>,
    run_dir: PathBuf,
    keyfile: Option<PathBuf>,
}

impl NvChecker {
    /// `run_dir` is the working directory for every nvchecker invocation;
    /// `keyfile` is passed with `-k` when it exists.
    pub fn new(runner: Arc<dyn CommandRunner>, run_dir: PathBuf, keyfile: Option<PathBuf>) -> Self {
        Self {
            runner,
            run_dir,
            keyfile,
        }
    }
}

impl VersionChecker for NvChecker {
    fn check(&self, metadata: &PackageMetadata, nvchecker_config: &Path) -> Result<VersionCheckResult> {
        let fail = |message: String| Error::VersionCheck {
            package: metadata.name.clone(),
            message,
        };

        if !nvchecker_config.is_file() {
            return Err(fail(format!("{} does not exist", nvchecker_config.display())));
        }

        let mut spec = CommandSpec::new("nvchecker")
            .arg("-c")
            .arg(nvchecker_config.as_os_str())
            .args(["--logger", "json"]);
        if let Some(keyfile) = self.keyfile.as_ref().filter(|k| k.is_file()) {
            spec = spec.arg("-k").arg(keyfile.as_os_str());
        }
        if self.run_dir.is_dir() {
            spec = spec.current_dir(&self.run_dir);
        }

        info!("Checking upstream version of {}", metadata.name);
        let output = self
            .runner
            .run(&spec)
            .map_err(|e| fail(format!("could not run nvchecker: {}", e)))?;

        // The JSON logger writes to stderr; scan both streams.
        let combined = format!("{}\n{}", output.stdout, output.stderr);
        let latest = match parse_report(&combined, metadata)? {
            Report::Version(version) => version,
            Report::Error(message) => return Err(fail(message)),
            Report::Nothing => {
                let detail = if output.success() {
                    "nvchecker reported no version".to_string()
                } else {
                    format!(
                        "nvchecker exited with {:?} and reported no version: {}",
                        output.status,
                        output.stderr.trim()
                    )
                };
                return Err(fail(detail));
            }
        };

        let result = VersionCheckResult::new(&metadata.name, &metadata.version, latest);
        if result.has_update {
            info!(
                "{}: {} -> {}",
                result.package_name, result.current_version, result.latest_version
            );
        } else {
            info!("{} is up to date ({})", result.package_name, result.current_version);
        }
        Ok(result)
    }
}

/// One line of nvchecker's JSON log.
#[derive(Debug, Deserialize)]
struct LogEvent {
    #[serde(default)]
    event: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    exc_info: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Report {
    Version(String),
    Error(String),
    Nothing,
}

fn matches_package(name: &str, metadata: &PackageMetadata) -> bool {
    name == metadata.name || metadata.package_names.iter().any(|n| n == name)
}

/// Extract the latest version for `metadata` from nvchecker output.
///
/// Entries naming the package win; when nvchecker reports exactly one entry
/// under another name (the config key differs from pkgbase) that entry is
/// used.
fn parse_report(output: &str, metadata: &PackageMetadata) -> Result<Report> {
    let mut own: Option<Report> = None;
    let mut others: Vec<(String, Report)> = Vec::new();
    let mut saw_json = false;

    for line in output.lines().map(str::trim).filter(|l| l.starts_with('{')) {
        let event: LogEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring non-JSON nvchecker line ({}): {}", e, line);
                continue;
            }
        };
        saw_json = true;

        let report = if matches!(event.event.as_str(), "updated" | "up-to-date") {
            match event.version {
                Some(version) if !version.is_empty() => Report::Version(version),
                _ => continue,
            }
        } else if event.level.as_deref() == Some("error") || event.event.contains("error") {
            let detail = event
                .error
                .or(event.exc_info)
                .map(|e| format!("{}: {}", event.event, e))
                .unwrap_or(event.event);
            warn!("nvchecker error: {}", detail);
            Report::Error(detail)
        } else {
            continue;
        };

        match event.name {
            Some(name) if matches_package(&name, metadata) => {
                // A version beats an error from a secondary source.
                if !matches!(own, Some(Report::Version(_))) {
                    own = Some(report);
                }
            }
            Some(name) => others.push((name, report)),
            None => {}
        }
    }

    if let Some(report) = own {
        return Ok(report);
    }

    let mut distinct: Vec<&String> = others.iter().map(|(n, _)| n).collect();
    distinct.sort();
    distinct.dedup();
    if distinct.len() == 1 {
        if let Some((name, report)) = others.into_iter().find(|(_, r)| matches!(r, Report::Version(_))) {
            debug!("Using nvchecker entry '{}' for package {}", name, metadata.name);
            return Ok(report);
        }
    }

    if saw_json {
        return Ok(Report::Nothing);
    }
    parse_plain(output, metadata)
}

/// Fallback for nvchecker's human-readable log format. Only lines naming
/// the package's base or one of its package names count.
fn parse_plain(output: &str, metadata: &PackageMetadata) -> Result<Report> {
    let mut names = vec![regex::escape(&metadata.name)];
    names.extend(metadata.package_names.iter().map(|n| regex::escape(n)));
    let names = names.join("|");

    let updated = Regex::new(&format!(r"(?im)(?:^|[\s\]])(?:{}):\s*updated to\s+([^\s,]+)", names))?;
    let current = Regex::new(&format!(r"(?im)(?:^|[\s\]])(?:{}):\s*current\s+([^\s,]+)", names))?;

    if let Some(c) = updated.captures(output) {
        return Ok(Report::Version(c[1].to_string()));
    }
    if let Some(c) = current.captures(output) {
        return Ok(Report::Version(c[1].to_string()));
    }
    Ok(Report::Nothing)
}

#[derive(Serialize)]
struct KeyFile<'a> {
    keys: Keys<'a>,
}

#[derive(Serialize)]
struct Keys<'a> {
    github: &'a str,
}

/// Write the nvchecker API keyfile into `run_dir` with owner-only
/// permissions and return its path.
pub fn write_keyfile(run_dir: &Path, github_token: &str) -> Result<PathBuf> {
    fs::create_dir_all(run_dir)?;
    let path = run_dir.join(KEYFILE_NAME);
    let content = toml::to_string(&KeyFile {
        keys: Keys {
            github: github_token,
        },
    })?;
    fs::write(&path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o600)) {
            warn!("Could not restrict permissions on {}: {}", path.display(), e);
        }
    }

    info!("Wrote nvchecker keyfile to {}", path.display());
    Ok(path)
}
