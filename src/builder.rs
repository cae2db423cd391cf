//! # Package Builds
//!
//! Runs `makepkg` in a package's isolated build directory and collects what
//! it produced. Build logs (`makepkg -L` writes `*.log` files next to the
//! recipe, and the captured command output is saved as
//! `<name>-build.log`) are copied to the package's artifact directory whether
//! or not the build succeeds, so CI can upload them for post-mortem.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::recipe::RECIPE_FILE;
use crate::srcinfo::{PackageMetadata, SRCINFO_FILE};

/// Extension of the package archives makepkg produces.
const PACKAGE_EXT: &str = ".pkg.tar.zst";

/// What a build left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Package archives, as copied into `artifact_dir`.
    pub packages: Vec<PathBuf>,
    /// Build logs, as copied into `artifact_dir`.
    pub logs: Vec<PathBuf>,
    /// Directory retained for CI upload.
    pub artifact_dir: Option<PathBuf>,
}

impl BuildArtifact {
    /// The artifact of a build that did not run.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Trait for package builds - allows mocking in tests
pub trait Builder: Send + Sync {
    /// Build the recipe in `work_dir`.
    fn build(&self, metadata: &PackageMetadata, work_dir: &Path) -> Result<BuildArtifact>;
}

/// [`Builder`] that runs `makepkg`.
pub struct MakepkgBuilder {
    runner: Arc<dyn CommandRunner>,
    artifacts_dir: PathBuf,
    builder_user: Option<String>,
}

impl MakepkgBuilder {
    /// Artifacts for package `name` land in `<artifacts_dir>/<name>/`.
    pub fn new(runner: Arc<dyn CommandRunner>, artifacts_dir: PathBuf, builder_user: Option<String>) -> Self {
        Self {
            runner,
            artifacts_dir,
            builder_user,
        }
    }
}

impl Builder for MakepkgBuilder {
    fn build(&self, metadata: &PackageMetadata, work_dir: &Path) -> Result<BuildArtifact> {
        let name = &metadata.name;
        let artifact_dir = self.artifacts_dir.join(name);
        fs::create_dir_all(&artifact_dir)?;

        let spec = CommandSpec::new("makepkg")
            .args(["-Lcs", "--noconfirm", "--needed", "--noprogressbar"])
            .current_dir(work_dir)
            .as_user(self.builder_user.as_deref());

        info!("Building {} {}", name, metadata.full_version());
        let outcome = self.runner.run(&spec);

        // Keep whatever the run printed, even if it could not start.
        let captured = match &outcome {
            Ok(output) => format!(
                "$ {}\n\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
                output.command, output.stdout, output.stderr
            ),
            Err(e) => format!("$ {}\n\n{}\n", spec.display(), e),
        };
        let build_log = artifact_dir.join(format!("{}-build.log", name));
        fs::write(&build_log, captured)?;

        let mut logs = vec![build_log.clone()];
        logs.extend(collect_logs(work_dir, &artifact_dir)?);

        let fail = |message: String| Error::Build {
            package: name.clone(),
            message,
            log: Some(build_log.clone()),
        };

        let output = outcome.map_err(|e| fail(e.to_string()))?;
        if !output.success() {
            let tail: Vec<&str> = output.stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(fail(format!(
                "makepkg exited with {}: {}",
                output
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "a signal".to_string()),
                tail.join(" | ")
            )));
        }

        let built = find_packages(work_dir, metadata)?;
        if built.is_empty() {
            return Err(fail(format!("no *{} files found in {}", PACKAGE_EXT, work_dir.display())));
        }

        let mut packages = Vec::new();
        for path in &built {
            packages.push(copy_into(path, &artifact_dir)?);
        }
        for file in [RECIPE_FILE, SRCINFO_FILE] {
            let path = work_dir.join(file);
            if path.is_file() {
                copy_into(&path, &artifact_dir)?;
            }
        }

        info!(
            "Built {}: {}",
            name,
            packages
                .iter()
                .filter_map(|p| p.file_name())
                .map(|f| f.to_string_lossy())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(BuildArtifact {
            packages,
            logs,
            artifact_dir: Some(artifact_dir),
        })
    }
}

fn copy_into(path: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| Error::Unexpected {
        message: format!("{} has no file name", path.display()),
    })?;
    let target = dir.join(file_name);
    fs::copy(path, &target)?;
    debug!("Copied artifact: {}", target.display());
    Ok(target)
}

fn sorted_glob(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{}", glob::Pattern::escape(&dir.to_string_lossy()), pattern);
    let mut matches: Vec<PathBuf> = glob::glob(&full)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Unreadable glob entry: {}", e);
                None
            }
        })
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    Ok(matches)
}

/// Package archives in `work_dir`: those named after pkgbase, else those
/// named after any produced package, else any archive at all.
pub fn find_packages(work_dir: &Path, metadata: &PackageMetadata) -> Result<Vec<PathBuf>> {
    let mut prefixes = vec![metadata.name.clone()];
    prefixes.extend(metadata.package_names.iter().cloned());

    for prefix in &prefixes {
        let found = sorted_glob(work_dir, &format!("{}*{}", glob::Pattern::escape(prefix), PACKAGE_EXT))?;
        if !found.is_empty() {
            return Ok(found);
        }
    }
    sorted_glob(work_dir, &format!("*{}", PACKAGE_EXT))
}

fn collect_logs(work_dir: &Path, artifact_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for log in sorted_glob(work_dir, "*.log")? {
        copied.push(copy_into(&log, artifact_dir)?);
    }
    Ok(copied)
}
