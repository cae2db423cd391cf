//! # Release Publishing
//!
//! Every successful build is published as a release on the hosting service,
//! tagged `<name>-<pkgver>`. A rebuild of the same version replaces the
//! previous release: any existing release and its tag are deleted first, so
//! at most one release exists per `(name, version)`. A tag left without a
//! release (an earlier run stopped between tagging and uploading) is deleted
//! too; otherwise the new release would silently reuse it and point at the
//! old commit.
//!
//! The hosting service is reached through [`ReleaseHost`]; [`GhReleaseHost`]
//! drives the `gh` CLI.

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::srcinfo::PackageMetadata;

/// Tag for the release of `name` at `version`.
pub fn release_tag(name: &str, version: &str) -> String {
    format!("{}-{}", name, version)
}

/// Human-readable release title.
pub fn release_title(metadata: &PackageMetadata) -> String {
    format!("{} {}", metadata.name, metadata.full_version())
}

/// Release body.
pub fn release_notes(metadata: &PackageMetadata, run_id: &str) -> String {
    format!(
        "Automated release for {} version {}.\n\nBuilt by CI run {}.",
        metadata.name,
        metadata.full_version(),
        run_id
    )
}

/// A release that was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRef {
    pub tag: String,
    /// Location reported by the hosting service, when it reports one.
    pub url: Option<String>,
}

/// Release operations on the hosting service - allows mocking in tests
pub trait ReleaseHost: Send + Sync {
    /// Whether a release tagged `tag` exists.
    fn exists(&self, tag: &str) -> Result<bool>;

    /// Delete the release tagged `tag` together with the tag itself.
    fn delete(&self, tag: &str) -> Result<()>;

    /// Delete the git tag `tag` on its own. Fails when there is no such tag.
    fn delete_tag(&self, tag: &str) -> Result<()>;

    /// Create a release and upload `assets` to it.
    fn create(&self, tag: &str, title: &str, notes: &str, assets: &[PathBuf]) -> Result<ReleaseRef>;
}

/// [`ReleaseHost`] backed by the `gh` CLI.
pub struct GhReleaseHost {
    runner: Arc<dyn CommandRunner>,
    repository: String,
    token: String,
}

impl GhReleaseHost {
    /// `repository` is `owner/name`. `token` is handed to `gh` through
    /// `GH_TOKEN` for the child process only.
    pub fn new(runner: Arc<dyn CommandRunner>, repository: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            runner,
            repository: repository.into(),
            token: token.into(),
        }
    }

    fn gh(&self) -> CommandSpec {
        CommandSpec::new("gh")
            .env("GH_TOKEN", self.token.as_str())
            .secret(self.token.as_str())
    }
}

impl ReleaseHost for GhReleaseHost {
    fn exists(&self, tag: &str) -> Result<bool> {
        let spec = self
            .gh()
            .args(["release", "view", tag, "-R", self.repository.as_str()])
            .args(["--json", "tagName"]);
        let output = self.runner.run(&spec)?;
        if output.success() {
            return Ok(true);
        }
        if output.stderr.contains("release not found") || output.stderr.contains("Not Found") {
            return Ok(false);
        }
        // Anything else (auth, network) is a real failure.
        output.check().map(|_| false)
    }

    fn delete(&self, tag: &str) -> Result<()> {
        let spec = self.gh().args([
            "release",
            "delete",
            tag,
            "--cleanup-tag",
            "--yes",
            "-R",
            self.repository.as_str(),
        ]);
        self.runner.run_checked(&spec)?;
        Ok(())
    }

    fn delete_tag(&self, tag: &str) -> Result<()> {
        let reference = format!("repos/{}/git/refs/tags/{}", self.repository, tag);
        let spec = self.gh().args(["api", "-X", "DELETE", reference.as_str()]);
        self.runner.run_checked(&spec)?;
        Ok(())
    }

    fn create(&self, tag: &str, title: &str, notes: &str, assets: &[PathBuf]) -> Result<ReleaseRef> {
        let spec = self
            .gh()
            .args(["release", "create", tag])
            .args(assets.iter().map(|a| a.as_os_str().to_os_string()))
            .args(["--title", title, "--notes", notes, "-R", self.repository.as_str()]);
        let output = self.runner.run_checked(&spec)?;
        let url = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|l| l.starts_with("https://"))
            .map(str::to_string);
        Ok(ReleaseRef {
            tag: tag.to_string(),
            url,
        })
    }
}

/// Publishes releases with replace semantics.
pub struct ReleasePublisher {
    host: Box<dyn ReleaseHost>,
}

impl ReleasePublisher {
    pub fn new(host: Box<dyn ReleaseHost>) -> Self {
        Self { host }
    }

    /// Create the release for `(name, version)`, deleting any existing one
    /// first.
    ///
    /// When no release exists, a stale tag of the same name is deleted. The
    /// hosting service would otherwise attach the new release to it.
    ///
    /// Failures while looking up or deleting the old release or tag are
    /// logged and ignored; a failure to create the new one is a
    /// [`Error::ReleasePublish`].
    pub fn replace(
        &self,
        name: &str,
        version: &str,
        title: &str,
        notes: &str,
        assets: &[PathBuf],
    ) -> Result<ReleaseRef> {
        let tag = release_tag(name, version);

        match self.host.exists(&tag) {
            Ok(true) => {
                info!("Release {} already exists; replacing it", tag);
                if let Err(e) = self.host.delete(&tag) {
                    warn!("Could not delete existing release {}: {}", tag, e);
                }
            }
            Ok(false) => {
                debug!("No existing release {}", tag);
                match self.host.delete_tag(&tag) {
                    Ok(()) => info!("Deleted stale tag {} left without a release", tag),
                    Err(e) => debug!("No stale tag {} to delete: {}", tag, e),
                }
            }
            Err(e) => {
                warn!("Could not look up release {}: {}; attempting delete anyway", tag, e);
                if let Err(e) = self.host.delete(&tag) {
                    warn!("Could not delete existing release {}: {}", tag, e);
                }
            }
        }

        let created = self
            .host
            .create(&tag, title, notes, assets)
            .map_err(|e| Error::ReleasePublish {
                tag: tag.clone(),
                message: e.to_string(),
            })?;

        info!(
            "Created release {}{}",
            created.tag,
            created.url.as_deref().map(|u| format!(" ({})", u)).unwrap_or_default()
        );
        Ok(created)
    }
}
