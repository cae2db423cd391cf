//! # AUR Registry Publishing
//!
//! Each AUR package is its own git repository at
//! `<remote base>/<pkgbase>.git`, holding the `PKGBUILD`, the `.SRCINFO` and
//! any local files the recipe ships. Publishing means cloning that
//! repository, overwriting those files, and pushing a commit to `master`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::error::{Error, Result};
use crate::git::{publish_files, GitIdentity, PublishRequest, SyncFile};
use crate::process::CommandRunner;
use crate::recipe::RECIPE_FILE;
use crate::srcinfo::{PackageMetadata, SRCINFO_FILE};

/// Branch every AUR repository publishes from.
const AUR_BRANCH: &str = "master";

/// Pushes recipes to the package registry - allows mocking in tests
pub trait RegistryPublisher: Send + Sync {
    /// Commit `files` (placed at the repository root by file name) to the
    /// registry repository of `name` and push.
    ///
    /// Returns the pushed commit, or `None` when nothing changed.
    fn push(&self, name: &str, files: &[PathBuf], message: &str) -> Result<Option<String>>;
}

/// The files the registry needs for a recipe in `recipe_dir`.
///
/// Local sources the metadata declares but which are missing on disk are
/// skipped with a warning; makepkg would have failed on them already.
pub fn registry_files(recipe_dir: &Path, metadata: &PackageMetadata) -> Vec<PathBuf> {
    let mut files = vec![recipe_dir.join(RECIPE_FILE), recipe_dir.join(SRCINFO_FILE)];
    for name in metadata.local_files() {
        let path = recipe_dir.join(&name);
        if path.is_file() {
            files.push(path);
        } else {
            warn!(
                "Local file '{}' of {} not found in {}",
                name,
                metadata.name,
                recipe_dir.display()
            );
        }
    }
    files
}

/// [`RegistryPublisher`] for the AUR git remote.
pub struct AurRegistry {
    runner: Arc<dyn CommandRunner>,
    remote_base: String,
    build_base_dir: PathBuf,
    identity: GitIdentity,
}

impl AurRegistry {
    /// Clones land in `<build_base_dir>/<name>/registry`.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        remote_base: impl Into<String>,
        build_base_dir: PathBuf,
        identity: GitIdentity,
    ) -> Self {
        Self {
            runner,
            remote_base: remote_base.into(),
            build_base_dir,
            identity,
        }
    }

    /// Remote URL of the registry repository for `name`.
    pub fn remote_url(&self, name: &str) -> String {
        format!("{}/{}.git", self.remote_base.trim_end_matches('/'), name)
    }
}

impl RegistryPublisher for AurRegistry {
    fn push(&self, name: &str, files: &[PathBuf], message: &str) -> Result<Option<String>> {
        let fail = |message: String| Error::RegistryPush {
            package: name.to_string(),
            message,
        };

        let mut sync_files = Vec::with_capacity(files.len());
        for file in files {
            let file_name = file
                .file_name()
                .ok_or_else(|| fail(format!("{} has no file name", file.display())))?;
            sync_files.push(SyncFile::new(file, file_name));
        }

        let url = self.remote_url(name);
        let clone_dir = self.build_base_dir.join(name).join("registry");
        let request = PublishRequest {
            url: &url,
            clone_dir: &clone_dir,
            depth: None,
            secrets: &[],
            identity: &self.identity,
            files: &sync_files,
            message,
            branch: Some(AUR_BRANCH),
        };

        publish_files(self.runner.as_ref(), &request).map_err(|e| fail(e.to_string()))
    }
}
