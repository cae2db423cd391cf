//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a workspace fixture and deterministic in-memory
//! stand-ins for every external tool the pipeline talks to.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_package("foo", "1.2.0", 1, true);
//!     let world = World::new();
//!     world.set_upstream("foo", "1.3.0");
//!     let config = fixture.config(false);
//!     let report = fixture.run(&config, &world);
//! }
//! ```

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assert_fs::prelude::*;

use gh_aur_updater::aur::{AurClient, AurPackage};
use gh_aur_updater::builder::{BuildArtifact, Builder};
use gh_aur_updater::config::{ConfigInputs, RunConfiguration};
use gh_aur_updater::error::{Error, Result};
use gh_aur_updater::git::SyncFile;
use gh_aur_updater::nvchecker::{VersionCheckResult, VersionChecker};
use gh_aur_updater::orchestrator::{run_all, RunReport};
use gh_aur_updater::pipeline::{PackagePipeline, PipelineComponents};
use gh_aur_updater::recipe::RecipeTools;
use gh_aur_updater::registry::RegistryPublisher;
use gh_aur_updater::release::{ReleaseHost, ReleaseRef};
use gh_aur_updater::source_sync::SourceSync;
use gh_aur_updater::srcinfo::PackageMetadata;
use gh_aur_updater::workspace;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    pub use super::{snapshot, srcinfo_text, Commit, TestFixture, World};
}

/// `.SRCINFO` text for a single-package recipe.
pub fn srcinfo_text(name: &str, version: &str, release: u32) -> String {
    format!(
        "pkgbase = {name}\n\tpkgdesc = Test package {name}\n\tpkgver = {version}\n\tpkgrel = {release}\n\tarch = x86_64\n\tlicense = MIT\n\tsource = https://example.com/{name}-{version}.tar.gz\n\tsha256sums = SKIP\n\npkgname = {name}\n"
    )
}

/// `PKGBUILD` text for a single-package recipe.
pub fn recipe_text(name: &str, version: &str, release: u32) -> String {
    format!(
        "# Maintainer: Jane Doe <jane@example.com>\npkgname={name}\npkgver={version}\npkgrel={release}\npkgdesc=\"Test package {name}\"\narch=(x86_64)\nlicense=(MIT)\nsource=(\"https://example.com/$pkgname-$pkgver.tar.gz\")\nsha256sums=('SKIP')\n\npackage() {{\n  install -d \"$pkgdir/usr/share/{name}\"\n}}\n"
    )
}

/// Every file under `root` with its content, for before/after comparisons.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let content = fs::read(entry.path()).expect("Failed to read file");
            (entry.path().to_path_buf(), content)
        })
        .collect()
}

/// A temporary directory holding a recipe workspace and the run
/// directories, kept apart so the workspace can be compared on its own.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a fixture with an empty workspace.
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        temp_dir
            .child("workspace")
            .create_dir_all()
            .expect("Failed to create workspace");
        Self { temp_dir }
    }

    /// Add a recipe directory `<workspace>/<name>` with a `PKGBUILD`, its
    /// `.SRCINFO` and, when `versioned`, a `.nvchecker.toml`.
    pub fn with_package(self, name: &str, version: &str, release: u32, versioned: bool) -> Self {
        let dir = self.temp_dir.child("workspace").child(name);
        dir.child("PKGBUILD")
            .write_str(&recipe_text(name, version, release))
            .expect("Failed to write PKGBUILD");
        dir.child(".SRCINFO")
            .write_str(&srcinfo_text(name, version, release))
            .expect("Failed to write .SRCINFO");
        if versioned {
            dir.child(".nvchecker.toml")
                .write_str(&format!("[{name}]\nsource = \"github\"\ngithub = \"example/{name}\"\n"))
                .expect("Failed to write .nvchecker.toml");
        }
        self
    }

    /// Root of the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn workspace(&self) -> PathBuf {
        self.path().join("workspace")
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.workspace().join(relative)).expect("Failed to read workspace file")
    }

    /// Configuration inputs for this fixture.
    pub fn inputs(&self, dry_run: bool) -> ConfigInputs {
        ConfigInputs {
            github_repository: Some("owner/recipes".to_string()),
            github_token: Some("ghs_test_token".to_string()),
            github_workspace: Some(self.workspace()),
            aur_maintainer_name: Some("Jane Doe".to_string()),
            run_id: Some("4242".to_string()),
            build_base_dir: Some(self.path().join("builds")),
            nvchecker_run_dir: Some(self.path().join("nvchecker")),
            artifacts_dir: Some(self.path().join("artifacts")),
            dry_run,
            ..ConfigInputs::default()
        }
    }

    pub fn config(&self, dry_run: bool) -> RunConfiguration {
        RunConfiguration::resolve(self.inputs(dry_run)).expect("Failed to resolve configuration")
    }

    /// Discover the fixture's recipes and run them through a pipeline over
    /// `world`.
    pub fn run(&self, config: &RunConfiguration, world: &Arc<World>) -> RunReport {
        let excluded = [config.artifacts_dir.clone(), config.build_base_dir.clone()];
        let tasks = workspace::discover(&config.search_root, &config.search_patterns, &excluded)
            .expect("Failed to discover recipes");
        let pipeline = PackagePipeline::with_components(config, world.components());
        run_all(&tasks, &pipeline)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A commit recorded by a fake publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub package: String,
    /// Paths inside the target repository.
    pub files: Vec<PathBuf>,
    pub message: String,
}

/// State shared by every fake adapter: what upstream reports and what the
/// pipeline did to the outside world.
#[derive(Default)]
pub struct World {
    pub upstream: Mutex<HashMap<String, String>>,
    pub failing_builds: Mutex<HashSet<String>>,
    pub failing_releases: Mutex<HashSet<String>>,
    pub failing_srcinfo: Mutex<HashSet<String>>,
    pub failing_source_syncs: Mutex<HashSet<String>>,
    pub failing_registry_pushes: Mutex<HashSet<String>>,
    /// What the AUR reports for the maintainer; `None` makes the lookup fail.
    pub aur: Mutex<Option<Vec<AurPackage>>>,
    pub aur_lookups: Mutex<Vec<String>>,
    pub version_checks: Mutex<Vec<String>>,
    pub checksum_updates: Mutex<Vec<PathBuf>>,
    pub builds: Mutex<Vec<String>>,
    /// Release tag to uploaded asset file names.
    pub releases: Mutex<BTreeMap<String, Vec<String>>>,
    pub release_deletes: Mutex<Vec<String>>,
    /// Tags that exist without a release.
    pub orphan_tags: Mutex<Vec<String>>,
    pub tag_deletes: Mutex<Vec<String>>,
    pub release_creates: Mutex<Vec<String>>,
    pub registry_commits: Mutex<Vec<Commit>>,
    pub source_commits: Mutex<Vec<Commit>>,
}

impl World {
    /// A world where the maintainer has nothing on the AUR yet.
    pub fn new() -> Arc<Self> {
        let world = Self::default();
        *world.aur.lock().unwrap() = Some(Vec::new());
        Arc::new(world)
    }

    /// Pretend `pkgbase` is published on the AUR at `full_version`.
    pub fn publish_on_aur(&self, pkgbase: &str, full_version: &str) {
        self.aur
            .lock()
            .unwrap()
            .get_or_insert_with(Vec::new)
            .push(AurPackage {
                pkgbase: pkgbase.to_string(),
                name: pkgbase.to_string(),
                version: full_version.to_string(),
                maintainer: Some("Jane Doe".to_string()),
                last_modified: None,
            });
    }

    pub fn fail_aur_lookup(&self) {
        *self.aur.lock().unwrap() = None;
    }

    /// Make `.SRCINFO` generation fail for recipes declaring `name`.
    pub fn fail_srcinfo(&self, name: &str) {
        self.failing_srcinfo.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_source_sync(&self, name: &str) {
        self.failing_source_syncs.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_registry_push(&self, name: &str) {
        self.failing_registry_pushes.lock().unwrap().insert(name.to_string());
    }

    /// Pretend a tag exists without a release.
    pub fn seed_orphan_tag(&self, tag: &str) {
        self.orphan_tags.lock().unwrap().push(tag.to_string());
    }

    pub fn set_upstream(&self, name: &str, version: &str) {
        self.upstream
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
    }

    pub fn fail_build(&self, name: &str) {
        self.failing_builds.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_release(&self, name: &str) {
        self.failing_releases.lock().unwrap().insert(name.to_string());
    }

    /// Pretend a release already exists.
    pub fn seed_release(&self, tag: &str) {
        self.releases
            .lock()
            .unwrap()
            .insert(tag.to_string(), vec!["old.pkg.tar.zst".to_string()]);
    }

    pub fn release_tags(&self) -> Vec<String> {
        self.releases.lock().unwrap().keys().cloned().collect()
    }

    /// Number of recorded actions that would have changed something outside
    /// the workspace.
    pub fn side_effects(&self) -> usize {
        self.checksum_updates.lock().unwrap().len()
            + self.builds.lock().unwrap().len()
            + self.release_deletes.lock().unwrap().len()
            + self.tag_deletes.lock().unwrap().len()
            + self.release_creates.lock().unwrap().len()
            + self.registry_commits.lock().unwrap().len()
            + self.source_commits.lock().unwrap().len()
    }

    pub fn components(self: &Arc<Self>) -> PipelineComponents {
        PipelineComponents {
            checker: Box::new(FakeChecker(Arc::clone(self))),
            recipe_tools: Box::new(FakeRecipeTools(Arc::clone(self))),
            builder: Box::new(FakeBuilder(Arc::clone(self))),
            release_host: Box::new(FakeReleaseHost(Arc::clone(self))),
            source_sync: Box::new(FakeSourceSync(Arc::clone(self))),
            registry: Box::new(FakeRegistry(Arc::clone(self))),
            aur: Box::new(FakeAur(Arc::clone(self))),
        }
    }
}

/// Answers from `World::upstream`; unknown packages are a check failure.
pub struct FakeChecker(Arc<World>);

impl VersionChecker for FakeChecker {
    fn check(&self, metadata: &PackageMetadata, _nvchecker_config: &Path) -> Result<VersionCheckResult> {
        self.0.version_checks.lock().unwrap().push(metadata.name.clone());
        let latest = self
            .0
            .upstream
            .lock()
            .unwrap()
            .get(&metadata.name)
            .cloned()
            .ok_or_else(|| Error::VersionCheck {
                package: metadata.name.clone(),
                message: "nvchecker reported no version".to_string(),
            })?;
        Ok(VersionCheckResult::new(
            metadata.name.clone(),
            metadata.version.clone(),
            latest,
        ))
    }
}

/// Generates `.SRCINFO` from the `pkgname`/`pkgver`/`pkgrel` lines of the
/// recipe, the way makepkg would for these simple recipes.
pub struct FakeRecipeTools(Arc<World>);

impl RecipeTools for FakeRecipeTools {
    fn update_checksums(&self, recipe_dir: &Path) -> Result<()> {
        self.0
            .checksum_updates
            .lock()
            .unwrap()
            .push(recipe_dir.to_path_buf());
        Ok(())
    }

    fn print_srcinfo(&self, recipe_dir: &Path) -> Result<String> {
        let recipe = fs::read_to_string(recipe_dir.join("PKGBUILD"))?;
        let value = |key: &str| {
            recipe
                .lines()
                .find_map(|line| line.strip_prefix(key))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        let name = value("pkgname=");
        if self.0.failing_srcinfo.lock().unwrap().contains(&name) {
            return Err(Error::CommandFailed {
                command: "makepkg --printsrcinfo".to_string(),
                status: Some(1),
                stderr: "==> ERROR: PKGBUILD contains a syntax error".to_string(),
            });
        }
        let release = value("pkgrel=").parse().unwrap_or(1);
        Ok(srcinfo_text(&name, &value("pkgver="), release))
    }
}

/// Writes one package archive into the working directory.
pub struct FakeBuilder(Arc<World>);

impl Builder for FakeBuilder {
    fn build(&self, metadata: &PackageMetadata, work_dir: &Path) -> Result<BuildArtifact> {
        if self.0.failing_builds.lock().unwrap().contains(&metadata.name) {
            return Err(Error::Build {
                package: metadata.name.clone(),
                message: "makepkg exited with 4: ==> ERROR: A failure occurred in build().".to_string(),
                log: None,
            });
        }

        self.0
            .builds
            .lock()
            .unwrap()
            .push(format!("{} {}", metadata.name, metadata.full_version()));
        let package = work_dir.join(format!(
            "{}-{}-x86_64.pkg.tar.zst",
            metadata.name,
            metadata.full_version()
        ));
        fs::write(&package, b"package")?;
        Ok(BuildArtifact {
            packages: vec![package],
            logs: Vec::new(),
            artifact_dir: None,
        })
    }
}

/// Release host keeping releases in `World::releases`.
pub struct FakeReleaseHost(Arc<World>);

impl ReleaseHost for FakeReleaseHost {
    fn exists(&self, tag: &str) -> Result<bool> {
        Ok(self.0.releases.lock().unwrap().contains_key(tag))
    }

    fn delete(&self, tag: &str) -> Result<()> {
        self.0.release_deletes.lock().unwrap().push(tag.to_string());
        self.0.releases.lock().unwrap().remove(tag);
        Ok(())
    }

    fn delete_tag(&self, tag: &str) -> Result<()> {
        let mut orphans = self.0.orphan_tags.lock().unwrap();
        if !orphans.iter().any(|t| t == tag) {
            return Err(Error::CommandFailed {
                command: format!("gh api -X DELETE repos/owner/recipes/git/refs/tags/{}", tag),
                status: Some(1),
                stderr: "HTTP 422: Reference does not exist".to_string(),
            });
        }
        orphans.retain(|t| t != tag);
        self.0.tag_deletes.lock().unwrap().push(tag.to_string());
        Ok(())
    }

    fn create(&self, tag: &str, _title: &str, _notes: &str, assets: &[PathBuf]) -> Result<ReleaseRef> {
        let failing = self.0.failing_releases.lock().unwrap().iter().any(|name| tag.starts_with(name.as_str()));
        if failing {
            return Err(Error::CommandFailed {
                command: format!("gh release create {}", tag),
                status: Some(1),
                stderr: "HTTP 422: Validation Failed".to_string(),
            });
        }

        self.0.release_creates.lock().unwrap().push(tag.to_string());
        let names = assets
            .iter()
            .filter_map(|a| a.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        self.0.releases.lock().unwrap().insert(tag.to_string(), names);
        Ok(ReleaseRef {
            tag: tag.to_string(),
            url: Some(format!("https://github.com/owner/recipes/releases/tag/{}", tag)),
        })
    }
}

/// Records source repository commits.
pub struct FakeSourceSync(Arc<World>);

impl SourceSync for FakeSourceSync {
    fn sync(&self, name: &str, files: &[SyncFile], message: &str) -> Result<Option<String>> {
        if self.0.failing_source_syncs.lock().unwrap().contains(name) {
            return Err(Error::SourceSync {
                package: name.to_string(),
                message: "git push failed: ! [rejected] main -> main (fetch first)".to_string(),
            });
        }
        let mut commits = self.0.source_commits.lock().unwrap();
        commits.push(Commit {
            package: name.to_string(),
            files: files.iter().map(|f| f.repo_path.clone()).collect(),
            message: message.to_string(),
        });
        Ok(Some(format!("{:040x}", commits.len())))
    }
}

/// Records registry commits.
pub struct FakeRegistry(Arc<World>);

impl RegistryPublisher for FakeRegistry {
    fn push(&self, name: &str, files: &[PathBuf], message: &str) -> Result<Option<String>> {
        if self.0.failing_registry_pushes.lock().unwrap().contains(name) {
            return Err(Error::RegistryPush {
                package: name.to_string(),
                message: "Permission denied (publickey)".to_string(),
            });
        }
        let mut commits = self.0.registry_commits.lock().unwrap();
        commits.push(Commit {
            package: name.to_string(),
            files: files
                .iter()
                .filter_map(|f| f.file_name())
                .map(PathBuf::from)
                .collect(),
            message: message.to_string(),
        });
        Ok(Some(format!("{:040x}", commits.len())))
    }
}

/// Answers from `World::aur` and records each lookup.
pub struct FakeAur(Arc<World>);

impl AurClient for FakeAur {
    fn maintained_packages(&self, maintainer: &str) -> Result<Vec<AurPackage>> {
        self.0.aur_lookups.lock().unwrap().push(maintainer.to_string());
        self.0.aur.lock().unwrap().clone().ok_or_else(|| Error::AurLookup {
            maintainer: maintainer.to_string(),
            message: "HTTP status server error (503 Service Unavailable)".to_string(),
        })
    }
}
