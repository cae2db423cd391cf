//! # Package Pipeline
//!
//! Drives one recipe through the update stages:
//!
//! ```text
//! DISCOVER_METADATA -> CHECK_VERSION -> (no update: Skipped)
//!                                    -> (no update, AUR behind: BUILD)
//!                   -> MUTATE_RECIPE -> REGENERATE_METADATA -> BUILD
//!                   -> PUBLISH_RELEASE -> SYNC_SOURCE -> PUSH_REGISTRY -> Updated
//! ```
//!
//! A recipe with no upstream update is still published when the AUR carries
//! an older version of it, which happens when an earlier run failed after
//! updating the recipe. The recipe is then built as it is, skipping
//! MUTATE_RECIPE and REGENERATE_METADATA. The maintainer's AUR packages are
//! looked up once, the first time a package needs them; if the lookup fails
//! the recipes alone decide.
//!
//! Any stage error ends the package with [`PipelineOutcome::Failed`] tagged
//! with the stage and the error kind. Nothing escapes [`PackagePipeline::run`],
//! so one broken package never stops the others. Completed side effects are
//! not rolled back.
//!
//! ## Dry run
//!
//! Every stage still runs, but each side effect is replaced by a
//! `[DRY RUN]` log line. The version check and the recipe read are real; the
//! post-mutation metadata is synthesized in memory and the build artifact is
//! empty.
//!
//! ## Working directories
//!
//! A package that is going to be updated gets a fresh
//! `<build_base_dir>/<name>/`, holding `build/` (the copy makepkg runs in),
//! `registry/` and `source/` (the git clones). It is left in place after the
//! run.

use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use log::{debug, error, info, warn};

use crate::aur::{AurClient, AurRpcClient, PublishedVersions};
use crate::builder::{BuildArtifact, Builder, MakepkgBuilder};
use crate::config::RunConfiguration;
use crate::error::{Error, Result};
use crate::git::{self, SyncFile};
use crate::logging::{dry_run, LogGroup};
use crate::nvchecker::{NvChecker, VersionChecker, KEYFILE_NAME};
use crate::process::{CommandRunner, SystemCommandRunner};
use crate::recipe::{MakepkgTools, RecipeChange, RecipeMutator, RecipeTools, RECIPE_FILE};
use crate::registry::{registry_files, AurRegistry, RegistryPublisher};
use crate::release::{release_notes, release_tag, release_title, GhReleaseHost, ReleaseHost, ReleasePublisher};
use crate::source_sync::{GitSourceSync, SourceSync};
use crate::srcinfo::{PackageMetadata, SRCINFO_FILE};
use crate::workspace::PackageTask;

pub mod outcome;

pub use outcome::{PackageResult, PipelineOutcome, SkipReason, Stage};

/// Subdirectory of a package's working directory makepkg runs in.
pub const BUILD_DIR_NAME: &str = "build";

/// The adapters a pipeline talks to.
pub struct PipelineComponents {
    pub checker: Box<dyn VersionChecker>,
    pub recipe_tools: Box<dyn RecipeTools>,
    pub builder: Box<dyn Builder>,
    pub release_host: Box<dyn ReleaseHost>,
    pub source_sync: Box<dyn SourceSync>,
    pub registry: Box<dyn RegistryPublisher>,
    pub aur: Box<dyn AurClient>,
}

impl PipelineComponents {
    /// Adapters backed by the real tools (`nvchecker`, `makepkg`, `gh`,
    /// `git`) and the AUR RPC interface.
    pub fn system(config: &RunConfiguration) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner);
        let keyfile = config
            .secret_ghuk_value
            .as_ref()
            .map(|_| config.nvchecker_run_dir.join(KEYFILE_NAME));

        Ok(Self {
            checker: Box::new(NvChecker::new(
                Arc::clone(&runner),
                config.nvchecker_run_dir.clone(),
                keyfile,
            )),
            recipe_tools: Box::new(MakepkgTools::new(Arc::clone(&runner), config.builder_user.clone())),
            builder: Box::new(MakepkgBuilder::new(
                Arc::clone(&runner),
                config.artifacts_dir.clone(),
                config.builder_user.clone(),
            )),
            release_host: Box::new(GhReleaseHost::new(
                Arc::clone(&runner),
                config.github_repository.as_str(),
                config.github_token.as_str(),
            )),
            source_sync: Box::new(GitSourceSync::new(
                Arc::clone(&runner),
                config.source_remote_url(),
                config.secrets(),
                config.build_base_dir.clone(),
                config.source_identity.clone(),
            )),
            registry: Box::new(AurRegistry::new(
                runner,
                config.aur_remote_base.as_str(),
                config.build_base_dir.clone(),
                config.aur_identity.clone(),
            )),
            aur: Box::new(AurRpcClient::new(&config.aur_rpc_url)?),
        })
    }
}

/// An error together with the stage it ended the package in.
struct StageError {
    stage: Stage,
    error: Error,
}

type StageResult<T> = std::result::Result<T, StageError>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> StageResult<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> StageResult<T> {
        self.map_err(|error| StageError { stage, error })
    }
}

/// What has been learned and done so far for one package.
struct Progress {
    package: String,
    old_version: Option<String>,
    new_version: Option<String>,
    actions: Vec<String>,
}

impl Progress {
    fn new(name_hint: &str) -> Self {
        Self {
            package: name_hint.to_string(),
            old_version: None,
            new_version: None,
            actions: Vec::new(),
        }
    }

    fn finish(self, outcome: PipelineOutcome) -> PackageResult {
        PackageResult {
            package: self.package,
            old_version: self.old_version,
            new_version: self.new_version,
            actions: self.actions,
            outcome,
        }
    }
}

/// Runs the update stages for one package at a time.
pub struct PackagePipeline<'a> {
    config: &'a RunConfiguration,
    checker: Box<dyn VersionChecker>,
    mutator: RecipeMutator,
    builder: Box<dyn Builder>,
    releases: ReleasePublisher,
    source_sync: Box<dyn SourceSync>,
    registry: Box<dyn RegistryPublisher>,
    aur: Box<dyn AurClient>,
    published: OnceLock<Option<PublishedVersions>>,
}

impl<'a> PackagePipeline<'a> {
    /// Pipeline over the real tools.
    pub fn new(config: &'a RunConfiguration) -> Result<Self> {
        Ok(Self::with_components(config, PipelineComponents::system(config)?))
    }

    pub fn with_components(config: &'a RunConfiguration, components: PipelineComponents) -> Self {
        Self {
            config,
            checker: components.checker,
            mutator: RecipeMutator::new(components.recipe_tools),
            builder: components.builder,
            releases: ReleasePublisher::new(components.release_host),
            source_sync: components.source_sync,
            registry: components.registry,
            aur: components.aur,
            published: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &RunConfiguration {
        self.config
    }

    /// The maintainer's published AUR versions, looked up on first use.
    fn published(&self) -> Option<&PublishedVersions> {
        self.published
            .get_or_init(|| {
                match PublishedVersions::fetch(self.aur.as_ref(), &self.config.aur_maintainer_name) {
                    Ok(published) => Some(published),
                    Err(e) => {
                        warn!("{}; comparing against the recipes only", e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Whether the AUR carries an older version of `current` than the
    /// recipe does.
    fn aur_lags_behind(&self, current: &PackageMetadata) -> bool {
        let Some(published) = self.published() else {
            return false;
        };
        let full_version = current.full_version();
        match published.version_of(&current.name) {
            Some(version) if published.lags_behind(&current.name, &full_version) => {
                info!(
                    "{}: AUR has {}, recipe has {}; publishing the recipe as it is",
                    current.name, version, full_version
                );
                true
            }
            Some(version) => {
                debug!("{}: AUR has {}", current.name, version);
                false
            }
            None => {
                debug!("{} is not on the AUR", current.name);
                false
            }
        }
    }

    /// Run every stage for `task`. Never fails: errors become
    /// [`PipelineOutcome::Failed`].
    pub fn run(&self, task: &PackageTask) -> PackageResult {
        let _group = LogGroup::start(&task.name_hint);
        let mut progress = Progress::new(&task.name_hint);

        let outcome = match self.drive(task, &mut progress) {
            Ok(outcome) => outcome,
            Err(StageError { stage, error }) => {
                let kind = error.kind();
                error!("{} failed at {} ({}): {}", progress.package, stage, kind, error);
                PipelineOutcome::Failed {
                    stage,
                    kind,
                    message: error.to_string(),
                }
            }
        };

        match &outcome {
            PipelineOutcome::Skipped(reason) => info!("{} skipped: {}", progress.package, reason),
            PipelineOutcome::Updated => info!(
                "{} updated to {}",
                progress.package,
                progress.new_version.as_deref().unwrap_or("?")
            ),
            PipelineOutcome::Failed { .. } => {}
        }

        progress.finish(outcome)
    }

    fn drive(&self, task: &PackageTask, progress: &mut Progress) -> StageResult<PipelineOutcome> {
        let config = self.config;
        let dry_run = config.dry_run;
        let recipe_dir = task.recipe_dir();

        let current = self.mutator.describe(recipe_dir).at(Stage::DiscoverMetadata)?;
        progress.package = current.name.clone();
        progress.old_version = Some(current.full_version());
        info!(
            "{} {} ({})",
            current.name,
            current.full_version(),
            task.recipe_path.display()
        );

        // `None` publishes the recipe unchanged.
        let change = if config.wants_release_bump(&current.name) {
            info!("Release-only rebuild requested for {}", current.name);
            Some(RecipeChange::BumpRelease)
        } else {
            let Some(nvchecker_config) = &task.nvchecker_config else {
                return Ok(PipelineOutcome::Skipped(SkipReason::NoVersionSource));
            };
            let check = self
                .checker
                .check(&current, nvchecker_config)
                .at(Stage::CheckVersion)?;
            if check.has_update {
                info!(
                    "{}: {} -> {}",
                    current.name, check.current_version, check.latest_version
                );
                Some(RecipeChange::SetVersion(check.latest_version))
            } else if self.aur_lags_behind(&current) {
                None
            } else {
                return Ok(PipelineOutcome::Skipped(SkipReason::UpToDate));
            }
        };

        let package_dir = config.build_base_dir.join(&current.name);
        let updated = match change {
            Some(change) => self.update_recipe(task, &current, &change, &package_dir, progress)?,
            None => {
                if dry_run {
                    dry_run!(
                        "Would publish {} {} without changing the recipe",
                        current.name,
                        current.full_version()
                    );
                } else {
                    reset_dir(&package_dir).at(Stage::Build)?;
                    progress
                        .actions
                        .push(format!("republishing {}", current.full_version()));
                }
                current
            }
        };
        let full_version = updated.full_version();
        progress.new_version = Some(full_version.clone());

        let work_dir = package_dir.join(BUILD_DIR_NAME);
        let artifact = if dry_run {
            dry_run!("Would build {} {} in {}", updated.name, full_version, work_dir.display());
            BuildArtifact::empty()
        } else {
            git::copy_tree(recipe_dir, &work_dir).at(Stage::Build)?;
            let artifact = self.builder.build(&updated, &work_dir).at(Stage::Build)?;
            progress
                .actions
                .push(format!("built {} package(s)", artifact.packages.len()));
            artifact
        };

        if dry_run {
            dry_run!(
                "Would replace release {} on {}",
                release_tag(&updated.name, &updated.version),
                config.github_repository
            );
        } else {
            let release = self
                .releases
                .replace(
                    &updated.name,
                    &updated.version,
                    &release_title(&updated),
                    &release_notes(&updated, &config.run_id),
                    &artifact.packages,
                )
                .at(Stage::PublishRelease)?;
            progress.actions.push(format!("released {}", release.tag));
        }

        let files = source_files(&config.workspace, recipe_dir).at(Stage::SyncSource)?;
        let message = config.source_commit_message(&updated.name, &full_version);
        if dry_run {
            dry_run!(
                "Would commit {} file(s) to {}: {}",
                files.len(),
                config.github_repository,
                message
            );
        } else {
            match self
                .source_sync
                .sync(&updated.name, &files, &message)
                .at(Stage::SyncSource)?
            {
                Some(commit) => progress.actions.push(format!("source commit {}", short(&commit))),
                None => info!("Source repository already has these files"),
            }
        }

        let files = registry_files(recipe_dir, &updated);
        let message = config.registry_commit_message(&updated.name, &full_version);
        if dry_run {
            dry_run!(
                "Would push {} file(s) to the registry repository of {}: {}",
                files.len(),
                updated.name,
                message
            );
        } else {
            match self
                .registry
                .push(&updated.name, &files, &message)
                .at(Stage::PushRegistry)?
            {
                Some(commit) => progress.actions.push(format!("registry commit {}", short(&commit))),
                None => info!("Registry already has these files"),
            }
        }

        Ok(PipelineOutcome::Updated)
    }

    /// MUTATE_RECIPE and REGENERATE_METADATA: apply `change` to the recipe
    /// and return the metadata it now declares.
    fn update_recipe(
        &self,
        task: &PackageTask,
        current: &PackageMetadata,
        change: &RecipeChange,
        package_dir: &Path,
        progress: &mut Progress,
    ) -> StageResult<PackageMetadata> {
        let recipe_dir = task.recipe_dir();

        if self.config.dry_run {
            let target = self
                .mutator
                .preview(&task.recipe_path, change)
                .at(Stage::MutateRecipe)?;
            dry_run!(
                "Would set pkgver={} pkgrel={} in {}",
                target.version,
                target.release,
                task.recipe_path.display()
            );
            dry_run!(
                "Would regenerate checksums and {} in {}",
                SRCINFO_FILE,
                recipe_dir.display()
            );
            return Ok(current.with_version(&target.version, target.release));
        }

        reset_dir(package_dir).at(Stage::MutateRecipe)?;
        let target = self
            .mutator
            .rewrite(&task.recipe_path, change)
            .at(Stage::MutateRecipe)?;
        let updated = self
            .mutator
            .regenerate(recipe_dir, &target)
            .at(Stage::RegenerateMetadata)?;
        progress
            .actions
            .push(format!("recipe updated to {}", updated.full_version()));
        Ok(updated)
    }
}

/// The recipe and its `.SRCINFO`, addressed relative to the workspace root.
fn source_files(workspace: &Path, recipe_dir: &Path) -> Result<Vec<SyncFile>> {
    let mut files = Vec::with_capacity(2);
    for name in [RECIPE_FILE, SRCINFO_FILE] {
        let local = recipe_dir.join(name);
        let repo_path = local
            .strip_prefix(workspace)
            .map_err(|_| Error::Unexpected {
                message: format!(
                    "{} is outside the workspace {}",
                    local.display(),
                    workspace.display()
                ),
            })?
            .to_path_buf();
        files.push(SyncFile::new(local, repo_path));
    }
    Ok(files)
}

fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

fn short(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}
