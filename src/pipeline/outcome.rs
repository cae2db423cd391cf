//! Result types of a package pipeline run.

use std::fmt;

use crate::error::ErrorKind;

/// The stages a package walks through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    DiscoverMetadata,
    CheckVersion,
    MutateRecipe,
    RegenerateMetadata,
    Build,
    PublishRelease,
    SyncSource,
    PushRegistry,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::DiscoverMetadata => "DISCOVER_METADATA",
            Stage::CheckVersion => "CHECK_VERSION",
            Stage::MutateRecipe => "MUTATE_RECIPE",
            Stage::RegenerateMetadata => "REGENERATE_METADATA",
            Stage::Build => "BUILD",
            Stage::PublishRelease => "PUBLISH_RELEASE",
            Stage::SyncSource => "SYNC_SOURCE",
            Stage::PushRegistry => "PUSH_REGISTRY",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a package needed no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Upstream reports the version the recipe already declares.
    UpToDate,
    /// The recipe has no `.nvchecker.toml` and no rebuild was requested.
    NoVersionSource,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpToDate => f.write_str("up to date"),
            SkipReason::NoVersionSource => f.write_str("no version source"),
        }
    }
}

/// Terminal state of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Skipped(SkipReason),
    /// Updated and published.
    Updated,
    Failed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
}

impl PipelineOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PipelineOutcome::Failed { .. })
    }
}

/// Everything the run summary reports about one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageResult {
    /// Package name, or the recipe directory name when the metadata could
    /// not be read.
    pub package: String,
    /// `[epoch:]pkgver-pkgrel` before the run.
    pub old_version: Option<String>,
    /// `[epoch:]pkgver-pkgrel` after the recipe was mutated.
    pub new_version: Option<String>,
    /// Human-readable side effects, in the order they happened.
    pub actions: Vec<String>,
    pub outcome: PipelineOutcome,
}
