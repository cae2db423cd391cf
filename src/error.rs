//! # Error Handling
//!
//! This module defines the centralized error type for `gh-aur-updater`. It
//! uses `thiserror` to build a single `Error` enum whose variants carry the
//! context needed to diagnose a failure in CI logs (package name, command
//! line, captured stderr, log file).
//!
//! ## Taxonomy
//!
//! Every variant maps onto one [`ErrorKind`] through [`Error::kind`]. The
//! kinds mirror the stages an update can fail in:
//!
//! - `VersionCheckError` - nvchecker could not be run or its output was not
//!   understood, or the AUR could not be queried.
//! - `RecipeMutationError` - the PKGBUILD was malformed, or checksum /
//!   `.SRCINFO` regeneration failed.
//! - `BuildError` - makepkg failed or produced nothing.
//! - `RegistryPushError` - cloning, committing or pushing to the AUR failed.
//! - `ReleasePublishError` - the GitHub release could not be created.
//! - `SourceSyncError` - updated recipe files could not be pushed back to the
//!   source repository.
//! - `UnexpectedError` - anything else (I/O, serialization, ...).
//!
//! The package pipeline never lets an `Error` escape: it converts it into a
//! failed outcome tagged with the stage and the kind.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for gh-aur-updater operations
#[derive(Error, Debug)]
pub enum Error {
    /// nvchecker failed to run or reported no usable version.
    #[error("Version check failed for {package}: {message}")]
    VersionCheck { package: String, message: String },

    /// The AUR could not be queried for the maintainer's packages.
    #[error("AUR lookup failed for maintainer {maintainer}: {message}")]
    AurLookup { maintainer: String, message: String },

    /// The recipe could not be rewritten, or regeneration after the rewrite
    /// failed.
    #[error("Recipe mutation failed for {}: {message}", path.display())]
    RecipeMutation { path: PathBuf, message: String },

    /// The `.SRCINFO` block could not be parsed into package metadata.
    #[error("Invalid .SRCINFO for {}: {message}", path.display())]
    Srcinfo { path: PathBuf, message: String },

    /// makepkg failed. `log` points at the retained build log when one was
    /// captured.
    #[error("Build failed for {package}: {message}{}", log.as_ref().map(|l| format!(" (log: {})", l.display())).unwrap_or_default())]
    Build {
        package: String,
        message: String,
        log: Option<PathBuf>,
    },

    /// Cloning, committing or pushing the AUR repository failed.
    #[error("Registry push failed for {package}: {message}")]
    RegistryPush { package: String, message: String },

    /// Creating the hosting-service release failed.
    #[error("Release publish failed for tag {tag}: {message}")]
    ReleasePublish { tag: String, message: String },

    /// Pushing recipe files back to the source repository failed.
    #[error("Source sync failed for {package}: {message}")]
    SourceSync { package: String, message: String },

    /// An external command could not be started at all.
    #[error("Failed to start `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// An external command ran but exited unsuccessfully.
    #[error("Command `{command}` failed with {}: {stderr}", status.map(|s| format!("exit code {}", s)).unwrap_or_else(|| "a signal".to_string()))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A required configuration variable was not provided.
    #[error("Missing required environment variable {name}")]
    MissingVariable { name: String },

    /// Invalid run configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A failure that fits no other category.
    #[error("Unexpected error: {message}")]
    Unexpected { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML serialization error, wrapped from `toml::ser::Error`.
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

/// The error categories an update can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    VersionCheck,
    RecipeMutation,
    Build,
    RegistryPush,
    ReleasePublish,
    SourceSync,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::VersionCheck => "VersionCheckError",
            ErrorKind::RecipeMutation => "RecipeMutationError",
            ErrorKind::Build => "BuildError",
            ErrorKind::RegistryPush => "RegistryPushError",
            ErrorKind::ReleasePublish => "ReleasePublishError",
            ErrorKind::SourceSync => "SourceSyncError",
            ErrorKind::Unexpected => "UnexpectedError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error into the update taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::VersionCheck { .. } | Error::AurLookup { .. } => ErrorKind::VersionCheck,
            Error::RecipeMutation { .. } | Error::Srcinfo { .. } => ErrorKind::RecipeMutation,
            Error::Build { .. } => ErrorKind::Build,
            Error::RegistryPush { .. } => ErrorKind::RegistryPush,
            Error::ReleasePublish { .. } => ErrorKind::ReleasePublish,
            Error::SourceSync { .. } => ErrorKind::SourceSync,
            Error::CommandSpawn { .. }
            | Error::CommandFailed { .. }
            | Error::MissingVariable { .. }
            | Error::Config { .. }
            | Error::Unexpected { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::Toml(_)
            | Error::Regex(_)
            | Error::Glob(_) => ErrorKind::Unexpected,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
