//! # Run Configuration
//!
//! A run is configured entirely through environment variables (each also
//! accepted as a CLI flag, see `cli`). The raw values are collected into
//! [`ConfigInputs`] and resolved once into an immutable
//! [`RunConfiguration`]: defaults are derived, paths are anchored, and the
//! workspace is validated before any package is touched.
//!
//! ## Derived defaults
//!
//! - AUR commit identity: `AUR_GIT_USER_NAME` falls back to the maintainer
//!   name; the email to `<name-slug>@users.noreply.github.com`.
//! - Source commit identity: `<actor> (via CI)` and
//!   `<actor without [bot]>@users.noreply.github.com`.
//! - Directories: build base and nvchecker run dir under `$HOME`, artifacts
//!   under the workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::defaults;
use crate::error::{Error, Result};
use crate::git::GitIdentity;
use crate::source_sync::token_remote_url;

/// Raw, unresolved configuration values.
///
/// Empty strings count as unset.
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    pub github_repository: Option<String>,
    pub github_token: Option<String>,
    pub github_workspace: Option<PathBuf>,
    pub aur_maintainer_name: Option<String>,
    pub run_id: Option<String>,
    pub actor: Option<String>,
    pub aur_git_user_name: Option<String>,
    pub aur_git_user_email: Option<String>,
    pub source_git_user_name: Option<String>,
    pub source_git_user_email: Option<String>,
    pub build_base_dir: Option<PathBuf>,
    pub nvchecker_run_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub search_root_suffix: Option<String>,
    pub search_patterns: Option<String>,
    pub commit_message_prefix: Option<String>,
    pub release_bump_packages: Option<String>,
    pub aur_remote_base: Option<String>,
    pub aur_rpc_url: Option<String>,
    pub source_repo_url: Option<String>,
    pub builder_user: Option<String>,
    pub secret_ghuk_value: Option<String>,
    pub debug: bool,
    pub dry_run: bool,
    pub github_actions: bool,
}

/// Immutable snapshot of every run parameter.
#[derive(Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    /// `owner/name` of the source repository.
    pub github_repository: String,
    pub github_token: String,
    pub workspace: PathBuf,
    pub run_id: String,
    pub actor: String,
    pub aur_maintainer_name: String,
    pub aur_identity: GitIdentity,
    pub source_identity: GitIdentity,
    pub build_base_dir: PathBuf,
    pub nvchecker_run_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    /// Directory recipes are searched under.
    pub search_root: PathBuf,
    /// Glob patterns relative to `search_root`.
    pub search_patterns: Vec<String>,
    pub commit_message_prefix: String,
    /// Packages to rebuild with a bumped `pkgrel` even without a new version.
    pub release_bump_packages: Vec<String>,
    pub aur_remote_base: String,
    /// AUR RPC endpoint queried for the maintainer's published packages.
    pub aur_rpc_url: String,
    pub source_repo_url: Option<String>,
    pub builder_user: Option<String>,
    /// Token for nvchecker's keyfile.
    pub secret_ghuk_value: Option<String>,
    pub debug: bool,
    pub dry_run: bool,
    /// Log in GitHub Actions workflow-command format.
    pub github_actions: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| Error::MissingVariable {
        name: name.to_string(),
    })
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `Jane Doe` becomes `jane-doe`.
fn slug(name: &str) -> String {
    name.trim().replace(' ', "-").to_lowercase()
}

/// `github-actions[bot]` becomes `github-actions`.
fn actor_login(actor: &str) -> &str {
    actor.split("[bot]").next().unwrap_or(actor)
}

fn absolute(path: PathBuf, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

impl RunConfiguration {
    /// Resolve raw inputs into a validated configuration.
    pub fn resolve(inputs: ConfigInputs) -> Result<Self> {
        let github_repository = required(inputs.github_repository, "GITHUB_REPOSITORY")?;
        let github_token = required(inputs.github_token, "GH_TOKEN")?;
        let aur_maintainer_name = required(inputs.aur_maintainer_name, "AUR_MAINTAINER_NAME")?;
        let workspace = non_empty_path(inputs.github_workspace).ok_or_else(|| Error::MissingVariable {
            name: "GITHUB_WORKSPACE".to_string(),
        })?;

        if !workspace.is_dir() {
            return Err(Error::Config {
                message: format!("GITHUB_WORKSPACE ({}) is not a directory", workspace.display()),
            });
        }
        let workspace = workspace.canonicalize()?;

        let search_root = match non_empty(inputs.search_root_suffix) {
            Some(suffix) => {
                let root = workspace.join(suffix.trim_start_matches('/'));
                if !root.is_dir() {
                    return Err(Error::Config {
                        message: format!(
                            "PKGBUILD_SEARCH_ROOT_SUFFIX ({}) resolves to {}, which is not a directory",
                            suffix,
                            root.display()
                        ),
                    });
                }
                root
            }
            None => workspace.clone(),
        };

        let search_patterns = non_empty(inputs.search_patterns)
            .map(|p| parse_list(&p))
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| vec![defaults::DEFAULT_SEARCH_PATTERN.to_string()]);

        let actor = non_empty(inputs.actor).unwrap_or_else(|| defaults::DEFAULT_ACTOR.to_string());

        let aur_user = non_empty(inputs.aur_git_user_name).unwrap_or_else(|| aur_maintainer_name.clone());
        let aur_email = non_empty(inputs.aur_git_user_email)
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", slug(&aur_user)));

        let source_user =
            non_empty(inputs.source_git_user_name).unwrap_or_else(|| format!("{} (via CI)", actor));
        let source_email = non_empty(inputs.source_git_user_email)
            .unwrap_or_else(|| format!("{}@users.noreply.github.com", actor_login(&actor)));

        let build_base_dir = non_empty_path(inputs.build_base_dir)
            .map(|p| absolute(p, &workspace))
            .unwrap_or_else(defaults::default_build_base_dir);
        let nvchecker_run_dir = non_empty_path(inputs.nvchecker_run_dir)
            .map(|p| absolute(p, &workspace))
            .unwrap_or_else(defaults::default_nvchecker_run_dir);
        let artifacts_dir = non_empty_path(inputs.artifacts_dir)
            .map(|p| absolute(p, &workspace))
            .unwrap_or_else(|| workspace.join(defaults::ARTIFACTS_DIR_NAME));

        Ok(Self {
            github_repository,
            github_token,
            run_id: non_empty(inputs.run_id).unwrap_or_else(|| defaults::DEFAULT_RUN_ID.to_string()),
            aur_identity: GitIdentity::new(aur_user, aur_email),
            source_identity: GitIdentity::new(source_user, source_email),
            actor,
            aur_maintainer_name,
            build_base_dir,
            nvchecker_run_dir,
            artifacts_dir,
            search_root,
            search_patterns,
            commit_message_prefix: non_empty(inputs.commit_message_prefix)
                .unwrap_or_else(|| defaults::DEFAULT_COMMIT_MESSAGE_PREFIX.to_string()),
            release_bump_packages: non_empty(inputs.release_bump_packages)
                .map(|p| parse_list(&p))
                .unwrap_or_default(),
            aur_remote_base: non_empty(inputs.aur_remote_base)
                .unwrap_or_else(|| defaults::DEFAULT_AUR_REMOTE_BASE.to_string()),
            aur_rpc_url: non_empty(inputs.aur_rpc_url)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| defaults::DEFAULT_AUR_RPC_URL.to_string()),
            source_repo_url: non_empty(inputs.source_repo_url),
            builder_user: non_empty(inputs.builder_user),
            secret_ghuk_value: non_empty(inputs.secret_ghuk_value),
            workspace,
            debug: inputs.debug,
            dry_run: inputs.dry_run,
            github_actions: inputs.github_actions,
        })
    }

    /// Whether a release-only rebuild was requested for `name`.
    pub fn wants_release_bump(&self, name: &str) -> bool {
        self.release_bump_packages.iter().any(|p| p == name)
    }

    /// Remote the source repository is cloned from and pushed to.
    pub fn source_remote_url(&self) -> String {
        self.source_repo_url
            .clone()
            .unwrap_or_else(|| token_remote_url(&self.github_repository, &self.github_token))
    }

    /// Values that must never appear in logs.
    pub fn secrets(&self) -> Vec<String> {
        let mut secrets = vec![self.github_token.clone()];
        secrets.extend(self.secret_ghuk_value.clone());
        secrets
    }

    /// Commit message for the registry push.
    pub fn registry_commit_message(&self, name: &str, full_version: &str) -> String {
        format!("{}: {} to v{}", self.commit_message_prefix, name, full_version)
    }

    /// Commit message for the source repository sync.
    pub fn source_commit_message(&self, name: &str, full_version: &str) -> String {
        format!(
            "{}: sync {} files after AUR update to v{}",
            self.commit_message_prefix, name, full_version
        )
    }
}

impl fmt::Debug for RunConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfiguration")
            .field("github_repository", &self.github_repository)
            .field("github_token", &"***")
            .field("workspace", &self.workspace)
            .field("run_id", &self.run_id)
            .field("actor", &self.actor)
            .field("aur_maintainer_name", &self.aur_maintainer_name)
            .field("aur_identity", &self.aur_identity)
            .field("source_identity", &self.source_identity)
            .field("build_base_dir", &self.build_base_dir)
            .field("nvchecker_run_dir", &self.nvchecker_run_dir)
            .field("artifacts_dir", &self.artifacts_dir)
            .field("search_root", &self.search_root)
            .field("search_patterns", &self.search_patterns)
            .field("commit_message_prefix", &self.commit_message_prefix)
            .field("release_bump_packages", &self.release_bump_packages)
            .field("aur_remote_base", &self.aur_remote_base)
            .field("aur_rpc_url", &self.aur_rpc_url)
            .field("source_repo_url", &self.source_repo_url.as_ref().map(|_| "***"))
            .field("builder_user", &self.builder_user)
            .field("secret_ghuk_value", &self.secret_ghuk_value.as_ref().map(|_| "***"))
            .field("debug", &self.debug)
            .field("dry_run", &self.dry_run)
            .field("github_actions", &self.github_actions)
            .finish()
    }
}
