//! CLI argument parsing and top-level execution

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use log::{debug, error};

use gh_aur_updater::config::{ConfigInputs, RunConfiguration};
use gh_aur_updater::error::Error;
use gh_aur_updater::exit_codes;
use gh_aur_updater::logging;
use gh_aur_updater::orchestrator::{self, RunReport};
use gh_aur_updater::output::OutputConfig;

/// Update AUR packages from a repository of PKGBUILDs
///
/// Every option can also be given through the environment variable shown
/// next to it; in CI that is the usual way.
#[derive(Parser, Debug)]
#[command(name = "gh-aur-updater")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source repository, as owner/name
    #[arg(long, env = "GITHUB_REPOSITORY", value_name = "OWNER/NAME")]
    github_repository: Option<String>,

    /// Token for the source repository and its releases
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    gh_token: Option<String>,

    /// Checkout of the source repository
    #[arg(long, env = "GITHUB_WORKSPACE", value_name = "PATH")]
    github_workspace: Option<PathBuf>,

    /// AUR account whose packages are looked up, also the default commit author
    #[arg(long, env = "AUR_MAINTAINER_NAME", value_name = "NAME")]
    aur_maintainer_name: Option<String>,

    /// CI run identifier mentioned in release notes
    #[arg(long, env = "GITHUB_RUN_ID", value_name = "ID")]
    github_run_id: Option<String>,

    /// Account that triggered the run
    #[arg(long, env = "GITHUB_ACTOR", value_name = "LOGIN")]
    github_actor: Option<String>,

    #[arg(long, env = "AUR_GIT_USER_NAME", value_name = "NAME")]
    aur_git_user_name: Option<String>,

    #[arg(long, env = "AUR_GIT_USER_EMAIL", value_name = "EMAIL")]
    aur_git_user_email: Option<String>,

    #[arg(long, env = "SOURCE_REPO_GIT_USER_NAME", value_name = "NAME")]
    source_repo_git_user_name: Option<String>,

    #[arg(long, env = "SOURCE_REPO_GIT_USER_EMAIL", value_name = "EMAIL")]
    source_repo_git_user_email: Option<String>,

    /// Base directory for per-package working directories
    #[arg(long, env = "PACKAGE_BUILD_BASE_DIR", value_name = "PATH")]
    package_build_base_dir: Option<PathBuf>,

    /// Working directory for nvchecker
    #[arg(long, env = "NVCHECKER_RUN_DIR", value_name = "PATH")]
    nvchecker_run_dir: Option<PathBuf>,

    /// Where build outputs are collected for upload
    #[arg(long, env = "ARTIFACTS_DIR", value_name = "PATH")]
    artifacts_dir: Option<PathBuf>,

    /// Subdirectory of the workspace to search for recipes
    #[arg(long, env = "PKGBUILD_SEARCH_ROOT_SUFFIX", value_name = "DIR")]
    pkgbuild_search_root_suffix: Option<String>,

    /// Comma-separated glob patterns locating recipes
    #[arg(long, env = "PKGBUILD_SEARCH_PATTERNS", value_name = "GLOBS")]
    pkgbuild_search_patterns: Option<String>,

    #[arg(long, env = "COMMIT_MESSAGE_PREFIX", value_name = "TEXT")]
    commit_message_prefix: Option<String>,

    /// Comma-separated packages to rebuild with a bumped pkgrel
    #[arg(long, env = "RELEASE_BUMP_PACKAGES", value_name = "NAMES")]
    release_bump_packages: Option<String>,

    /// Base of the AUR git remotes
    #[arg(long, env = "AUR_REMOTE_BASE", value_name = "URL")]
    aur_remote_base: Option<String>,

    /// AUR RPC endpoint used to look up published versions
    #[arg(long, env = "AUR_RPC_URL", value_name = "URL")]
    aur_rpc_url: Option<String>,

    /// Remote of the source repository (defaults to a token URL)
    #[arg(long, env = "SOURCE_REPO_URL", value_name = "URL", hide_env_values = true)]
    source_repo_url: Option<String>,

    /// Unprivileged user to run makepkg as
    #[arg(long, env = "BUILDER_USER", value_name = "USER")]
    builder_user: Option<String>,

    /// GitHub token handed to nvchecker through a keyfile
    #[arg(long, env = "SECRET_GHUK_VALUE", hide_env_values = true)]
    secret_ghuk_value: Option<String>,

    /// Log debug output
    #[arg(
        long = "debug",
        env = "DEBUG_MODE",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    debug: bool,

    /// Show what would be done without changing anything
    #[arg(
        long = "dry-run",
        env = "DRY_RUN_MODE",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    dry_run: bool,

    /// Log in GitHub Actions workflow-command format
    #[arg(
        long = "github-actions",
        env = "GITHUB_ACTIONS",
        value_parser = BoolishValueParser::new(),
        action = ArgAction::Set,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    github_actions: bool,

    /// Colorize output (always, never, auto)
    #[arg(long, value_name = "WHEN", default_value = "auto")]
    color: String,
}

impl Cli {
    /// Run the updater and map the result onto a process exit code.
    pub fn execute(self) -> ExitCode {
        logging::init(self.debug, self.github_actions);
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.run() {
            Ok(report) => {
                println!("{}", report.render(&output));
                ExitCode::from(report.exit_code())
            }
            Err(e) => {
                error!("{:#}", e);
                let code = match e.downcast_ref::<Error>() {
                    Some(Error::MissingVariable { .. }) => exit_codes::USAGE,
                    _ => exit_codes::FAILURE,
                };
                ExitCode::from(code)
            }
        }
    }

    fn run(self) -> Result<RunReport> {
        let config = RunConfiguration::resolve(self.into_inputs())?;
        debug!("{:?}", config);
        orchestrator::run(&config).context("Run setup failed")
    }

    fn into_inputs(self) -> ConfigInputs {
        ConfigInputs {
            github_repository: self.github_repository,
            github_token: self.gh_token,
            github_workspace: self.github_workspace,
            aur_maintainer_name: self.aur_maintainer_name,
            run_id: self.github_run_id,
            actor: self.github_actor,
            aur_git_user_name: self.aur_git_user_name,
            aur_git_user_email: self.aur_git_user_email,
            source_git_user_name: self.source_repo_git_user_name,
            source_git_user_email: self.source_repo_git_user_email,
            build_base_dir: self.package_build_base_dir,
            nvchecker_run_dir: self.nvchecker_run_dir,
            artifacts_dir: self.artifacts_dir,
            search_root_suffix: self.pkgbuild_search_root_suffix,
            search_patterns: self.pkgbuild_search_patterns,
            commit_message_prefix: self.commit_message_prefix,
            release_bump_packages: self.release_bump_packages,
            aur_remote_base: self.aur_remote_base,
            aur_rpc_url: self.aur_rpc_url,
            source_repo_url: self.source_repo_url,
            builder_user: self.builder_user,
            secret_ghuk_value: self.secret_ghuk_value,
            debug: self.debug,
            dry_run: self.dry_run,
            github_actions: self.github_actions,
        }
    }
}
