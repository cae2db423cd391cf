//! # Git Operations
//!
//! Thin wrapper over the system `git` binary, used by the registry and
//! source publishers. Every invocation goes through a
//! [`CommandRunner`] so tests can script git's answers.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// Author and committer identity for commits made by the updater.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl GitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A file to place in a clone: `local` is copied to `repo_path`, which is
/// relative to the clone root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFile {
    pub local: PathBuf,
    pub repo_path: PathBuf,
}

impl SyncFile {
    pub fn new(local: impl Into<PathBuf>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            local: local.into(),
            repo_path: repo_path.into(),
        }
    }
}

/// Everything needed to land a set of files on a remote branch.
pub struct PublishRequest<'a> {
    pub url: &'a str,
    /// Clone directory, replaced if it exists.
    pub clone_dir: &'a Path,
    pub depth: Option<u32>,
    pub secrets: &'a [String],
    pub identity: &'a GitIdentity,
    pub files: &'a [SyncFile],
    pub message: &'a str,
    /// Remote branch to push `HEAD` to; `None` pushes the checked-out branch.
    pub branch: Option<&'a str>,
}

/// Clone, copy the files in, and commit and push them.
///
/// Returns the new commit SHA, or `None` when the files were already
/// identical to the remote and nothing was committed.
pub fn publish_files(runner: &dyn CommandRunner, request: &PublishRequest<'_>) -> Result<Option<String>> {
    let repo = GitRepo::clone(
        runner,
        request.url,
        request.clone_dir,
        request.depth,
        request.secrets,
    )?;
    repo.configure_identity(&request.identity.name, &request.identity.email)?;

    let mut staged = Vec::with_capacity(request.files.len());
    for file in request.files {
        let target = repo.dir().join(&file.repo_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&file.local, &target).map_err(|e| Error::Unexpected {
            message: format!("copying {} into clone: {}", file.local.display(), e),
        })?;
        debug!("Placed {} at {}", file.local.display(), file.repo_path.display());
        staged.push(file.repo_path.clone());
    }
    repo.stage(&staged)?;

    if !repo.has_changes()? {
        info!("No changes to commit in {}", repo.dir().display());
        return Ok(None);
    }

    let sha = repo.commit(request.message)?;
    repo.push(request.branch)?;
    info!("Pushed {} to {}", short_sha(&sha), redact_url(request.url, request.secrets));
    Ok(Some(sha))
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

fn redact_url(url: &str, secrets: &[String]) -> String {
    secrets
        .iter()
        .filter(|s| !s.is_empty())
        .fold(url.to_string(), |acc, s| acc.replace(s.as_str(), "***"))
}

/// A local clone driven through the system `git` command.
///
/// Using the system git automatically picks up:
/// - SSH keys from ~/.ssh/ (the AUR remote)
/// - Git credential helpers
/// - Any authentication configured in ~/.gitconfig
pub struct GitRepo<'a> {
    runner: &'a dyn CommandRunner,
    dir: PathBuf,
    secrets: Vec<String>,
}

impl<'a> GitRepo<'a> {
    /// Clone `url` into `target_dir`, replacing anything already there.
    ///
    /// `depth` requests a shallow clone. `secrets` are redacted from every
    /// command line this clone logs (tokens embedded in the URL).
    pub fn clone(
        runner: &'a dyn CommandRunner,
        url: &str,
        target_dir: &Path,
        depth: Option<u32>,
        secrets: &[String],
    ) -> Result<Self> {
        // git won't clone into an existing non-empty dir
        if target_dir.exists() {
            fs::remove_dir_all(target_dir)?;
        }
        if let Some(parent) = target_dir.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut spec = CommandSpec::new("git").arg("clone");
        if let Some(depth) = depth {
            spec = spec.arg(format!("--depth={}", depth));
        }
        spec = spec.arg(url).arg(target_dir.as_os_str());
        for secret in secrets {
            spec = spec.secret(secret.clone());
        }

        let output = runner.run(&spec)?;
        if !output.success() {
            return Err(clone_error(&spec.redact(url), output));
        }

        Ok(Self {
            runner,
            dir: target_dir.to_path_buf(),
            secrets: secrets.to_vec(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn git(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("git").arg("-C").arg(self.dir.as_os_str());
        for secret in &self.secrets {
            spec = spec.secret(secret.clone());
        }
        spec
    }

    /// Set the commit identity for this clone only.
    pub fn configure_identity(&self, name: &str, email: &str) -> Result<()> {
        self.runner
            .run_checked(&self.git().args(["config", "user.name", name]))?;
        self.runner
            .run_checked(&self.git().args(["config", "user.email", email]))?;
        Ok(())
    }

    /// Stage the given paths (relative to the clone root).
    pub fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let spec = self
            .git()
            .args(["add", "--"])
            .args(paths.iter().map(|p| p.as_os_str().to_os_string()));
        self.runner.run_checked(&spec)?;
        Ok(())
    }

    /// Whether the working tree or index differs from HEAD.
    pub fn has_changes(&self) -> Result<bool> {
        let output = self
            .runner
            .run_checked(&self.git().args(["status", "--porcelain"]))?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Commit the index and return the new commit SHA.
    pub fn commit(&self, message: &str) -> Result<String> {
        self.runner
            .run_checked(&self.git().args(["commit", "-m", message]))?;
        let output = self
            .runner
            .run_checked(&self.git().args(["rev-parse", "HEAD"]))?;
        Ok(output.stdout.trim().to_string())
    }

    /// Push `HEAD` to `branch` on origin, or to the same-named branch when
    /// `branch` is `None`.
    pub fn push(&self, branch: Option<&str>) -> Result<()> {
        let refspec = match branch {
            Some(branch) => format!("HEAD:{}", branch),
            None => "HEAD".to_string(),
        };
        self.runner
            .run_checked(&self.git().args(["push", "origin", refspec.as_str()]))?;
        Ok(())
    }
}

fn clone_error(url: &str, output: CommandOutput) -> Error {
    let stderr = output.stderr.trim();

    // Provide helpful error message for common auth failures
    let message = if stderr.contains("Authentication failed")
        || stderr.contains("Permission denied")
        || stderr.contains("Could not read from remote repository")
    {
        format!(
            "Authentication failed while cloning {}. Make sure the runner has:\n\
            - an SSH key registered with the AUR account\n\
            - a token with contents:write on the source repository\n\
            Error: {}",
            url, stderr
        )
    } else {
        format!("git clone {} failed: {}", url, stderr)
    };

    Error::CommandFailed {
        command: output.command,
        status: output.status,
        stderr: message,
    }
}

/// Copy the contents of `src` into `dst`, recursively, skipping `.git`.
///
/// Existing files in `dst` are overwritten. Returns the copied paths relative
/// to `src`.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    fs::create_dir_all(dst)?;

    for entry in walkdir::WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(|e| Error::Unexpected {
            message: format!("walking {}: {}", src.display(), e),
        })?;
        let relative = entry.path().strip_prefix(src).map_err(|e| Error::Unexpected {
            message: format!("{} is outside {}: {}", entry.path().display(), src.display(), e),
        })?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied.push(relative.to_path_buf());
        }
    }

    Ok(copied)
}
