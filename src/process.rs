//! # External Command Execution
//!
//! Every external tool (`git`, `gh`, `makepkg`, `updpkgsums`, `nvchecker`)
//! is started through the [`CommandRunner`] trait. The default
//! implementation, [`SystemCommandRunner`], spawns a real process and waits
//! for it; tests substitute a runner that records invocations and replays
//! canned output.
//!
//! A [`CommandSpec`] describes one invocation: program, arguments, working
//! directory, extra environment and the secrets that must never appear in a
//! logged command line.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::debug;

use crate::error::{Error, Result};

/// A single external command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Substrings replaced with `***` whenever the command is displayed.
    pub secrets: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Run this command through `sudo -u <user>` when a user is given.
    pub fn as_user(self, user: Option<&str>) -> Self {
        match user {
            Some(user) => {
                let mut wrapped = CommandSpec::new("sudo")
                    .args(["-u", user])
                    .arg(self.program.as_str())
                    .args(self.args);
                wrapped.cwd = self.cwd;
                wrapped.env = self.env;
                wrapped.secrets = self.secrets;
                wrapped
            }
            None => self,
        }
    }

    /// The command line as it may be logged, with secrets redacted.
    pub fn display(&self) -> String {
        let mut parts = vec![quote(&self.program)];
        parts.extend(self.args.iter().map(|a| quote(&a.to_string_lossy())));
        self.redact(&parts.join(" "))
    }

    /// Replace every configured secret in `text` with `***`.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }

    /// Argument at `index`, lossily converted for inspection.
    pub fn arg_str(&self, index: usize) -> Option<String> {
        self.args
            .get(index)
            .map(|a| a.to_string_lossy().into_owned())
    }
}

fn quote(part: &str) -> String {
    if part.is_empty() {
        "''".to_string()
    } else if part.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", part.replace('\'', r"'\''"))
    } else {
        part.to_string()
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Redacted command line, for error messages.
    pub command: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`Error::CommandFailed`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            let stderr = if self.stderr.trim().is_empty() {
                self.stdout.trim().to_string()
            } else {
                self.stderr.trim().to_string()
            };
            Err(Error::CommandFailed {
                command: self.command,
                status: self.status,
                stderr,
            })
        }
    }
}

/// Trait for running external commands - allows mocking in tests
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output. A non-zero exit
    /// status is not an error at this level; see [`CommandRunner::run_checked`].
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run the command and fail unless it exits successfully.
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.run(spec)?.check()
    }
}

/// The default implementation of `CommandRunner`, which spawns real
/// processes with `std::process::Command`.
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let display = spec.display();
        match &spec.cwd {
            Some(cwd) => debug!("Running: {} (in {})", display, cwd.display()),
            None => debug!("Running: {}", display),
        }

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let output = command.output().map_err(|source| Error::CommandSpawn {
            command: display.clone(),
            source,
        })?;

        let stdout = spec.redact(&String::from_utf8_lossy(&output.stdout));
        let stderr = spec.redact(&String::from_utf8_lossy(&output.stderr));
        if !stdout.trim().is_empty() {
            debug!("stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("stderr: {}", stderr.trim());
        }

        Ok(CommandOutput {
            status: output.status.code(),
            stdout,
            stderr,
            command: display,
        })
    }
}
