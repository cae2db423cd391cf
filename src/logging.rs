//! # Logging
//!
//! All crate code logs through the `log` facade; the binary installs an
//! `env_logger` backend once at startup with [`init`].
//!
//! Two output formats are supported:
//!
//! - **Local**: `2024-05-01T12:00:00Z [INFO ] gh_aur_updater::pipeline: message`
//! - **GitHub Actions**: workflow commands, so warnings and errors are
//!   annotated in the run summary. `debug`/`warn`/`error` records become
//!   `::debug::`, `::warning::` and `::error::` lines with `%`, CR and LF
//!   escaped; `info` records are printed raw.
//!
//! Each package's log lines are bracketed by a [`LogGroup`], which renders as
//! a collapsible `::group::` block under GitHub Actions and as a banner line
//! otherwise.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, Level, LevelFilter};

/// Prefix of every line describing an action skipped by dry-run mode.
pub const DRY_RUN_MARKER: &str = "[DRY RUN]";

static WORKFLOW_COMMANDS: AtomicBool = AtomicBool::new(false);

/// Log an action that dry-run mode replaces.
macro_rules! dry_run {
    ($($arg:tt)*) => {
        ::log::info!("{} {}", $crate::logging::DRY_RUN_MARKER, format_args!($($arg)*))
    };
}
pub(crate) use dry_run;

/// Escape a message for use as workflow-command data.
pub fn escape_workflow_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Render one record in GitHub Actions workflow-command form.
pub fn workflow_command_line(level: Level, message: &str) -> String {
    match level {
        Level::Error => format!("::error::{}", escape_workflow_data(message)),
        Level::Warn => format!("::warning::{}", escape_workflow_data(message)),
        Level::Info => message.to_string(),
        Level::Debug | Level::Trace => format!("::debug::{}", escape_workflow_data(message)),
    }
}

/// Install the global logger.
///
/// The level is `debug` when `debug` is set and `info` otherwise; `RUST_LOG`
/// overrides both. Calling this more than once is harmless.
pub fn init(debug: bool, github_actions: bool) {
    WORKFLOW_COMMANDS.store(github_actions, Ordering::Relaxed);

    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    if github_actions {
        builder
            .target(env_logger::Target::Stdout)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{}",
                    workflow_command_line(record.level(), &record.args().to_string())
                )
            });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} [{:<5}] {}: {}",
                buf.timestamp_seconds(),
                record.level(),
                record.target(),
                record.args()
            )
        });
    }

    // A logger may already be installed (tests, embedding); keep it.
    let _ = builder.try_init();
}

/// Brackets the log lines of one unit of work. The group closes on drop.
#[must_use = "the group closes as soon as the guard is dropped"]
pub struct LogGroup {
    workflow_commands: bool,
}

impl LogGroup {
    pub fn start(title: &str) -> Self {
        let workflow_commands = WORKFLOW_COMMANDS.load(Ordering::Relaxed);
        if workflow_commands {
            info!("::group::{}", escape_workflow_data(title));
        } else {
            info!("===== {} =====", title);
        }
        Self { workflow_commands }
    }
}

impl Drop for LogGroup {
    fn drop(&mut self) {
        if self.workflow_commands {
            info!("::endgroup::");
        }
    }
}
