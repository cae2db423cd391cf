//! # Run Orchestrator
//!
//! Prepares the run, discovers the recipes and feeds each one through the
//! [`PackagePipeline`]. Packages are processed sequentially; a failed
//! package is recorded and the loop moves on. The [`RunReport`] decides the
//! process exit code and renders the end-of-run summary.

use std::fmt::Write as _;
use std::fs;

use log::{debug, info};

use crate::config::RunConfiguration;
use crate::error::Result;
use crate::exit_codes;
use crate::logging::dry_run;
use crate::nvchecker::write_keyfile;
use crate::output::{failed_marker, skipped_marker, updated_marker, OutputConfig};
use crate::pipeline::{PackagePipeline, PackageResult, PipelineOutcome};
use crate::workspace::{self, PackageTask};

/// Results of every package processed in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub results: Vec<PackageResult>,
    pub dry_run: bool,
}

impl RunReport {
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, PipelineOutcome::Updated))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PipelineOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(PipelineOutcome::is_failed)
    }

    fn count(&self, predicate: impl Fn(&PipelineOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }

    /// `0` when every package was skipped or updated, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.failed() > 0 {
            exit_codes::FAILURE
        } else {
            exit_codes::SUCCESS
        }
    }

    /// Human-readable summary: a count line followed by one line per
    /// package.
    pub fn render(&self, output: &OutputConfig) -> String {
        let mut text = format!(
            "Summary: {} updated, {} skipped, {} failed",
            self.updated(),
            self.skipped(),
            self.failed()
        );
        if self.dry_run {
            text.push_str(" (dry run)");
        }
        text.push('\n');

        for result in &self.results {
            let old = result.old_version.as_deref().unwrap_or("?");
            // Writing to a String cannot fail.
            let _ = match &result.outcome {
                PipelineOutcome::Updated => writeln!(
                    text,
                    "{} {} {} -> {}",
                    updated_marker(output),
                    result.package,
                    old,
                    result.new_version.as_deref().unwrap_or("?")
                ),
                PipelineOutcome::Skipped(reason) => writeln!(
                    text,
                    "{} {} {} ({})",
                    skipped_marker(output),
                    result.package,
                    old,
                    reason
                ),
                PipelineOutcome::Failed {
                    stage,
                    kind,
                    message,
                } => writeln!(
                    text,
                    "{} {} failed at {} ({}): {}",
                    failed_marker(output),
                    result.package,
                    stage,
                    kind,
                    message
                ),
            };
        }
        text
    }
}

/// Run `pipeline` over every task, in order.
pub fn run_all(tasks: &[PackageTask], pipeline: &PackagePipeline<'_>) -> RunReport {
    let results = tasks.iter().map(|task| pipeline.run(task)).collect();
    RunReport {
        results,
        dry_run: pipeline.config().dry_run,
    }
}

/// Set up the run directories, discover recipes and process them with the
/// real tools.
///
/// Only setup failures are returned as errors; package failures are part of
/// the report.
pub fn run(config: &RunConfiguration) -> Result<RunReport> {
    prepare(config)?;

    let excluded = [config.artifacts_dir.clone(), config.build_base_dir.clone()];
    let tasks = workspace::discover(&config.search_root, &config.search_patterns, &excluded)?;

    let pipeline = PackagePipeline::new(config)?;
    Ok(run_all(&tasks, &pipeline))
}

/// Create the working directories and the nvchecker keyfile.
pub fn prepare(config: &RunConfiguration) -> Result<()> {
    let dirs = [
        &config.build_base_dir,
        &config.nvchecker_run_dir,
        &config.artifacts_dir,
    ];

    if config.dry_run {
        for dir in dirs {
            dry_run!("Would create {}", dir.display());
        }
        if config.secret_ghuk_value.is_some() {
            dry_run!("Would write the nvchecker keyfile");
        }
        return Ok(());
    }

    for dir in dirs {
        debug!("Creating {}", dir.display());
        fs::create_dir_all(dir)?;
    }
    if let Some(token) = &config.secret_ghuk_value {
        let keyfile = write_keyfile(&config.nvchecker_run_dir, token)?;
        info!("Wrote nvchecker keyfile to {}", keyfile.display());
    }
    Ok(())
}
