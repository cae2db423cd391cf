//! # gh-aur-updater CLI
//!
//! This is the binary entry point for the `gh-aur-updater` command-line tool.
//!
//! Its primary responsibilities are:
//! - Parsing command-line arguments and environment variables using `clap`.
//! - Installing the logger.
//! - Translating the run report or a setup error into the process exit code.
//!
//! The update logic lives in the `lib.rs` library crate; the binary is a thin
//! wrapper around it.

mod cli;

use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    cli::Cli::parse().execute()
}
