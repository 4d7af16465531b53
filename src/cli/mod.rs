//! CLI module for the autospec harness
//!
//! This module provides the command-line interface for discovering and running the registered specs.
//!
//! ## Commands
//!
//! - `list` - Print every case path (optionally narrowed by filter or keyword)
//! - `run [NAMES]...` - Run cases (pytest-style output or JSON)
//!
//! ## Modules
//!
//! - `commands` - Command implementations
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::registry::Filter;
use crate::version::AUTOSPEC_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Output format for `list` and `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Console,
    Json,
}

/// BDD spec harness
#[derive(Parser, Debug)]
#[command(name = "autospec")]
#[command(version = AUTOSPEC_VERSION)]
#[command(about = "Discover and run BDD-style specs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List case paths
    List {
        /// Only list roots registered with this filter
        #[arg(long, value_enum)]
        filter: Option<Filter>,
        /// Only list paths containing this keyword
        #[arg(short = 'k', value_name = "EXPR")]
        keyword: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,
    },

    /// Run cases (pytest-style)
    Run {
        /// Case, suite or parametrized case paths (default: everything)
        #[arg(value_name = "NAME")]
        names: Vec<String>,
        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
        /// Stop on first failure
        #[arg(short = 'x', long = "exitfirst")]
        stop_on_fail: bool,
        /// Only run paths containing this keyword
        #[arg(short = 'k', value_name = "EXPR")]
        keyword: Option<String>,
        /// Only run roots registered with this filter
        #[arg(long, value_enum)]
        filter: Option<Filter>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
        format: OutputFormat,
        /// Drive latent steps with the wall clock instead of virtual time
        #[arg(long)]
        wall_clock: bool,
        /// Fail latent steps that have not completed after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
        /// Reject specs nested deeper than this
        #[arg(long, value_name = "DEPTH")]
        max_depth: Option<usize>,
        /// Path separator between suite and case names
        #[arg(long, default_value = crate::config::DEFAULT_SEPARATOR)]
        separator: String,
        /// Disable ANSI colors
        #[arg(long)]
        no_color: bool,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::List {
            filter,
            keyword,
            format,
        } => commands::list_specs(filter, keyword.as_deref(), format),
        Command::Run {
            names,
            verbose,
            stop_on_fail,
            keyword,
            filter,
            format,
            wall_clock,
            timeout_ms,
            max_depth,
            separator,
            no_color,
        } => commands::run_specs(&commands::RunOptions {
            names,
            verbose,
            stop_on_fail,
            keyword,
            filter,
            format,
            wall_clock,
            timeout_ms,
            max_depth,
            separator,
            color: !no_color,
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================
