//! CLI command implementations.
//!
//! Both commands build the registry from [`crate::demo::register_all`]; registration errors are rendered through
//! miette so their codes and help text reach the terminal.

use std::io::{self, Write};
use std::time::Duration;

use crate::config::HarnessConfig;
use crate::demo;
use crate::engine::Runner;
use crate::errors::SpecError;
use crate::latent::CooperativeScheduler;
use crate::registry::{Filter, Registry};
use crate::report::{ConsoleReporter, JsonReporter, RunSummary};

use super::{CliError, CliResult, ExitCode, OutputFormat};

/// Options for the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub names: Vec<String>,
    pub verbose: bool,
    pub stop_on_fail: bool,
    pub keyword: Option<String>,
    pub filter: Option<Filter>,
    pub format: OutputFormat,
    pub wall_clock: bool,
    pub timeout_ms: Option<u64>,
    pub max_depth: Option<usize>,
    pub separator: String,
    pub color: bool,
}

fn spec_error(err: SpecError) -> CliError {
    CliError::failure(format!("{:?}", miette::Report::new(err)))
}

fn io_error(err: io::Error) -> CliError {
    CliError::failure(format!("Error writing output: {err}"))
}

/// Build the registry holding every known spec.
pub fn build_registry(config: HarnessConfig) -> CliResult<Registry> {
    let mut registry = Registry::new(config);
    demo::register_all(&mut registry).map_err(spec_error)?;
    Ok(registry)
}

/// Pick the paths to run or list.
///
/// Explicit `names` win over discovery; `filter` narrows discovery only; `keyword` narrows both.
pub fn select_paths(registry: &Registry, names: &[String], filter: Option<Filter>, keyword: Option<&str>) -> Vec<String> {
    let mut paths: Vec<String> = if !names.is_empty() {
        names.to_vec()
    } else if let Some(filter) = filter {
        registry.list_filtered(filter).map(str::to_string).collect()
    } else {
        registry.list_all().map(str::to_string).collect()
    };
    if let Some(keyword) = keyword {
        paths.retain(|path| path.contains(keyword));
    }
    paths
}

/// Write the listing for `paths` in `format`.
pub fn write_listing(paths: &[String], format: OutputFormat, out: &mut dyn Write) -> io::Result<()> {
    match format {
        OutputFormat::Console => {
            for path in paths {
                writeln!(out, "{path}")?;
            }
            writeln!(out, "\n{} case(s)", paths.len())
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, paths)?;
            writeln!(out)
        }
    }
}

/// List case paths.
pub fn list_specs(filter: Option<Filter>, keyword: Option<&str>, format: OutputFormat) -> CliResult<ExitCode> {
    let registry = build_registry(HarnessConfig::default())?;
    let paths = select_paths(&registry, &[], filter, keyword);
    write_listing(&paths, format, &mut io::stdout().lock()).map_err(io_error)?;
    Ok(ExitCode::SUCCESS)
}

/// Run the selected cases and report them.
pub fn run_specs(options: &RunOptions) -> CliResult<ExitCode> {
    let config = HarnessConfig::new()
        .with_separator(options.separator.as_str())
        .with_max_depth(options.max_depth)
        .with_stop_on_fail(options.stop_on_fail);
    let registry = build_registry(config)?;
    let selection = select_paths(&registry, &options.names, options.filter, options.keyword.as_deref());
    tracing::info!(cases = selection.len(), "running specs");

    let mut scheduler = if options.wall_clock {
        CooperativeScheduler::wall_clock()
    } else {
        CooperativeScheduler::virtual_time()
    };
    if let Some(ms) = options.timeout_ms {
        scheduler = scheduler.with_timeout(Duration::from_millis(ms));
    }
    let mut runner = Runner::new(&registry, scheduler);

    let summary = run_with_format(&mut runner, &selection, options, &mut io::stdout().lock()).map_err(io_error)?;
    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        // Failures were already reported
        Err(CliError::new("", ExitCode::FAILURE))
    }
}

fn run_with_format<W: Write>(
    runner: &mut Runner<'_, CooperativeScheduler>,
    selection: &[String],
    options: &RunOptions,
    out: &mut W,
) -> io::Result<RunSummary> {
    match options.format {
        OutputFormat::Console => {
            let mut reporter = ConsoleReporter::new(out, options.verbose).with_color(options.color);
            let summary = runner.run_into(selection, &mut reporter);
            reporter.finish()?;
            Ok(summary)
        }
        OutputFormat::Json => {
            let mut reporter = JsonReporter::new(out);
            let summary = runner.run_into(selection, &mut reporter);
            reporter.finish()?;
            Ok(summary)
        }
    }
}
