//! `protdb run` command implementation
//!
//! [`prepare`] validates everything up front so a bad invocation fails before
//! any directory or log file exists. [`run`] then executes the job graph and
//! prints the report, also written to `{log_dir}/{date_tag}/run-report.json`.

use crate::commands::Selection;
use crate::error::{CliError, Result};
use crate::progress::create_run_progress;
use crate::RunArgs;
use colored::Colorize;
use protdb_pipeline::{
    JobGraph, PipelineConfig, RunReport, Scheduler, SchedulerConfig, ToolAdapter,
};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A validated run: selection, job graph and tool adapter
pub struct PreparedRun {
    pub selection: Selection,
    pub graph: JobGraph,
    adapter: ToolAdapter,
}

/// Validate arguments, selection and tool configuration without touching the
/// filesystem beyond reading the config file
pub fn prepare(args: &RunArgs, config_path: Option<&Path>) -> Result<PreparedRun> {
    if args.concurrency == 0 {
        return Err(CliError::invalid_argument("--concurrency must be at least 1"));
    }
    if args.timeout == Some(0) {
        return Err(CliError::invalid_argument("--timeout must be at least 1 second"));
    }

    let selection = args.selection.resolve()?;
    let graph = selection.build_graph()?;
    if graph.is_empty() {
        return Err(CliError::invalid_argument(
            "the selection produces no jobs; pass --variant-list or use --grid all",
        ));
    }

    let config = PipelineConfig::discover(config_path)?;
    let adapter = ToolAdapter::new(config.tools).with_timeout(args.timeout.map(Duration::from_secs));

    Ok(PreparedRun {
        selection,
        graph,
        adapter,
    })
}

/// Run a prepared pipeline; the caller turns the report into the exit code
pub async fn run(
    prepared: PreparedRun,
    args: &RunArgs,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let PreparedRun {
        selection,
        graph,
        adapter,
    } = prepared;

    info!(
        date_tag = %selection.date_tag,
        species = selection.species.len(),
        variants = selection.variants.len(),
        jobs = graph.len(),
        "Starting protdb run"
    );

    let scheduler = Scheduler::new(adapter, SchedulerConfig {
        concurrency: args.concurrency,
        skip_existing: args.skip_existing,
    })
    .with_cancellation(cancel)
    .with_progress(create_run_progress(graph.len() as u64));

    let outcome = scheduler.run(&graph).await;
    let report = RunReport::summarize(&selection.date_tag, outcome);

    println!("{}", report.render_table());

    let log_dir = selection.resolver.log_dir(&selection.date_tag);
    match report.write_json(&log_dir) {
        Ok(path) => println!("Report: {}", path.display()),
        Err(e) => {
            warn!(error = %e, "Failed to write run report");
            eprintln!("{} could not write run report: {}", "Warning:".yellow(), e);
        },
    }

    let summary = report.summary_line();
    if report.is_success() {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.red().bold());
    }
    info!(status = %report.overall_status, elapsed_ms = report.elapsed_ms, "Run finished");

    Ok(report)
}
