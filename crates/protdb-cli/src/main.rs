//! protdb CLI - Main entry point

use clap::Parser;
use colored::Colorize;
use protdb_cli::commands::run::{self, PreparedRun};
use protdb_cli::{Cli, CliError, Commands};
use protdb_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // A run is validated before its log file is created
    let prepared = match &cli.command {
        Commands::Run(args) => match run::prepare(args, cli.config.as_deref()) {
            Ok(prepared) => Some(prepared),
            Err(e) => process::exit(report_error(&e)),
        },
        _ => None,
    };

    // The CLI works without logging; the guard must outlive the command
    let guard = init_logging(&log_config(&cli, prepared.as_ref())).unwrap_or_else(|e| {
        eprintln!("{} logging disabled: {}", "Warning:".yellow(), e);
        None
    });

    let code = match execute_command(&cli, prepared).await {
        Ok(code) => code,
        Err(e) => report_error(&e),
    };

    // process::exit skips destructors, flush the log writer first
    drop(guard);
    process::exit(code);
}

/// Logging setup: a run logs to a file next to its job logs, other commands
/// log warnings to the console
fn log_config(cli: &Cli, prepared: Option<&PreparedRun>) -> LogConfig {
    let mut config = match &cli.command {
        Commands::Run(_) => LogConfig::builder()
            .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
            .output(if cli.verbose { LogOutput::Both } else { LogOutput::File })
            .build(),
        _ => LogConfig::builder()
            .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
            .output(LogOutput::Console)
            .build(),
    };

    // Environment variables take precedence
    config = config.clone().with_env_overrides().unwrap_or(config);

    // PROTDB_LOG_DIR names the log root; the run writes into its date tag directory
    if let Some(prepared) = prepared {
        config.log_dir = prepared
            .selection
            .resolver
            .log_dir(&prepared.selection.date_tag);
    }

    config
}

/// Execute the CLI command, returning the process exit code
async fn execute_command(cli: &Cli, prepared: Option<PreparedRun>) -> protdb_cli::Result<i32> {
    match (&cli.command, prepared) {
        (Commands::Run(args), prepared) => {
            let prepared = match prepared {
                Some(prepared) => prepared,
                None => run::prepare(args, cli.config.as_deref())?,
            };
            let cancel = CancellationToken::new();
            spawn_interrupt_handler(cancel.clone());

            let report = run::run(prepared, args, cancel).await?;
            Ok(report.exit_code())
        },

        (Commands::Plan(selection), _) => {
            protdb_cli::commands::plan::run(selection).await?;
            Ok(0)
        },

        (Commands::Species, _) => {
            protdb_cli::commands::species::run().await?;
            Ok(0)
        },
    }
}

fn report_error(e: &CliError) -> i32 {
    error!(error = %e, "Command failed");
    eprintln!("{} {}", "Error:".red().bold(), e);
    1
}

/// Cancel the run on Ctrl-C; running tools finish, nothing new starts
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            eprintln!(
                "{} waiting for running jobs to finish",
                "Interrupted:".yellow().bold()
            );
            cancel.cancel();
        }
    });
}
