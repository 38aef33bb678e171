//! Build automation tasks for protdb
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for protdb", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<protdb_cli::Cli>();

    let content = format!(
        r#"# protdb CLI Reference

This documentation is generated from the CLI source code. Last updated: {}.

## Overview

protdb generates versioned protein databases: a FASTA, decoy and
target-decoy file per species and variant, plus category and relation
tables per species. Each file is produced by an external tool configured in
`protdb.yml`; protdb orders the tools, runs independent ones in parallel and
reports the outcome of every job.

## Quick Start

```bash
# Show what would run
protdb plan --species-list human,mouse --variant-list pro-sw,uni-sw-tr

# Build everything for January 2024, four tools at a time
protdb run --species-list human,mouse --variant-list pro-sw,uni-sw-tr \
  --date-tag 202401 --output-dir dbs --log-dir logs --concurrency 4

# Resume after fixing a failed tool
protdb run --species-list human,mouse --variant-list pro-sw,uni-sw-tr \
  --date-tag 202401 --skip-existing
```

## Commands

{}

## Environment Variables

- `PROTDB_OUTPUT_DIR` - Root directory for generated databases (default: `dbs`)
- `PROTDB_LOG_DIR` - Root directory for job logs and run reports (default: `logs`)
- `PROTDB_CONCURRENCY` - Maximum number of tools running at once (default: `4`)
- `PROTDB_TIMEOUT_SECS` - Per-job timeout in seconds
- `PROTDB_CONFIG` - Tool configuration file (default: `./protdb.yml`)
- `PROTDB_LOG_LEVEL`, `PROTDB_LOG_FORMAT`, `PROTDB_LOG_OUTPUT`, `PROTDB_LOG_FILTER` - Logging
- `RUST_LOG` - Additional tracing filter directives

## Tool Configuration

Example `protdb.yml`:

```yaml
tools:
  fasta:
    program: python
    args: [src/create_fasta_dbs.py, -s, "{{species}}", -f, "{{variant}}", -o, "{{output}}", -vv]
  decoy:
    program: python
    args: [decoyPYrat.py, --output_fasta, "{{output}}", --decoy_prefix, DECOY, "{{input}}"]
```

Stages without an entry use the built-in defaults. The target-decoy stage
concatenates the FASTA and decoy files unless a `target_decoy` tool is given.

---

*This file is generated. To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
