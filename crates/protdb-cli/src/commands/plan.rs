//! `protdb plan` command implementation
//!
//! Builds and validates the job graph exactly as `protdb run` would and prints
//! it level by level. Nothing is executed and no directory is created.

use crate::error::Result;
use crate::SelectionArgs;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use protdb_pipeline::JobGraph;

pub async fn run(args: &SelectionArgs) -> Result<()> {
    let selection = args.resolve()?;
    let graph = selection.build_graph()?;

    if graph.is_empty() {
        println!("The selection produces no jobs.");
        println!("Pass --variant-list to build FASTA files, or use --grid all.");
        return Ok(());
    }

    println!(
        "{} {}",
        "Plan for date tag".cyan().bold(),
        selection.date_tag.as_str().cyan().bold()
    );
    println!();
    println!("{}", format_plan(&graph));
    println!(
        "{} jobs in {} levels",
        graph.len(),
        graph.levels().len()
    );

    Ok(())
}

/// Table of every job, grouped by dependency level
pub fn format_plan(graph: &JobGraph) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Level", "Job", "Depends on", "Output", "Log"]);

    for (level, ids) in graph.levels().iter().enumerate() {
        for &id in ids {
            let job = graph.job(id);
            let depends_on = job
                .depends_on
                .iter()
                .map(|dep| graph.job(*dep).key.to_string())
                .collect::<Vec<_>>()
                .join("\n");

            table.add_row(vec![
                level.to_string(),
                job.key.to_string(),
                if depends_on.is_empty() { "-".to_string() } else { depends_on },
                job.output_path.display().to_string(),
                job.log_path.display().to_string(),
            ]);
        }
    }

    table.to_string()
}
