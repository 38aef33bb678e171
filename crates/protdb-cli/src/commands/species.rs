//! `protdb species` command implementation

use crate::error::Result;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use protdb_common::types::{Species, Variant};

pub async fn run() -> Result<()> {
    println!("{}", "Species:".cyan().bold());
    println!("{}", format_species());
    println!();
    println!("{}", "Variants:".cyan().bold());
    println!("{}", format_variants());
    Ok(())
}

pub fn format_species() -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Name", "Scientific name", "Taxonomy", "Reference proteome"]);

    for species in Species::ALL {
        table.add_row(vec![
            species.as_str(),
            species.scientific_name(),
            species.taxonomy_id(),
            species.proteome_id(),
        ]);
    }

    table.to_string()
}

pub fn format_variants() -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Name", "Scope", "Entries"]);

    for variant in Variant::ALL {
        table.add_row(vec![
            variant.as_str(),
            if variant.is_proteome() {
                "reference proteome"
            } else {
                "whole organism"
            },
            if variant.is_reviewed_only() {
                "Swiss-Prot"
            } else {
                "Swiss-Prot + TrEMBL"
            },
        ]);
    }

    table.to_string()
}
