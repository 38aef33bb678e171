//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod plan;
pub mod run;
pub mod species;

use crate::error::Result;
use crate::SelectionArgs;
use protdb_common::types::{DateTag, Species, Variant};
use protdb_pipeline::{Grid, JobGraph, PathResolver};

/// Validated form of [`SelectionArgs`]
#[derive(Debug, Clone)]
pub struct Selection {
    pub species: Vec<Species>,
    pub variants: Vec<Variant>,
    pub date_tag: DateTag,
    pub resolver: PathResolver,
    pub grid: Grid,
}

impl Selection {
    pub fn build_graph(&self) -> Result<JobGraph> {
        let graph = JobGraph::build(
            &self.species,
            &self.variants,
            &self.date_tag,
            &self.resolver,
            self.grid,
        )?;
        Ok(graph)
    }
}

impl SelectionArgs {
    /// Parse species, variants and the date tag; fails before anything runs
    pub fn resolve(&self) -> Result<Selection> {
        let species = self
            .species_list
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<Species>())
            .collect::<protdb_common::Result<Vec<_>>>()?;

        let variants = self
            .variant_list
            .iter()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.parse::<Variant>())
            .collect::<protdb_common::Result<Vec<_>>>()?;

        let date_tag = match &self.date_tag {
            Some(tag) => tag.parse()?,
            None => DateTag::current(),
        };

        Ok(Selection {
            species,
            variants,
            date_tag,
            resolver: PathResolver::new(&self.output_dir, &self.log_dir),
            grid: self.grid,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use std::path::PathBuf;

    fn args(species: &[&str], variants: &[&str], date_tag: Option<&str>) -> SelectionArgs {
        SelectionArgs {
            species_list: species.iter().map(|s| s.to_string()).collect(),
            variant_list: variants.iter().map(|s| s.to_string()).collect(),
            date_tag: date_tag.map(String::from),
            output_dir: PathBuf::from("dbs"),
            log_dir: PathBuf::from("logs"),
            grid: Grid::All,
        }
    }

    #[test]
    fn test_resolve() {
        let selection = args(&["Human", " mouse"], &["pro-sw", "uni-sw-tr"], Some("202401"))
            .resolve()
            .unwrap();
        assert_eq!(selection.species, vec![Species::Human, Species::Mouse]);
        assert_eq!(selection.variants, vec![Variant::ProSw, Variant::UniSwTr]);
        assert_eq!(selection.date_tag.as_str(), "202401");
        assert_eq!(selection.build_graph().unwrap().len(), 2 * 2 * 3 + 2 * 2);
    }

    #[test]
    fn test_default_date_tag_is_current_month() {
        let selection = args(&["rat"], &[], None).resolve().unwrap();
        assert_eq!(selection.date_tag, DateTag::current());
    }

    #[test]
    fn test_unknown_species_fails() {
        let err = args(&["human", "dog"], &[], Some("202401")).resolve().unwrap_err();
        assert!(matches!(err, CliError::InvalidSelection(_)));
    }

    #[test]
    fn test_unknown_variant_fails() {
        let err = args(&["human"], &["pro"], Some("202401")).resolve().unwrap_err();
        assert!(matches!(err, CliError::InvalidSelection(_)));
    }

    #[test]
    fn test_invalid_date_tag_fails() {
        let err = args(&["human"], &[], Some("2024-01")).resolve().unwrap_err();
        assert!(matches!(err, CliError::InvalidSelection(_)));
    }
}
