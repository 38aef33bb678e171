//! Canonical file naming
//!
//! Every output and log path is a pure function of
//! `(species, variant, stage, date_tag)` plus the two root directories, so
//! re-running with the same date tag addresses the same files:
//!
//! ```text
//! {output_root}/{date_tag}/{species}_{date_tag}_{variant}.fasta
//! {output_root}/{date_tag}/{species}_{date_tag}_{variant}.decoy.fasta
//! {output_root}/{date_tag}/{species}_{date_tag}_{variant}.target-decoy.fasta
//! {output_root}/{date_tag}/{species}_{date_tag}.categories.tsv
//! {output_root}/{date_tag}/{species}_{date_tag}.cat.tsv
//! {log_root}/{date_tag}/{stage}.{species}[-{variant}].log
//! ```

use protdb_common::types::{DateTag, Species, Stage, Variant};
use protdb_common::{ProtdbError, Result};
use std::path::{Path, PathBuf};

/// File name of a stage's output, without directory
pub fn output_file_name(
    species: Species,
    variant: Option<Variant>,
    stage: Stage,
    date_tag: &DateTag,
) -> Result<String> {
    let variant = check_variant(variant, stage)?;

    let name = match (stage, variant) {
        (Stage::Fasta, Some(v)) => format!("{}_{}_{}.fasta", species, date_tag, v),
        (Stage::Decoy, Some(v)) => format!("{}_{}_{}.decoy.fasta", species, date_tag, v),
        (Stage::TargetDecoy, Some(v)) => {
            format!("{}_{}_{}.target-decoy.fasta", species, date_tag, v)
        },
        (Stage::Categories, None) => format!("{}_{}.categories.tsv", species, date_tag),
        (Stage::Relations, None) => format!("{}_{}.cat.tsv", species, date_tag),
        // check_variant already rejected every other combination
        (stage, variant) => return Err(variant_mismatch(variant, stage)),
    };

    Ok(name)
}

/// File name of a job's log, without directory
pub fn log_file_name(species: Species, variant: Option<Variant>, stage: Stage) -> Result<String> {
    let name = match check_variant(variant, stage)? {
        Some(v) => format!("{}.{}-{}.log", stage, species, v),
        None => format!("{}.{}.log", stage, species),
    };
    Ok(name)
}

fn check_variant(variant: Option<Variant>, stage: Stage) -> Result<Option<Variant>> {
    if variant.is_some() == stage.requires_variant() {
        Ok(variant)
    } else {
        Err(variant_mismatch(variant, stage))
    }
}

fn variant_mismatch(variant: Option<Variant>, stage: Stage) -> ProtdbError {
    match variant {
        Some(v) => ProtdbError::InvalidVariant(format!("{} (stage '{}' takes no variant)", v, stage)),
        None => ProtdbError::InvalidVariant(format!("<none> (stage '{}' requires one)", stage)),
    }
}

/// Resolves job paths under an output root and a log root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    output_root: PathBuf,
    log_root: PathBuf,
}

impl PathResolver {
    pub fn new(output_root: impl Into<PathBuf>, log_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            log_root: log_root.into(),
        }
    }

    /// Directory holding every artifact of a run
    pub fn output_dir(&self, date_tag: &DateTag) -> PathBuf {
        self.output_root.join(date_tag.as_str())
    }

    /// Directory holding every job log of a run
    pub fn log_dir(&self, date_tag: &DateTag) -> PathBuf {
        self.log_root.join(date_tag.as_str())
    }

    pub fn resolve(
        &self,
        species: Species,
        variant: Option<Variant>,
        stage: Stage,
        date_tag: &DateTag,
    ) -> Result<PathBuf> {
        let name = output_file_name(species, variant, stage, date_tag)?;
        Ok(self.output_dir(date_tag).join(name))
    }

    pub fn resolve_log(
        &self,
        species: Species,
        variant: Option<Variant>,
        stage: Stage,
        date_tag: &DateTag,
    ) -> Result<PathBuf> {
        let name = log_file_name(species, variant, stage)?;
        Ok(self.log_dir(date_tag).join(name))
    }
}

/// Hidden sibling of `final_path` used while an artifact is being written.
///
/// Living in the same directory keeps the final rename on one filesystem.
pub fn temp_path_for(final_path: &Path, token: &str) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{}.{}.tmp", name, token))
}
