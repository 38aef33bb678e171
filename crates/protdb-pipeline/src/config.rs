//! External tool configuration (protdb.yml)
//!
//! Each stage maps to a command template. Arguments may contain placeholders
//! that are filled in per job:
//!
//! | placeholder     | value                                              |
//! |-----------------|----------------------------------------------------|
//! | `{output}`      | temporary path the tool must write its output to   |
//! | `{input}`       | output of the first upstream job                   |
//! | `{inputs}`      | as a whole argument: one argument per upstream job |
//! | `{species}`     | species name, e.g. `human`                         |
//! | `{variant}`     | database variant, e.g. `pro-sw` (empty if none)    |
//! | `{stage}`       | stage name                                         |
//! | `{date_tag}`    | run date tag                                       |
//! | `{taxonomy}`    | NCBI taxonomy id                                   |
//! | `{proteome}`    | UniProt reference proteome id                      |
//! | `{scientific}`  | scientific species name                            |
//!
//! ```yaml
//! tools:
//!   fasta:
//!     program: python
//!     args: [src/create_fasta_dbs.py, -s, "{species}", -f, "{variant}", -o, "{output}", -vv]
//!   decoy:
//!     program: /opt/decoypyrat/decoyPYrat.py
//!     args: [--output_fasta, "{output}", "{input}"]
//! ```
//!
//! The target-decoy stage concatenates its inputs in-process unless a
//! `target_decoy` command is configured.

use crate::job::JobSpec;
use protdb_common::types::Stage;
use protdb_common::{ProtdbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default config file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "protdb.yml";

/// Command template for one external tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child process
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Arguments for one job, with placeholders substituted
    pub fn render_args(&self, job: &JobSpec, output: &Path) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.args.len());

        for arg in &self.args {
            if arg == "{inputs}" {
                rendered.extend(job.inputs.iter().map(|p| p.display().to_string()));
                continue;
            }

            let species = job.species();
            let value = arg
                .replace("{output}", &output.display().to_string())
                .replace(
                    "{input}",
                    &job.inputs
                        .first()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                )
                .replace("{species}", species.as_str())
                .replace("{variant}", job.variant().map(|v| v.as_str()).unwrap_or(""))
                .replace("{stage}", job.stage().as_str())
                .replace("{date_tag}", job.date_tag.as_str())
                .replace("{taxonomy}", species.taxonomy_id())
                .replace("{proteome}", species.proteome_id())
                .replace("{scientific}", species.scientific_name());
            rendered.push(value);
        }

        rendered
    }

    /// Shell-like rendering used in job log headers
    pub fn display_line(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Commands for every stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub fasta: ToolCommand,
    pub decoy: ToolCommand,
    /// `None` concatenates the fasta and decoy outputs in-process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_decoy: Option<ToolCommand>,
    pub categories: ToolCommand,
    pub relations: ToolCommand,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fasta: ToolCommand::new(
                "python",
                [
                    "src/create_fasta_dbs.py",
                    "-s",
                    "{species}",
                    "-f",
                    "{variant}",
                    "-o",
                    "{output}",
                    "-vv",
                ],
            ),
            decoy: ToolCommand::new(
                "python",
                [
                    "decoyPYrat.py",
                    "--output_fasta",
                    "{output}",
                    "--decoy_prefix",
                    "DECOY",
                    "{input}",
                ],
            ),
            target_decoy: None,
            categories: ToolCommand::new(
                "python",
                ["src/create_category_dbs.py", "-s", "{species}", "-o", "{output}", "-vv"],
            ),
            relations: ToolCommand::new(
                "python",
                ["src/create_relations_db.py", "-i", "{input}", "-o", "{output}", "-vv"],
            ),
        }
    }
}

impl ToolsConfig {
    /// External command for a stage; `None` means the stage runs in-process
    pub fn command_for(&self, stage: Stage) -> Option<&ToolCommand> {
        match stage {
            Stage::Fasta => Some(&self.fasta),
            Stage::Decoy => Some(&self.decoy),
            Stage::TargetDecoy => self.target_decoy.as_ref(),
            Stage::Categories => Some(&self.categories),
            Stage::Relations => Some(&self.relations),
        }
    }
}

/// Contents of protdb.yml
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tools: ToolsConfig,
}

impl PipelineConfig {
    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProtdbError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
            .map_err(|e| ProtdbError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ProtdbError::Config(format!("Failed to parse YAML: {}", e)))
    }

    /// Load `path` if given, else `protdb.yml` in the working directory if
    /// present, else the built-in defaults
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }
}
