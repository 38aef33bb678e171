//! Domain types shared across protdb
//!
//! The species catalogue, database variants, pipeline stages and the date tag
//! that versions every generated file.

use crate::error::{ProtdbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Species
// ============================================================================

/// Species a protein database can be generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Human,
    Mouse,
    Rat,
    Pig,
    Rabbit,
    Zebrafish,
    Ecoli,
}

impl Species {
    /// Every supported species, in catalogue order
    pub const ALL: [Species; 7] = [
        Species::Human,
        Species::Mouse,
        Species::Rat,
        Species::Pig,
        Species::Rabbit,
        Species::Zebrafish,
        Species::Ecoli,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Human => "human",
            Species::Mouse => "mouse",
            Species::Rat => "rat",
            Species::Pig => "pig",
            Species::Rabbit => "rabbit",
            Species::Zebrafish => "zebrafish",
            Species::Ecoli => "ecoli",
        }
    }

    /// Scientific (binomial) name
    pub fn scientific_name(&self) -> &'static str {
        match self {
            Species::Human => "Homo sapiens",
            Species::Mouse => "Mus musculus",
            Species::Rat => "Rattus norvegicus",
            Species::Pig => "Sus scrofa",
            Species::Rabbit => "Oryctolagus cuniculus",
            Species::Zebrafish => "Danio rerio",
            Species::Ecoli => "Escherichia coli",
        }
    }

    /// NCBI taxonomy identifier
    pub fn taxonomy_id(&self) -> &'static str {
        match self {
            Species::Human => "9606",
            Species::Mouse => "10090",
            Species::Rat => "10116",
            Species::Pig => "9823",
            Species::Rabbit => "9986",
            Species::Zebrafish => "7955",
            Species::Ecoli => "562",
        }
    }

    /// UniProt reference proteome identifier
    pub fn proteome_id(&self) -> &'static str {
        match self {
            Species::Human => "UP000005640",
            Species::Mouse => "UP000000589",
            Species::Rat => "UP000002494",
            Species::Pig => "UP000008227",
            Species::Rabbit => "UP000001811",
            Species::Zebrafish => "UP000000437",
            Species::Ecoli => "UP000000558",
        }
    }
}

impl FromStr for Species {
    type Err = ProtdbError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Species::ALL
            .into_iter()
            .find(|species| species.as_str() == lowered)
            .ok_or_else(|| ProtdbError::InvalidSpecies(s.to_string()))
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Variant
// ============================================================================

/// Database variant of a FASTA file
///
/// The prefix selects the sequence universe (`pro`: reference proteome,
/// `uni`: the whole organism in UniProtKB). The suffix selects the review
/// status (`sw`: Swiss-Prot only, `sw-tr`: Swiss-Prot plus TrEMBL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    ProSw,
    ProSwTr,
    UniSw,
    UniSwTr,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::ProSw,
        Variant::ProSwTr,
        Variant::UniSw,
        Variant::UniSwTr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::ProSw => "pro-sw",
            Variant::ProSwTr => "pro-sw-tr",
            Variant::UniSw => "uni-sw",
            Variant::UniSwTr => "uni-sw-tr",
        }
    }

    /// Restricted to the species' reference proteome
    pub fn is_proteome(&self) -> bool {
        matches!(self, Variant::ProSw | Variant::ProSwTr)
    }

    /// Restricted to reviewed (Swiss-Prot) entries
    pub fn is_reviewed_only(&self) -> bool {
        matches!(self, Variant::ProSw | Variant::UniSw)
    }
}

impl FromStr for Variant {
    type Err = ProtdbError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Variant::ALL
            .into_iter()
            .find(|variant| variant.as_str() == lowered)
            .ok_or_else(|| ProtdbError::InvalidVariant(s.to_string()))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Stage
// ============================================================================

/// Pipeline stage a job belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Fasta,
    Decoy,
    TargetDecoy,
    Categories,
    Relations,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Fasta,
        Stage::Decoy,
        Stage::TargetDecoy,
        Stage::Categories,
        Stage::Relations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fasta => "fasta",
            Stage::Decoy => "decoy",
            Stage::TargetDecoy => "target-decoy",
            Stage::Categories => "categories",
            Stage::Relations => "relations",
        }
    }

    /// Whether jobs of this stage are keyed by a database variant
    pub fn requires_variant(&self) -> bool {
        matches!(self, Stage::Fasta | Stage::Decoy | Stage::TargetDecoy)
    }
}

impl FromStr for Stage {
    type Err = ProtdbError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == lowered)
            .ok_or_else(|| ProtdbError::InvalidStage(s.to_string()))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Date tag
// ============================================================================

/// Version identifier of a generation run: `YYYYMM` with an optional
/// `.suffix` to disambiguate several runs in the same month (e.g. `202401.2`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateTag(String);

impl DateTag {
    /// Tag for the current UTC month
    pub fn current() -> Self {
        Self(chrono::Utc::now().format("%Y%m").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `YYYYMM` part, without suffix
    pub fn year_month(&self) -> &str {
        &self.0[..6]
    }

    pub fn suffix(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, suffix)| suffix)
    }
}

impl FromStr for DateTag {
    type Err = ProtdbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ProtdbError::InvalidDateTag(s.to_string());

        let (year_month, suffix) = match s.split_once('.') {
            Some((ym, suffix)) => (ym, Some(suffix)),
            None => (s, None),
        };

        if year_month.len() != 6 || !year_month.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let month: u32 = year_month[4..].parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }

        if let Some(suffix) = suffix {
            let valid_suffix = !suffix.is_empty()
                && suffix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid_suffix {
                return Err(invalid());
            }
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for DateTag {
    type Error = ProtdbError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DateTag> for String {
    fn from(tag: DateTag) -> Self {
        tag.0
    }
}

impl fmt::Display for DateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
