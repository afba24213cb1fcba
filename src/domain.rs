use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

static CHEMBL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^CHEMBL\d+$").unwrap());
static SCHEMBL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^SCHEMBL\d+$").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d{4})").unwrap());

/// ChEMBL compound identifier, e.g. `CHEMBL25`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChemblId(String);

impl ChemblId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChemblId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChemblId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !CHEMBL_RE.is_match(&normalized) {
            return Err(KiraError::InvalidChemblId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl TryFrom<String> for ChemblId {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChemblId> for String {
    fn from(value: ChemblId) -> Self {
        value.0
    }
}

/// ChEMBL target identifier. Same shape as a compound id, different namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetChemblId(String);

impl TargetChemblId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetChemblId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetChemblId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !CHEMBL_RE.is_match(&normalized) {
            return Err(KiraError::InvalidTargetId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// SureChEMBL compound identifier, e.g. `SCHEMBL12345`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemblId(String);

impl SchemblId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemblId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SchemblId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !SCHEMBL_RE.is_match(&normalized) {
            return Err(KiraError::InvalidSchemblId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Name of an analysis; every state file of a run is prefixed with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisName(String);

impl AnalysisName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnalysisName {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && !trimmed.starts_with('.');
        if !is_valid {
            return Err(KiraError::InvalidAnalysisName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// How raw protein identifiers in the input are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierMode {
    /// HGNC gene symbols, translated to UniProt accessions first.
    Symbol,
    /// UniProt accessions.
    Accession,
    /// ChEMBL target ids, used as-is.
    TargetId,
}

impl IdentifierMode {
    /// Column expected in a delimited target file.
    pub fn column(self) -> &'static str {
        match self {
            IdentifierMode::Symbol => "symbol",
            IdentifierMode::Accession => "uniprot",
            IdentifierMode::TargetId => "chembl_target",
        }
    }
}

impl fmt::Display for IdentifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierMode::Symbol => write!(f, "symbol"),
            IdentifierMode::Accession => write!(f, "accession"),
            IdentifierMode::TargetId => write!(f, "target-id"),
        }
    }
}

/// A protein target as supplied by the user, tagged with how to resolve it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetInput {
    BySymbol(String),
    ByAccession(String),
    ByTargetId(String),
}

impl TargetInput {
    pub fn new(raw: &str, mode: IdentifierMode) -> Self {
        let raw = raw.trim().to_string();
        match mode {
            IdentifierMode::Symbol => TargetInput::BySymbol(raw),
            IdentifierMode::Accession => TargetInput::ByAccession(raw),
            IdentifierMode::TargetId => TargetInput::ByTargetId(raw),
        }
    }

    /// The raw identifier; used as the bioactivity cache key.
    pub fn key(&self) -> &str {
        match self {
            TargetInput::BySymbol(value)
            | TargetInput::ByAccession(value)
            | TargetInput::ByTargetId(value) => value,
        }
    }

    pub fn mode(&self) -> IdentifierMode {
        match self {
            TargetInput::BySymbol(_) => IdentifierMode::Symbol,
            TargetInput::ByAccession(_) => IdentifierMode::Accession,
            TargetInput::ByTargetId(_) => IdentifierMode::TargetId,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Separator {
    Comma,
    Tab,
    Semicolon,
}

impl Separator {
    pub fn as_byte(self) -> u8 {
        match self {
            Separator::Comma => b',',
            Separator::Tab => b'\t',
            Separator::Semicolon => b';',
        }
    }
}

impl FromStr for Separator {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "comma" | "," | "csv" => Ok(Separator::Comma),
            "tab" | "\\t" | "tsv" => Ok(Separator::Tab),
            "semicolon" | ";" => Ok(Separator::Semicolon),
            _ if value == "\t" => Ok(Separator::Tab),
            _ => Err(KiraError::InvalidSeparator(value.to_string())),
        }
    }
}

/// Rendering environment of the browser; selects the page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Linux,
    Mac,
    Windows,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Linux => write!(f, "linux"),
            Region::Mac => write!(f, "mac"),
            Region::Windows => write!(f, "windows"),
        }
    }
}

/// One row read off the patent listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatentRecord {
    pub patent_number: String,
    pub publication_date: String,
    /// Full classification cell text; the filter key is its first token.
    pub ipc: String,
    pub assignee: String,
}

impl PatentRecord {
    pub fn classification_code(&self) -> Option<&str> {
        self.ipc.split_whitespace().next()
    }

    pub fn publication_year(&self) -> Option<i32> {
        publication_year(&self.publication_date)
    }
}

/// Year from the leading token of a date like `2014-03-27`.
pub fn publication_year(date: &str) -> Option<i32> {
    YEAR_RE
        .captures(date)
        .and_then(|caps| caps.get(1))
        .and_then(|year| year.as_str().parse().ok())
}
