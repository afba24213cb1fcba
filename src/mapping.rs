//! Static identifier cross-reference tables.
//!
//! Tables are loaded once per stage invocation and never written. Every
//! loader accepts gzip-compressed input (`*.gz`).

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::domain::{ChemblId, SchemblId, TargetChemblId};
use crate::error::KiraError;
use crate::fs_util;
use crate::http;

pub const HGNC_SYMBOL_COLUMN: &str = "Approved symbol";
pub const HGNC_UNIPROT_COLUMN: &str = "UniProt ID(supplied by UniProt)";
pub const CHEMBL_COLUMN: &str = "chembl";
pub const SCHEMBL_COLUMN: &str = "schembl_id";

/// Tables consumed by the identifier resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverTables {
    pub uniprot_to_target: HashMap<String, TargetChemblId>,
    pub symbol_to_uniprot: Option<HashMap<String, String>>,
}

/// ChEMBL compound id to SureChEMBL id.
#[derive(Debug, Clone, Default)]
pub struct CompoundMapping {
    entries: HashMap<ChemblId, SchemblId>,
}

impl CompoundMapping {
    pub fn new(entries: HashMap<ChemblId, SchemblId>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: &ChemblId) -> Option<&SchemblId> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads ChEMBL's `chembl_uniprot_mapping.txt`: a comment line followed by
/// headerless tab-separated `uniprot, chembl_id, name, type` rows.
pub fn load_uniprot_to_target(path: &Path) -> Result<HashMap<String, TargetChemblId>, KiraError> {
    let content = fs_util::read_text_maybe_gz(path)?;
    let mut table = HashMap::new();
    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let (Some(uniprot), Some(chembl)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(target) = chembl.parse::<TargetChemblId>() else {
            debug!(line, "skipping malformed uniprot mapping row");
            continue;
        };
        table.insert(uniprot.trim().to_string(), target);
    }
    if table.is_empty() {
        return Err(mapping_error(path, "no uniprot mappings found"));
    }
    info!(path = %path.display(), entries = table.len(), "loaded uniprot to ChEMBL target mapping");
    Ok(table)
}

/// Reads an HGNC custom download with symbol and UniProt columns.
pub fn load_symbol_to_uniprot(path: &Path) -> Result<HashMap<String, String>, KiraError> {
    let rows = read_columns(path, b'\t', &[HGNC_SYMBOL_COLUMN, HGNC_UNIPROT_COLUMN])?;
    let mut table = HashMap::new();
    for row in rows {
        let symbol = row[0].trim();
        let Some(uniprot) = row[1].split([',', ' ']).map(str::trim).find(|v| !v.is_empty())
        else {
            continue;
        };
        if symbol.is_empty() {
            continue;
        }
        table.insert(symbol.to_string(), uniprot.to_string());
    }
    info!(path = %path.display(), entries = table.len(), "loaded HGNC symbol to uniprot mapping");
    Ok(table)
}

/// Reads the ChEMBL to SureChEMBL table, either a JSON object or a TSV with
/// `chembl` and `schembl_id` columns.
pub fn load_compound_mapping(path: &Path) -> Result<CompoundMapping, KiraError> {
    let pairs = if is_json(path) {
        let content = fs_util::read_text_maybe_gz(path)?;
        let raw: HashMap<String, String> =
            serde_json::from_str(&content).map_err(|err| mapping_error(path, &err.to_string()))?;
        raw.into_iter().collect::<Vec<_>>()
    } else {
        read_columns(path, b'\t', &[CHEMBL_COLUMN, SCHEMBL_COLUMN])?
            .into_iter()
            .map(|mut row| {
                let schembl = row.pop().unwrap_or_default();
                let chembl = row.pop().unwrap_or_default();
                (chembl, schembl)
            })
            .collect()
    };

    let mut entries = HashMap::new();
    for (chembl, schembl) in pairs {
        let (Ok(chembl), Ok(schembl)) = (chembl.parse::<ChemblId>(), schembl.parse::<SchemblId>())
        else {
            continue;
        };
        entries.insert(chembl, schembl);
    }
    info!(path = %path.display(), entries = entries.len(), "loaded compound mapping");
    Ok(CompoundMapping::new(entries))
}

/// Reads the named columns of a delimited file with a header row.
///
/// Returns one `Vec` per record with values in the order of `columns`. A
/// missing column is a configuration error.
pub fn read_columns(
    path: &Path,
    delimiter: u8,
    columns: &[&str],
) -> Result<Vec<Vec<String>>, KiraError> {
    let reader = fs_util::open_maybe_gz(path)?;
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);
    let headers = csv
        .headers()
        .map_err(|err| mapping_error(path, &err.to_string()))?
        .clone();

    let mut indices = Vec::with_capacity(columns.len());
    for column in columns {
        let index = headers
            .iter()
            .position(|header| header.trim() == *column)
            .ok_or_else(|| KiraError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            })?;
        indices.push(index);
    }

    let mut rows = Vec::new();
    for record in csv.records() {
        let record = record.map_err(|err| mapping_error(path, &err.to_string()))?;
        rows.push(
            indices
                .iter()
                .map(|index| record.get(*index).unwrap_or("").trim().to_string())
                .collect(),
        );
    }
    Ok(rows)
}

pub trait MappingClient: Send + Sync {
    fn download_chembl_uniprot(&self, release: &str, destination: &Path) -> Result<(), KiraError>;
}

#[derive(Clone)]
pub struct MappingHttpClient {
    client: Client,
}

impl MappingHttpClient {
    pub fn new() -> Result<Self, KiraError> {
        let headers = http::default_headers(KiraError::MappingHttp)?;
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| KiraError::MappingHttp(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn chembl_uniprot_url(release: &str) -> String {
        format!(
            "https://ftp.ebi.ac.uk/pub/databases/chembl/ChEMBLdb/releases/chembl_{release}/chembl_uniprot_mapping.txt"
        )
    }
}

impl MappingClient for MappingHttpClient {
    fn download_chembl_uniprot(&self, release: &str, destination: &Path) -> Result<(), KiraError> {
        let url = Self::chembl_uniprot_url(release);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| KiraError::MappingHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "mapping download failed".to_string());
            return Err(KiraError::MappingStatus { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| KiraError::MappingHttp(err.to_string()))?;
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        let mut file =
            File::create(destination).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        file.write_all(&bytes)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        info!(release, destination = %destination.display(), "downloaded ChEMBL uniprot mapping");
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default()
        .to_lowercase();
    name.ends_with(".json") || name.ends_with(".json.gz")
}

fn mapping_error(path: &Path, message: &str) -> KiraError {
    KiraError::MappingTable {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}
