//! ChEMBL to SureChEMBL identifier harmonization.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, JsonMapCodec, StateCodec};
use crate::config::HarmonizerSettings;
use crate::domain::{AnalysisName, ChemblId, SchemblId};
use crate::error::KiraError;
use crate::mapping::{self, CHEMBL_COLUMN, CompoundMapping, SCHEMBL_COLUMN};
use crate::pipeline::{ProgressEvent, ProgressSink};
use crate::pubchem::{self, NameClient};
use crate::store::Store;

pub const NAME_COLUMN: &str = "name";

pub type ChemicalTable = CheckpointStore<ChemicalTableCodec>;
pub type NameCache = CheckpointStore<JsonMapCodec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarmonizedChemical {
    pub schembl_id: Option<SchemblId>,
    pub name: String,
}

/// Tab-separated `chembl, schembl_id, name` table.
pub struct ChemicalTableCodec;

impl StateCodec for ChemicalTableCodec {
    type Key = ChemblId;
    type Value = HarmonizedChemical;

    fn decode(bytes: &[u8]) -> Result<Vec<(ChemblId, HarmonizedChemical)>, String> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(bytes);
        let headers = reader.headers().map_err(|err| err.to_string())?.clone();
        let column = |name: &str| headers.iter().position(|header| header == name);
        let chembl_idx = column(CHEMBL_COLUMN).ok_or("missing chembl column")?;
        let schembl_idx = column(SCHEMBL_COLUMN);
        let name_idx = column(NAME_COLUMN);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| err.to_string())?;
            let chembl = record
                .get(chembl_idx)
                .unwrap_or_default()
                .parse::<ChemblId>()
                .map_err(|err| err.to_string())?;
            let schembl_id = match schembl_idx.and_then(|idx| record.get(idx)).map(str::trim) {
                None | Some("") => None,
                Some(value) => Some(value.parse::<SchemblId>().map_err(|err| err.to_string())?),
            };
            let name = name_idx
                .and_then(|idx| record.get(idx))
                .unwrap_or_default()
                .to_string();
            rows.push((chembl, HarmonizedChemical { schembl_id, name }));
        }
        Ok(rows)
    }

    fn encode(entries: &[(&ChemblId, &HarmonizedChemical)]) -> Result<Vec<u8>, String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer
            .write_record([CHEMBL_COLUMN, SCHEMBL_COLUMN, NAME_COLUMN])
            .map_err(|err| err.to_string())?;
        for (chembl, row) in entries {
            let schembl = row
                .schembl_id
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or_default();
            writer
                .write_record([chembl.as_str(), schembl, row.name.as_str()])
                .map_err(|err| err.to_string())?;
        }
        writer.into_inner().map_err(|err| err.to_string())
    }
}

/// Where the compounds to harmonize come from.
#[derive(Debug, Clone)]
pub enum CompoundSource {
    /// Output of the bioactivity extractor: target key to compound list.
    FromTargets(BTreeMap<String, Vec<ChemblId>>),
    /// A caller-supplied list of compounds.
    CompoundList(Vec<ChemblId>),
}

impl CompoundSource {
    /// Unique compounds in first-seen order, plus the number of targets that
    /// contributed nothing.
    fn compounds(&self) -> (Vec<ChemblId>, usize) {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut genes_skipped = 0;
        let lists: Vec<&[ChemblId]> = match self {
            CompoundSource::FromTargets(targets) => targets
                .values()
                .filter_map(|compounds| {
                    if compounds.is_empty() {
                        genes_skipped += 1;
                        None
                    } else {
                        Some(compounds.as_slice())
                    }
                })
                .collect(),
            CompoundSource::CompoundList(compounds) => vec![compounds.as_slice()],
        };
        for id in lists.into_iter().flatten() {
            if seen.insert(id.clone()) {
                ordered.push(id.clone());
            }
        }
        (ordered, genes_skipped)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarmonizeReport {
    pub genes_skipped: usize,
    pub compounds: usize,
    pub already_harmonized: usize,
    pub newly_harmonized: usize,
    pub unmapped: usize,
    pub table_rows: usize,
}

pub struct Harmonizer<'a, N: NameClient> {
    names: &'a N,
    mapping: &'a CompoundMapping,
    store: &'a Store,
    settings: HarmonizerSettings,
}

impl<'a, N: NameClient> Harmonizer<'a, N> {
    pub fn new(
        names: &'a N,
        mapping: &'a CompoundMapping,
        store: &'a Store,
        settings: HarmonizerSettings,
    ) -> Self {
        Self {
            names,
            mapping,
            store,
            settings,
        }
    }

    pub fn harmonize(
        &self,
        source: &CompoundSource,
        analysis: &AnalysisName,
        sink: &dyn ProgressSink,
    ) -> Result<HarmonizeReport, KiraError> {
        let mut table = ChemicalTable::open(
            self.store.chemicals_path(analysis),
            Some(self.settings.flush_every),
        )?;
        let mut names = NameCache::open(self.store.chemical_names_path(analysis), None)?;
        let mut unmapped =
            NameCache::open(self.store.unmapped_chemicals_path(analysis), None)?;

        let (compounds, genes_skipped) = source.compounds();
        let mut report = HarmonizeReport {
            genes_skipped,
            compounds: compounds.len(),
            ..Default::default()
        };
        info!(
            analysis = %analysis,
            compounds = compounds.len(),
            genes_skipped,
            "harmonizing chemicals for patent retrieval"
        );

        for (index, id) in compounds.iter().enumerate() {
            if is_harmonized(&table, id) {
                report.already_harmonized += 1;
                continue;
            }
            sink.event(ProgressEvent::item("harmonize", index + 1, compounds.len(), id.as_str()));

            let name = self.name_for(&mut names, id)?;
            let Some(schembl_id) = self.external_id(&mut unmapped, id, &name)? else {
                debug!(compound = %id, "no SureChEMBL mapping");
                report.unmapped += 1;
                continue;
            };

            report.newly_harmonized += 1;
            let flushed = table.put(
                id.clone(),
                HarmonizedChemical {
                    schembl_id: Some(schembl_id),
                    name,
                },
            )?;
            if flushed {
                names.flush()?;
                unmapped.flush_if_dirty()?;
                debug!(rows = table.len(), "checkpointed harmonized chemicals");
            }
        }

        table.retain(|_, row| row.schembl_id.is_some());
        table.flush()?;
        names.flush()?;
        unmapped.flush_if_dirty()?;

        report.table_rows = table.len();
        if report.unmapped > 0 {
            warn!(
                unmapped = report.unmapped,
                "chemicals without a SureChEMBL identifier were skipped"
            );
        }
        info!(
            newly_harmonized = report.newly_harmonized,
            table_rows = report.table_rows,
            "harmonization finished"
        );
        Ok(report)
    }

    fn name_for(&self, names: &mut NameCache, id: &ChemblId) -> Result<String, KiraError> {
        let key = id.as_str().to_string();
        if let Some(name) = names.get(&key) {
            return Ok(name.clone());
        }
        let name = pubchem::display_name(self.names, id);
        names.put(key, name.clone())?;
        Ok(name)
    }

    /// The mapping table is always consulted; the synonym search runs at
    /// most once per compound and its misses are recorded in `unmapped`.
    fn external_id(
        &self,
        unmapped: &mut NameCache,
        id: &ChemblId,
        name: &str,
    ) -> Result<Option<SchemblId>, KiraError> {
        if let Some(schembl_id) = self.mapping.get(id) {
            return Ok(Some(schembl_id.clone()));
        }
        let key = id.as_str().to_string();
        if !self.settings.synonym_fallback || unmapped.contains(&key) {
            return Ok(None);
        }
        let found = pubchem::schembl_from_synonyms(self.names, name);
        if found.is_none() {
            unmapped.put(key, name.to_string())?;
        }
        Ok(found)
    }
}

fn is_harmonized(table: &ChemicalTable, id: &ChemblId) -> bool {
    table
        .get(id)
        .map(|row| row.schembl_id.is_some())
        .unwrap_or(false)
}

/// Reads a caller-supplied compound list (TSV with a `chembl` column).
pub fn load_compound_list(path: &Path) -> Result<Vec<ChemblId>, KiraError> {
    let rows = mapping::read_columns(path, b'\t', &[CHEMBL_COLUMN])?;
    let mut compounds = Vec::new();
    for value in rows.into_iter().filter_map(|mut row| row.pop()) {
        match value.parse::<ChemblId>() {
            Ok(id) => compounds.push(id),
            Err(_) if value.is_empty() => {}
            Err(err) => warn!(error = %err, "skipping compound list entry"),
        }
    }
    Ok(compounds)
}

/// Harmonized rows with an external id, as consumed by the patent stage.
pub fn load_harmonized(
    store: &Store,
    analysis: &AnalysisName,
) -> Result<Vec<(ChemblId, SchemblId)>, KiraError> {
    let path = store.chemicals_path(analysis);
    if !path.as_std_path().exists() {
        return Err(KiraError::MissingStageOutput(path.to_string()));
    }
    let table = ChemicalTable::open(path, None)?;
    Ok(table
        .iter()
        .filter_map(|(chembl, row)| {
            row.schembl_id
                .as_ref()
                .map(|schembl| (chembl.clone(), schembl.clone()))
        })
        .collect())
}
