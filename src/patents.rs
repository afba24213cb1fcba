//! Patent extraction over the rendered SureChEMBL portal.
//!
//! Each harmonized `(chembl, schembl)` pair is visited once: the compound
//! page is opened, its patent listing is paged through, and the rows whose
//! classification and publication year pass [`PatentFilter`] are recorded.
//! Pairs that yield nothing are stored as a sentinel row so they are not
//! visited again.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, StateCodec};
use crate::config::PatentSettings;
use crate::domain::{AnalysisName, ChemblId, PatentRecord, SchemblId};
use crate::error::KiraError;
use crate::portal::{PAGE_SIZE, PatentPortal, RowRead};
use crate::pipeline::{ProgressEvent, ProgressSink};
use crate::store::Store;

pub const PATENT_COLUMNS: [&str; 6] = [
    "chembl",
    "surechembl",
    "patent_id",
    "date",
    "ipc",
    "assignee",
];

pub type PairKey = (ChemblId, SchemblId);
pub type PatentCache = CheckpointStore<PatentTableCodec>;

/// Tab-separated patent table. An empty record set is written as one row
/// with blank patent columns.
pub struct PatentTableCodec;

impl StateCodec for PatentTableCodec {
    type Key = PairKey;
    type Value = BTreeSet<PatentRecord>;

    fn decode(bytes: &[u8]) -> Result<Vec<(PairKey, BTreeSet<PatentRecord>)>, String> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(bytes);
        let headers = reader.headers().map_err(|err| err.to_string())?.clone();
        let mut indices = [0usize; 6];
        for (slot, column) in PATENT_COLUMNS.iter().enumerate() {
            indices[slot] = headers
                .iter()
                .position(|header| header == *column)
                .ok_or_else(|| format!("missing {column} column"))?;
        }

        let mut order = Vec::new();
        let mut grouped: HashMap<PairKey, BTreeSet<PatentRecord>> = HashMap::new();
        for record in reader.records() {
            let record = record.map_err(|err| err.to_string())?;
            let field = |slot: usize| record.get(indices[slot]).unwrap_or_default().to_string();
            let chembl = field(0).parse::<ChemblId>().map_err(|err| err.to_string())?;
            let schembl = field(1).parse::<SchemblId>().map_err(|err| err.to_string())?;
            let key = (chembl, schembl);
            let rows = grouped.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                BTreeSet::new()
            });
            let patent = PatentRecord {
                patent_number: field(2),
                publication_date: field(3),
                ipc: field(4),
                assignee: field(5),
            };
            // Sentinel rows leave every patent column blank.
            if patent == PatentRecord::default() {
                continue;
            }
            rows.insert(patent);
        }

        Ok(order
            .into_iter()
            .filter_map(|key| grouped.remove(&key).map(|rows| (key, rows)))
            .collect())
    }

    fn encode(entries: &[(&PairKey, &BTreeSet<PatentRecord>)]) -> Result<Vec<u8>, String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        writer
            .write_record(PATENT_COLUMNS)
            .map_err(|err| err.to_string())?;
        for ((chembl, schembl), records) in entries {
            if records.is_empty() {
                writer
                    .write_record([chembl.as_str(), schembl.as_str(), "", "", "", ""])
                    .map_err(|err| err.to_string())?;
                continue;
            }
            for record in records.iter() {
                writer
                    .write_record([
                        chembl.as_str(),
                        schembl.as_str(),
                        record.patent_number.as_str(),
                        record.publication_date.as_str(),
                        record.ipc.as_str(),
                        record.assignee.as_str(),
                    ])
                    .map_err(|err| err.to_string())?;
            }
        }
        writer.into_inner().map_err(|err| err.to_string())
    }
}

/// Keeps patents with an allow-listed classification published in or after
/// the cutoff year.
#[derive(Debug, Clone)]
pub struct PatentFilter {
    allow_list: HashSet<String>,
    cutoff_year: i32,
}

impl PatentFilter {
    pub fn new<I, S>(allow_list: I, cutoff_year: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allow_list: allow_list
                .into_iter()
                .map(|code| code.as_ref().trim().to_uppercase())
                .collect(),
            cutoff_year,
        }
    }

    pub fn from_settings(settings: &PatentSettings) -> Self {
        Self::new(&settings.ipc_allow_list, settings.cutoff_year)
    }

    pub fn keeps(&self, record: &PatentRecord) -> bool {
        let Some(code) = record.classification_code() else {
            return false;
        };
        if !self.allow_list.contains(code) {
            return false;
        }
        record
            .publication_year()
            .map(|year| year >= self.cutoff_year)
            .unwrap_or(false)
    }
}

/// What one compound visit produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundPatents {
    pub records: BTreeSet<PatentRecord>,
    pub total_hits: u64,
    pub pages_read: usize,
}

/// Walks the listing of one compound.
///
/// With `validate_layout` set, a listing that announces hits but renders no
/// row on its first page fails with [`KiraError::LayoutMismatch`].
pub fn collect_compound_patents<P: PatentPortal + ?Sized>(
    portal: &mut P,
    schembl: &SchemblId,
    filter: &PatentFilter,
    validate_layout: bool,
) -> Result<CompoundPatents, KiraError> {
    let mut result = CompoundPatents::default();

    if !portal.open_compound(schembl)? {
        debug!(compound = %schembl, "no patents tab");
        return Ok(result);
    }
    if !portal.open_listing()? {
        debug!(compound = %schembl, "no patent listing");
        return Ok(result);
    }
    let Some(total) = portal.total_hits() else {
        debug!(compound = %schembl, "hit counter not rendered");
        return Ok(result);
    };
    result.total_hits = total;
    if total == 0 {
        return Ok(result);
    }

    let pages = total.div_ceil(PAGE_SIZE) as usize;
    debug!(compound = %schembl, total, pages, "reading patent listing");
    for page in 0..pages {
        let mut located = 0usize;
        for slot in 0..portal.row_slots() {
            match portal.read_row(slot)? {
                RowRead::Absent => {}
                RowRead::Unclassified => located += 1,
                RowRead::Row(record) => {
                    located += 1;
                    if filter.keeps(&record) {
                        result.records.insert(record);
                    }
                }
            }
        }
        result.pages_read += 1;

        if page == 0 && validate_layout && located == 0 {
            return Err(KiraError::LayoutMismatch(format!(
                "{} layout found no row although {schembl} announces {total} hits",
                portal.layout_name()
            )));
        }

        if page + 1 == pages {
            break;
        }
        if !portal.next_page(page == 0)? {
            warn!(
                compound = %schembl,
                pages_read = result.pages_read,
                pages,
                "no next-page link, listing read partially"
            );
            break;
        }
    }

    Ok(result)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatentReport {
    pub compounds: usize,
    pub already_visited: usize,
    pub newly_visited: usize,
    pub with_patents: usize,
    pub failed: usize,
    pub patent_rows: usize,
}

pub struct PatentExtractor<'a> {
    store: &'a Store,
    filter: PatentFilter,
    flush_every: usize,
}

impl<'a> PatentExtractor<'a> {
    pub fn new(store: &'a Store, settings: &PatentSettings) -> Self {
        Self {
            store,
            filter: PatentFilter::from_settings(settings),
            flush_every: settings.flush_every,
        }
    }

    /// Pairs of `harmonized` not yet in the patent table.
    pub fn pending(
        &self,
        harmonized: &[(ChemblId, SchemblId)],
        analysis: &AnalysisName,
    ) -> Result<usize, KiraError> {
        let cache = PatentCache::open(self.store.patent_data_path(analysis), None)?;
        Ok(harmonized
            .iter()
            .filter(|pair| !cache.contains(pair))
            .count())
    }

    pub fn extract_patents<P: PatentPortal + ?Sized>(
        &self,
        portal: &mut P,
        harmonized: &[(ChemblId, SchemblId)],
        analysis: &AnalysisName,
        sink: &dyn ProgressSink,
    ) -> Result<PatentReport, KiraError> {
        let mut cache = PatentCache::open(
            self.store.patent_data_path(analysis),
            Some(self.flush_every),
        )?;
        let mut report = PatentReport {
            compounds: harmonized.len(),
            ..Default::default()
        };
        let pending = harmonized
            .iter()
            .filter(|pair| !cache.contains(pair))
            .count();
        info!(
            analysis = %analysis,
            compounds = harmonized.len(),
            pending,
            layout = portal.layout_name(),
            "extracting patents"
        );

        let mut layout_checked = false;
        for pair in harmonized {
            if cache.contains(pair) {
                report.already_visited += 1;
                continue;
            }
            let (chembl, schembl) = pair;
            report.newly_visited += 1;
            sink.event(ProgressEvent::item(
                "patents",
                report.newly_visited,
                pending,
                schembl.as_str(),
            ));

            let records = match collect_compound_patents(
                portal,
                schembl,
                &self.filter,
                !layout_checked,
            ) {
                Ok(found) => {
                    if found.total_hits > 0 {
                        layout_checked = true;
                    }
                    debug!(
                        compound = %chembl,
                        schembl = %schembl,
                        total_hits = found.total_hits,
                        kept = found.records.len(),
                        "visited compound"
                    );
                    found.records
                }
                Err(err @ KiraError::LayoutMismatch(_)) => {
                    cache.flush_if_dirty()?;
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        compound = %chembl,
                        schembl = %schembl,
                        error = %err,
                        "patent extraction failed"
                    );
                    report.failed += 1;
                    BTreeSet::new()
                }
            };

            if !records.is_empty() {
                report.with_patents += 1;
            }
            if cache.put(pair.clone(), records)? {
                debug!(pairs = cache.len(), "checkpointed patent table");
            }
        }

        cache.flush()?;
        report.patent_rows = cache.iter().map(|(_, records)| records.len()).sum();
        info!(
            newly_visited = report.newly_visited,
            with_patents = report.with_patents,
            failed = report.failed,
            patent_rows = report.patent_rows,
            "patent extraction finished"
        );
        Ok(report)
    }
}

/// Reads the persisted patent table of an analysis.
pub fn load_patent_table(
    store: &Store,
    analysis: &AnalysisName,
) -> Result<Vec<(PairKey, BTreeSet<PatentRecord>)>, KiraError> {
    let path = store.patent_data_path(analysis);
    if !path.as_std_path().exists() {
        return Err(KiraError::MissingStageOutput(path.to_string()));
    }
    let cache = PatentCache::open(path, None)?;
    Ok(cache
        .iter()
        .map(|(key, records)| (key.clone(), records.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ipc: &str, date: &str) -> PatentRecord {
        PatentRecord {
            patent_number: "US-1-A1".to_string(),
            publication_date: date.to_string(),
            ipc: ipc.to_string(),
            assignee: "ACME".to_string(),
        }
    }

    #[test]
    fn filter_checks_code_and_year() {
        let filter = PatentFilter::new(["A61K"], 2000);
        assert!(!filter.keeps(&record("A61K 31/00", "1999-05-01")));
        assert!(filter.keeps(&record("A61K 31/00", "2001-05-01")));
        assert!(filter.keeps(&record("A61K", "2000-01-01")));
        assert!(!filter.keeps(&record("G01N 33/00", "2005-01-01")));
        assert!(!filter.keeps(&record("A61K", "")));
    }

    #[test]
    fn sentinel_survives_round_trip() {
        let key = (
            "CHEMBL25".parse::<ChemblId>().unwrap(),
            "SCHEMBL1".parse::<SchemblId>().unwrap(),
        );
        let empty = BTreeSet::new();
        let bytes = PatentTableCodec::encode(&[(&key, &empty)]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().nth(1).unwrap().starts_with("CHEMBL25\tSCHEMBL1\t"));

        let decoded = PatentTableCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, vec![(key, BTreeSet::new())]);
    }

    #[test]
    fn record_without_number_survives_round_trip() {
        let key = (
            "CHEMBL1".parse::<ChemblId>().unwrap(),
            "SCHEMBL1".parse::<SchemblId>().unwrap(),
        );
        let records = BTreeSet::from([PatentRecord {
            patent_number: String::new(),
            publication_date: "2010-01-01".to_string(),
            ipc: "A61K 31/00".to_string(),
            assignee: "ACME".to_string(),
        }]);
        let bytes = PatentTableCodec::encode(&[(&key, &records)]).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert_eq!(
            text.lines().nth(1).unwrap(),
            "CHEMBL1\tSCHEMBL1\t\t2010-01-01\tA61K 31/00\tACME"
        );

        let decoded = PatentTableCodec::decode(&bytes).unwrap();
        assert_eq!(decoded, vec![(key, records)]);
    }
}
