//! Protein target to bioactive compound extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, JsonMapCodec};
use crate::chembl::ChemblClient;
use crate::domain::{AnalysisName, ChemblId, IdentifierMode, Separator, TargetInput};
use crate::error::KiraError;
use crate::mapping;
use crate::pipeline::{ProgressEvent, ProgressSink};
use crate::resolver::Resolver;
use crate::store::Store;

/// New targets between two writes of the bioactivity cache.
pub const BIOACTIVITY_FLUSH_EVERY: usize = 10;

pub type BioactivityCache = CheckpointStore<JsonMapCodec<TargetEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Resolved to a ChEMBL target; the compound list may still be empty.
    Resolved,
    /// No ChEMBL target id for this identifier.
    Unresolved,
    /// The activity query failed; recorded so the target is not retried.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub status: TargetStatus,
    pub compounds: Vec<ChemblId>,
}

/// Cache value. Older caches store a bare compound list per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetEntry {
    Legacy(Vec<ChemblId>),
    Detailed(TargetRecord),
}

impl TargetEntry {
    pub fn resolved(compounds: Vec<ChemblId>) -> Self {
        TargetEntry::Detailed(TargetRecord {
            status: TargetStatus::Resolved,
            compounds,
        })
    }

    pub fn empty(status: TargetStatus) -> Self {
        TargetEntry::Detailed(TargetRecord {
            status,
            compounds: Vec::new(),
        })
    }

    pub fn status(&self) -> TargetStatus {
        match self {
            TargetEntry::Legacy(_) => TargetStatus::Resolved,
            TargetEntry::Detailed(record) => record.status,
        }
    }

    pub fn compounds(&self) -> &[ChemblId] {
        match self {
            TargetEntry::Legacy(compounds) => compounds,
            TargetEntry::Detailed(record) => &record.compounds,
        }
    }
}

/// Targets without compounds, split by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BioactivityReport {
    pub total_targets: usize,
    pub newly_processed: usize,
    pub with_compounds: usize,
    pub resolved_empty: usize,
    pub unresolved: usize,
    pub failed: usize,
}

impl BioactivityReport {
    pub fn zero_compound_targets(&self) -> usize {
        self.resolved_empty + self.unresolved + self.failed
    }

    fn from_cache(cache: &BioactivityCache, newly_processed: usize) -> Self {
        let mut report = BioactivityReport {
            newly_processed,
            ..Default::default()
        };
        for (_, entry) in cache.iter() {
            report.total_targets += 1;
            match (entry.status(), entry.compounds().is_empty()) {
                (_, false) => report.with_compounds += 1,
                (TargetStatus::Resolved, true) => report.resolved_empty += 1,
                (TargetStatus::Unresolved, true) => report.unresolved += 1,
                (TargetStatus::Failed, true) => report.failed += 1,
            }
        }
        report
    }
}

#[derive(Debug, Clone)]
pub struct BioactivityOutcome {
    /// Every cached target of the analysis, not only this run's input.
    pub targets: BTreeMap<String, Vec<ChemblId>>,
    pub report: BioactivityReport,
}

pub struct BioactivityExtractor<'a, C: ChemblClient> {
    chembl: &'a C,
    resolver: &'a Resolver,
    store: &'a Store,
}

impl<'a, C: ChemblClient> BioactivityExtractor<'a, C> {
    pub fn new(chembl: &'a C, resolver: &'a Resolver, store: &'a Store) -> Self {
        Self {
            chembl,
            resolver,
            store,
        }
    }

    pub fn extract(
        &self,
        targets: &[TargetInput],
        analysis: &AnalysisName,
        sink: &dyn ProgressSink,
    ) -> Result<BioactivityOutcome, KiraError> {
        let mut cache = BioactivityCache::open(
            self.store.gene_to_chemicals_path(analysis),
            Some(BIOACTIVITY_FLUSH_EVERY),
        )?;
        let unique = targets.iter().collect::<BTreeSet<_>>();
        let pending = unique
            .iter()
            .filter(|target| !cache.contains(&target.key().to_string()))
            .count();
        info!(
            analysis = %analysis,
            targets = unique.len(),
            pending,
            "extracting bioactive compounds"
        );

        let mut processed = 0usize;
        for target in unique {
            let key = target.key().to_string();
            if cache.contains(&key) {
                continue;
            }
            processed += 1;
            sink.event(ProgressEvent::item("chemicals", processed, pending, &key));
            let entry = self.target_entry(target);
            cache.put(key, entry)?;
        }

        if processed > 0 {
            cache.flush_if_dirty()?;
        }

        let report = BioactivityReport::from_cache(&cache, processed);
        if report.zero_compound_targets() > 0 {
            warn!(
                targets = report.zero_compound_targets(),
                unresolved = report.unresolved,
                failed = report.failed,
                "genes found with no relevant chemical bioassay information"
            );
        }

        let targets = cache
            .iter()
            .map(|(key, entry)| (key.clone(), entry.compounds().to_vec()))
            .collect();
        Ok(BioactivityOutcome { targets, report })
    }

    fn target_entry(&self, target: &TargetInput) -> TargetEntry {
        let Some(target_id) = self.resolver.resolve(target) else {
            debug!(protein = target.key(), "no ChEMBL target for identifier");
            return TargetEntry::empty(TargetStatus::Unresolved);
        };

        match self.chembl.activities(&target_id) {
            Ok(activities) => {
                let compounds = activities
                    .into_iter()
                    .filter(|activity| activity.is_active())
                    .map(|activity| activity.molecule)
                    .collect::<BTreeSet<_>>();
                debug!(
                    protein = target.key(),
                    chembl_target = %target_id,
                    compounds = compounds.len(),
                    "resolved bioactive compounds"
                );
                TargetEntry::resolved(compounds.into_iter().collect())
            }
            Err(err) => {
                warn!(
                    protein = target.key(),
                    chembl_target = %target_id,
                    error = %err,
                    "activity query failed"
                );
                TargetEntry::empty(TargetStatus::Failed)
            }
        }
    }
}

/// Reads the persisted target map of an analysis. Fails when the chemical
/// extractor has not run for it.
pub fn load_target_map(
    store: &Store,
    analysis: &AnalysisName,
) -> Result<BTreeMap<String, Vec<ChemblId>>, KiraError> {
    let cache = open_existing(store, analysis)?;
    Ok(cache
        .iter()
        .map(|(key, entry)| (key.clone(), entry.compounds().to_vec()))
        .collect())
}

/// Recomputes the zero-compound report from the persisted cache.
pub fn overview(store: &Store, analysis: &AnalysisName) -> Result<BioactivityReport, KiraError> {
    let cache = open_existing(store, analysis)?;
    Ok(BioactivityReport::from_cache(&cache, 0))
}

fn open_existing(store: &Store, analysis: &AnalysisName) -> Result<BioactivityCache, KiraError> {
    let path = store.gene_to_chemicals_path(analysis);
    if !path.as_std_path().exists() {
        return Err(KiraError::MissingStageOutput(path.to_string()));
    }
    BioactivityCache::open(path, None)
}

/// Reads target identifiers from the column matching `mode`, de-duplicated.
pub fn load_targets(
    path: &Path,
    separator: Separator,
    mode: IdentifierMode,
) -> Result<Vec<TargetInput>, KiraError> {
    let rows = mapping::read_columns(path, separator.as_byte(), &[mode.column()])?;
    let unique = rows
        .into_iter()
        .filter_map(|mut row| row.pop())
        .filter(|value| !value.is_empty())
        .map(|value| TargetInput::new(&value, mode))
        .collect::<BTreeSet<_>>();
    Ok(unique.into_iter().collect())
}
