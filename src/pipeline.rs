use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::bioactivity::{self, BioactivityExtractor, BioactivityReport};
use crate::chembl::ChemblClient;
use crate::config::ResolvedConfig;
use crate::domain::{AnalysisName, ChemblId, IdentifierMode, Separator};
use crate::error::KiraError;
use crate::harmonize::{self, CompoundSource, HarmonizeReport, Harmonizer};
use crate::mapping::{self, CompoundMapping, MappingClient, ResolverTables};
use crate::patents::{self, PATENT_COLUMNS, PatentExtractor, PatentReport};
use crate::portal::PatentPortal;
use crate::pubchem::NameClient;
use crate::resolver::Resolver;
use crate::store::Store;

pub const NO_PATENTS_FOUND: &str = "no patents found";
pub const PATENTS_FOUND: &str = "patents found";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn phase(stage: &str, message: &str) -> Self {
        Self {
            message: format!("phase={stage}; {message}"),
            elapsed: None,
        }
    }

    pub fn item(stage: &str, index: usize, total: usize, key: &str) -> Self {
        Self {
            message: format!("phase={stage}; {index}/{total} {key}"),
            elapsed: None,
        }
    }

    fn done(stage: &str, started: Instant) -> Self {
        Self {
            message: format!("phase={stage}; done"),
            elapsed: Some(started.elapsed()),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// A target identifier file.
#[derive(Debug, Clone)]
pub struct TargetFile {
    pub path: PathBuf,
    pub separator: Separator,
    pub mode: IdentifierMode,
}

/// Where the patent stage takes its compounds from.
#[derive(Debug, Clone)]
pub enum PatentInput {
    /// The persisted output of the chemical stage for the same analysis.
    Targets,
    /// A TSV compound list with a `chembl` column.
    CompoundList(PathBuf),
}

#[derive(Debug, Clone, Serialize)]
pub struct ChemicalsResult {
    pub analysis: String,
    pub cache_path: String,
    pub report: BioactivityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatentsResult {
    pub analysis: String,
    pub outcome: String,
    pub harmonize: HarmonizeReport,
    pub patents: PatentReport,
    pub cleaned_rows: usize,
    pub cleaned_path: Option<String>,
    pub gene_patent_path: Option<String>,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub chemicals: ChemicalsResult,
    pub patents: PatentsResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverviewResult {
    pub analysis: String,
    pub report: BioactivityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct MappingFetchResult {
    pub release: String,
    pub path: String,
    pub action: String,
}

/// Report files written after a patent run.
#[derive(Debug, Clone, Default)]
pub struct ReportFiles {
    pub cleaned_rows: usize,
    pub cleaned_path: Option<String>,
    pub gene_patent_path: Option<String>,
}

pub struct Pipeline<C: ChemblClient, N: NameClient> {
    store: Store,
    config: ResolvedConfig,
    chembl: C,
    names: N,
}

impl<C: ChemblClient, N: NameClient> Pipeline<C, N> {
    pub fn new(store: Store, config: ResolvedConfig, chembl: C, names: N) -> Self {
        Self {
            store,
            config,
            chembl,
            names,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn run_chemicals(
        &self,
        analysis: &AnalysisName,
        targets: &TargetFile,
        sink: &dyn ProgressSink,
    ) -> Result<ChemicalsResult, KiraError> {
        let started = Instant::now();
        sink.event(ProgressEvent::phase("chemicals", "loading mapping tables"));
        let resolver = Resolver::new(self.resolver_tables(targets.mode)?, targets.mode)?;
        let inputs = bioactivity::load_targets(&targets.path, targets.separator, targets.mode)?;
        self.store.ensure_project_root()?;

        let outcome = BioactivityExtractor::new(&self.chembl, &resolver, &self.store)
            .extract(&inputs, analysis, sink)?;
        sink.event(ProgressEvent::done("chemicals", started));

        Ok(ChemicalsResult {
            analysis: analysis.to_string(),
            cache_path: self.store.gene_to_chemicals_path(analysis).to_string(),
            report: outcome.report,
        })
    }

    /// Harmonizes compounds and extracts their patents. `open_portal` is only
    /// called when at least one compound has an external identifier.
    pub fn run_patents<P, F>(
        &self,
        analysis: &AnalysisName,
        input: &PatentInput,
        open_portal: F,
        sink: &dyn ProgressSink,
    ) -> Result<PatentsResult, KiraError>
    where
        P: PatentPortal,
        F: FnOnce() -> Result<P, KiraError>,
    {
        self.store.ensure_project_root()?;
        let (source, targets) = match input {
            PatentInput::Targets => {
                let targets = bioactivity::load_target_map(&self.store, analysis)?;
                (CompoundSource::FromTargets(targets.clone()), Some(targets))
            }
            PatentInput::CompoundList(path) => (
                CompoundSource::CompoundList(harmonize::load_compound_list(path)?),
                None,
            ),
        };

        let started = Instant::now();
        let compound_mapping = self.compound_mapping()?;
        let harmonize_report = Harmonizer::new(
            &self.names,
            &compound_mapping,
            &self.store,
            self.config.harmonizer.clone(),
        )
        .harmonize(&source, analysis, sink)?;
        sink.event(ProgressEvent::done("harmonize", started));

        let harmonized = harmonize::load_harmonized(&self.store, analysis)?;
        let extractor = PatentExtractor::new(&self.store, &self.config.patents);
        let patent_report = if harmonized.is_empty() {
            warn!(analysis = %analysis, "no harmonized chemicals, skipping patent extraction");
            PatentReport::default()
        } else if extractor.pending(&harmonized, analysis)? == 0 {
            info!(analysis = %analysis, "every compound already visited");
            PatentReport {
                compounds: harmonized.len(),
                already_visited: harmonized.len(),
                ..Default::default()
            }
        } else {
            let started = Instant::now();
            let mut portal = open_portal()?;
            let extracted = extractor.extract_patents(&mut portal, &harmonized, analysis, sink);
            if let Err(err) = portal.finish() {
                warn!(error = %err, "failed to close the browser session");
            }
            sink.event(ProgressEvent::done("patents", started));
            extracted?
        };

        let reports = if self.store.patent_data_path(analysis).as_std_path().exists() {
            write_reports(&self.store, analysis, targets.as_ref())?
        } else {
            ReportFiles::default()
        };
        let outcome = if reports.cleaned_rows == 0 {
            info!(analysis = %analysis, "no patents found");
            NO_PATENTS_FOUND
        } else {
            PATENTS_FOUND
        };

        Ok(PatentsResult {
            analysis: analysis.to_string(),
            outcome: outcome.to_string(),
            harmonize: harmonize_report,
            patents: patent_report,
            cleaned_rows: reports.cleaned_rows,
            cleaned_path: reports.cleaned_path,
            gene_patent_path: reports.gene_patent_path,
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    pub fn run_all<P, F>(
        &self,
        analysis: &AnalysisName,
        targets: &TargetFile,
        open_portal: F,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, KiraError>
    where
        P: PatentPortal,
        F: FnOnce() -> Result<P, KiraError>,
    {
        let chemicals = self.run_chemicals(analysis, targets, sink)?;
        let patents = self.run_patents(analysis, &PatentInput::Targets, open_portal, sink)?;
        Ok(RunResult { chemicals, patents })
    }

    pub fn overview(&self, analysis: &AnalysisName) -> Result<OverviewResult, KiraError> {
        Ok(OverviewResult {
            analysis: analysis.to_string(),
            report: bioactivity::overview(&self.store, analysis)?,
        })
    }

    /// Builds the resolver tables needed for `mode`.
    fn resolver_tables(&self, mode: IdentifierMode) -> Result<ResolverTables, KiraError> {
        let mut tables = ResolverTables::default();
        if mode != IdentifierMode::TargetId {
            let path = self.uniprot_table_path().ok_or_else(|| KiraError::MissingMappingTable {
                mode: mode.to_string(),
                table: "uniprot_to_chembl".to_string(),
            })?;
            tables.uniprot_to_target = mapping::load_uniprot_to_target(&path)?;
        }
        if mode == IdentifierMode::Symbol {
            if let Some(path) = &self.config.mappings.hgnc {
                tables.symbol_to_uniprot = Some(mapping::load_symbol_to_uniprot(path)?);
            }
        }
        Ok(tables)
    }

    fn uniprot_table_path(&self) -> Option<PathBuf> {
        let mappings = &self.config.mappings;
        if let Some(path) = &mappings.uniprot_to_chembl {
            return Some(path.clone());
        }
        let release = mappings.chembl_release.as_deref()?;
        let cached = self.store.cache_chembl_mapping_path(release);
        cached
            .as_std_path()
            .exists()
            .then(|| cached.into_std_path_buf())
    }

    fn compound_mapping(&self) -> Result<CompoundMapping, KiraError> {
        match &self.config.mappings.compound_to_schembl {
            Some(path) => mapping::load_compound_mapping(path),
            None if self.config.harmonizer.synonym_fallback => Ok(CompoundMapping::default()),
            None => Err(KiraError::MissingMappingTable {
                mode: "harmonize".to_string(),
                table: "compound_to_schembl".to_string(),
            }),
        }
    }
}

/// Downloads `chembl_uniprot_mapping.txt` for `release` into the global
/// cache, unless it is already there.
pub fn fetch_mappings<M: MappingClient>(
    store: &Store,
    client: &M,
    release: &str,
    force: bool,
) -> Result<MappingFetchResult, KiraError> {
    let path = store.cache_chembl_mapping_path(release);
    if !force && path.as_std_path().exists() {
        return Ok(MappingFetchResult {
            release: release.to_string(),
            path: path.to_string(),
            action: "cache".to_string(),
        });
    }
    store.ensure_cache_root()?;
    let temp = tempfile::Builder::new()
        .prefix("kira-pm-mapping")
        .tempdir_in(store.cache_root().as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let temp_path = temp.path().join("chembl_uniprot_mapping.txt");
    client.download_chembl_uniprot(release, &temp_path)?;
    let bytes = std::fs::read(&temp_path).map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Store::write_bytes_atomic(&path, &bytes)?;

    Ok(MappingFetchResult {
        release: release.to_string(),
        path: path.to_string(),
        action: "download".to_string(),
    })
}

/// Writes the cleaned patent table and, when the compounds came from
/// targets, the per-gene table.
pub fn write_reports(
    store: &Store,
    analysis: &AnalysisName,
    targets: Option<&BTreeMap<String, Vec<ChemblId>>>,
) -> Result<ReportFiles, KiraError> {
    let table = patents::load_patent_table(store, analysis)?;
    let rows = table
        .iter()
        .flat_map(|((chembl, schembl), records)| {
            records.iter().map(move |record| {
                [
                    chembl.as_str(),
                    schembl.as_str(),
                    record.patent_number.as_str(),
                    record.publication_date.as_str(),
                    record.ipc.as_str(),
                    record.assignee.as_str(),
                ]
            })
        })
        .collect::<Vec<_>>();

    let mut files = ReportFiles {
        cleaned_rows: rows.len(),
        ..Default::default()
    };
    if rows.is_empty() {
        return Ok(files);
    }

    let cleaned_path = store.cleaned_patent_path(analysis);
    let bytes = tsv_bytes(&PATENT_COLUMNS, rows.iter().map(|row| row.to_vec()))?;
    Store::write_bytes_atomic(&cleaned_path, &bytes)?;
    files.cleaned_path = Some(cleaned_path.to_string());

    if let Some(targets) = targets {
        let genes = genes_by_compound(targets);
        let mut header = PATENT_COLUMNS.to_vec();
        header.push("genes");
        let gene_rows = rows.iter().map(|row| {
            let mut row = row.to_vec();
            row.push(genes.get(row[0]).map(String::as_str).unwrap_or_default());
            row
        });
        let gene_path = store.gene_patent_path(analysis);
        let bytes = tsv_bytes(&header, gene_rows)?;
        Store::write_bytes_atomic(&gene_path, &bytes)?;
        files.gene_patent_path = Some(gene_path.to_string());
    }

    info!(
        analysis = %analysis,
        rows = files.cleaned_rows,
        "wrote patent reports"
    );
    Ok(files)
}

/// Compound id to the comma-joined targets it is active on.
fn genes_by_compound(targets: &BTreeMap<String, Vec<ChemblId>>) -> BTreeMap<String, String> {
    let mut genes: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (target, compounds) in targets {
        for compound in compounds {
            genes
                .entry(compound.as_str().to_string())
                .or_default()
                .push(target.as_str());
        }
    }
    genes
        .into_iter()
        .map(|(compound, targets)| (compound, targets.join(", ")))
        .collect()
}

fn tsv_bytes<'a, I>(header: &[&str], rows: I) -> Result<Vec<u8>, KiraError>
where
    I: IntoIterator<Item = Vec<&'a str>>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(Vec::new());
    writer
        .write_record(header)
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|err| KiraError::Filesystem(err.to_string()))
}
