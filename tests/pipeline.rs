use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_patent_miner::chembl::{Activity, ChemblClient};
use kira_patent_miner::config::ResolvedConfig;
use kira_patent_miner::domain::{
    AnalysisName, IdentifierMode, PatentRecord, SchemblId, Separator, TargetChemblId,
};
use kira_patent_miner::error::KiraError;
use kira_patent_miner::mapping::MappingClient;
use kira_patent_miner::output::JsonOutput;
use kira_patent_miner::pipeline::{
    self, NO_PATENTS_FOUND, PATENTS_FOUND, PatentInput, Pipeline, TargetFile,
};
use kira_patent_miner::portal::{PatentPortal, RowRead};
use kira_patent_miner::pubchem::NameClient;
use kira_patent_miner::store::Store;

const CHEMBL_UNIPROT: &str = "# ChEMBL_33 uniprot mapping\n\
P00533\tCHEMBL203\tEpidermal growth factor receptor erbB1\tSINGLE PROTEIN\n\
P04626\tCHEMBL1824\tReceptor protein-tyrosine kinase erbB-2\tSINGLE PROTEIN\n";

const COMPOUND_MAPPING: &str = "chembl\tschembl_id\n\
CHEMBL25\tSCHEMBL1353\n\
CHEMBL941\tSCHEMBL8\n";

struct FixedChembl;

impl ChemblClient for FixedChembl {
    fn activities(&self, target: &TargetChemblId) -> Result<Vec<Activity>, KiraError> {
        let rows: &[(&str, f64)] = match target.as_str() {
            "CHEMBL203" => &[("CHEMBL25", 7.0), ("CHEMBL26", 5.0)],
            "CHEMBL1824" => &[("CHEMBL25", 6.5), ("CHEMBL941", 8.0)],
            _ => &[],
        };
        Ok(rows
            .iter()
            .map(|(molecule, pchembl)| Activity {
                molecule: molecule.parse().unwrap(),
                pchembl: Some(*pchembl),
            })
            .collect())
    }
}

struct EchoNames;

impl NameClient for EchoNames {
    fn synonyms(&self, query: &str) -> Result<Vec<String>, KiraError> {
        Ok(vec![format!("{query}-name")])
    }
}

/// One page of rows per compound; compounds not listed have no patents tab.
#[derive(Default)]
struct StaticPortal {
    listings: HashMap<String, Vec<PatentRecord>>,
    current: Vec<PatentRecord>,
}

impl PatentPortal for StaticPortal {
    fn open_compound(&mut self, schembl: &SchemblId) -> Result<bool, KiraError> {
        match self.listings.get(schembl.as_str()) {
            Some(rows) => {
                self.current = rows.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn open_listing(&mut self) -> Result<bool, KiraError> {
        Ok(true)
    }

    fn total_hits(&self) -> Option<u64> {
        Some(self.current.len() as u64)
    }

    fn read_row(&mut self, slot: usize) -> Result<RowRead, KiraError> {
        Ok(self
            .current
            .get(slot)
            .cloned()
            .map(RowRead::Row)
            .unwrap_or(RowRead::Absent))
    }

    fn next_page(&mut self, _first_transition: bool) -> Result<bool, KiraError> {
        Ok(false)
    }

    fn layout_name(&self) -> &str {
        "static"
    }
}

struct Workspace {
    _temp: tempfile::TempDir,
    dir: PathBuf,
    store: Store,
}

fn workspace() -> Workspace {
    let temp = tempfile::tempdir().unwrap();
    let dir = temp.path().to_path_buf();
    let root = Utf8PathBuf::from_path_buf(dir.clone()).unwrap();
    let store = Store::new_with_paths(root.join("project"), root.join("cache"));
    std::fs::write(dir.join("chembl_uniprot_mapping.txt"), CHEMBL_UNIPROT).unwrap();
    std::fs::write(dir.join("schembl.tsv"), COMPOUND_MAPPING).unwrap();
    std::fs::write(dir.join("targets.csv"), "uniprot,organism\nP00533,human\nP04626,human\n")
        .unwrap();
    Workspace {
        _temp: temp,
        dir,
        store,
    }
}

fn config(dir: &Path) -> ResolvedConfig {
    let mut config = ResolvedConfig::default();
    config.mappings.uniprot_to_chembl = Some(dir.join("chembl_uniprot_mapping.txt"));
    config.mappings.compound_to_schembl = Some(dir.join("schembl.tsv"));
    config
}

fn targets(dir: &Path) -> TargetFile {
    TargetFile {
        path: dir.join("targets.csv"),
        separator: Separator::Comma,
        mode: IdentifierMode::Accession,
    }
}

fn portal_with_patent() -> StaticPortal {
    StaticPortal {
        listings: HashMap::from([(
            "SCHEMBL1353".to_string(),
            vec![
                PatentRecord {
                    patent_number: "US-2010000001-A1".to_string(),
                    publication_date: "2010-01-01".to_string(),
                    ipc: "A61K 31/00".to_string(),
                    assignee: "ACME".to_string(),
                },
                PatentRecord {
                    patent_number: "US-1990000001-A1".to_string(),
                    publication_date: "1990-01-01".to_string(),
                    ipc: "A61K 31/00".to_string(),
                    assignee: "ACME".to_string(),
                },
            ],
        )]),
        ..Default::default()
    }
}

#[test]
fn run_writes_cleaned_and_gene_reports() {
    let ws = workspace();
    let analysis: AnalysisName = "egfr".parse().unwrap();
    let app = Pipeline::new(ws.store.clone(), config(&ws.dir), FixedChembl, EchoNames);

    let result = app
        .run_all(
            &analysis,
            &targets(&ws.dir),
            || Ok(portal_with_patent()),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.chemicals.report.total_targets, 2);
    assert_eq!(result.chemicals.report.with_compounds, 2);
    assert_eq!(result.patents.harmonize.table_rows, 2);
    assert_eq!(result.patents.patents.newly_visited, 2);
    assert_eq!(result.patents.patents.with_patents, 1);
    assert_eq!(result.patents.outcome, PATENTS_FOUND);
    assert_eq!(result.patents.cleaned_rows, 1);

    let cleaned = std::fs::read_to_string(ws.store.cleaned_patent_path(&analysis).as_std_path())
        .unwrap();
    assert_eq!(
        cleaned.lines().collect::<Vec<_>>(),
        [
            "chembl\tsurechembl\tpatent_id\tdate\tipc\tassignee",
            "CHEMBL25\tSCHEMBL1353\tUS-2010000001-A1\t2010-01-01\tA61K 31/00\tACME",
        ]
    );
    let per_gene =
        std::fs::read_to_string(ws.store.gene_patent_path(&analysis).as_std_path()).unwrap();
    let line = per_gene.lines().nth(1).unwrap();
    assert!(line.ends_with("\tP00533, P04626"), "{line}");

    let overview = app.overview(&analysis).unwrap();
    assert_eq!(overview.report.total_targets, 2);
}

#[test]
fn portal_is_not_opened_when_every_pair_was_visited() {
    let ws = workspace();
    let analysis: AnalysisName = "resume".parse().unwrap();
    let app = Pipeline::new(ws.store.clone(), config(&ws.dir), FixedChembl, EchoNames);
    app.run_all(&analysis, &targets(&ws.dir), || Ok(portal_with_patent()), &JsonOutput)
        .unwrap();

    let again = app
        .run_patents(
            &analysis,
            &PatentInput::Targets,
            || -> Result<StaticPortal, KiraError> {
                Err(KiraError::MissingTool("chromedriver".to_string()))
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(again.patents.already_visited, 2);
    assert_eq!(again.patents.newly_visited, 0);
    assert_eq!(again.outcome, PATENTS_FOUND);
}

#[test]
fn compound_list_without_patents_reports_none_found() {
    let ws = workspace();
    let analysis: AnalysisName = "list".parse().unwrap();
    let list = ws.dir.join("chemicals.tsv");
    std::fs::write(&list, "chembl\nCHEMBL941\n").unwrap();
    let app = Pipeline::new(ws.store.clone(), config(&ws.dir), FixedChembl, EchoNames);

    let result = app
        .run_patents(
            &analysis,
            &PatentInput::CompoundList(list),
            || Ok(StaticPortal::default()),
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.outcome, NO_PATENTS_FOUND);
    assert_eq!(result.patents.newly_visited, 1);
    assert_eq!(result.cleaned_path, None);
    assert_eq!(result.gene_patent_path, None);
}

#[test]
fn missing_mapping_tables_are_configuration_errors() {
    let ws = workspace();
    let analysis: AnalysisName = "config".parse().unwrap();

    let app = Pipeline::new(
        ws.store.clone(),
        ResolvedConfig::default(),
        FixedChembl,
        EchoNames,
    );
    let err = app
        .run_chemicals(&analysis, &targets(&ws.dir), &JsonOutput)
        .unwrap_err();
    assert_matches!(
        err,
        KiraError::MissingMappingTable { ref table, .. } if table == "uniprot_to_chembl"
    );
    assert!(err.is_configuration());

    let app = Pipeline::new(ws.store.clone(), config(&ws.dir), FixedChembl, EchoNames);
    let symbols = TargetFile {
        mode: IdentifierMode::Symbol,
        ..targets(&ws.dir)
    };
    let err = app.run_chemicals(&analysis, &symbols, &JsonOutput).unwrap_err();
    assert_matches!(err, KiraError::MissingMappingTable { .. });

    let err = app
        .run_patents(
            &analysis,
            &PatentInput::Targets,
            || Ok(StaticPortal::default()),
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, KiraError::MissingStageOutput(_));
}

#[derive(Default)]
struct CountingDownloads {
    calls: Mutex<Vec<String>>,
}

impl MappingClient for CountingDownloads {
    fn download_chembl_uniprot(&self, release: &str, destination: &Path) -> Result<(), KiraError> {
        self.calls.lock().unwrap().push(release.to_string());
        std::fs::write(destination, CHEMBL_UNIPROT).unwrap();
        Ok(())
    }
}

#[test]
fn mapping_download_is_cached_per_release() {
    let ws = workspace();
    let client = CountingDownloads::default();

    let first = pipeline::fetch_mappings(&ws.store, &client, "33", false).unwrap();
    assert_eq!(first.action, "download");
    let second = pipeline::fetch_mappings(&ws.store, &client, "33", false).unwrap();
    assert_eq!(second.action, "cache");
    assert_eq!(first.path, second.path);
    let forced = pipeline::fetch_mappings(&ws.store, &client, "33", true).unwrap();
    assert_eq!(forced.action, "download");
    assert_eq!(client.calls.lock().unwrap().len(), 2);

    let mut config = ResolvedConfig::default();
    config.mappings.chembl_release = Some("33".to_string());
    let app = Pipeline::new(ws.store.clone(), config, FixedChembl, EchoNames);
    let analysis: AnalysisName = "cached".parse().unwrap();
    let result = app
        .run_chemicals(&analysis, &targets(&ws.dir), &JsonOutput)
        .unwrap();
    assert_eq!(result.report.with_compounds, 2);
}
