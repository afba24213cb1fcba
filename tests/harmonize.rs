use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_patent_miner::config::HarmonizerSettings;
use kira_patent_miner::domain::{AnalysisName, ChemblId, SchemblId};
use kira_patent_miner::error::KiraError;
use kira_patent_miner::harmonize::{self, CompoundSource, Harmonizer};
use kira_patent_miner::mapping::CompoundMapping;
use kira_patent_miner::output::JsonOutput;
use kira_patent_miner::pubchem::NameClient;
use kira_patent_miner::store::Store;

/// Name service returning `<id>-name`, recording how many chemical rows were
/// on disk when each lookup happened.
#[derive(Default)]
struct MockNames {
    synonyms: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<String>>,
    watch: Option<Utf8PathBuf>,
    rows_on_disk: Mutex<Vec<usize>>,
}

impl NameClient for MockNames {
    fn synonyms(&self, query: &str) -> Result<Vec<String>, KiraError> {
        self.calls.lock().unwrap().push(query.to_string());
        if let Some(path) = &self.watch {
            let rows = std::fs::read_to_string(path.as_std_path())
                .map(|text| text.lines().count().saturating_sub(1))
                .unwrap_or(0);
            self.rows_on_disk.lock().unwrap().push(rows);
        }
        Ok(self
            .synonyms
            .get(query)
            .cloned()
            .unwrap_or_else(|| vec![format!("{query}-name")]))
    }
}

fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_paths(root.join("project"), root.join("cache"));
    store.ensure_project_root().unwrap();
    (temp, store)
}

fn chembl(n: usize) -> ChemblId {
    format!("CHEMBL{n}").parse().unwrap()
}

fn mapping_for(range: std::ops::RangeInclusive<usize>) -> CompoundMapping {
    CompoundMapping::new(
        range
            .map(|n| (chembl(n), format!("SCHEMBL{n}").parse::<SchemblId>().unwrap()))
            .collect(),
    )
}

#[test]
fn genes_without_compounds_are_counted() {
    let (_temp, store) = temp_store();
    let analysis: AnalysisName = "genes".parse().unwrap();
    let mut targets = BTreeMap::new();
    for gene in 0..10 {
        let compounds = if gene < 3 {
            Vec::new()
        } else {
            vec![chembl(gene), chembl(100)]
        };
        targets.insert(format!("G{gene}"), compounds);
    }
    let names = MockNames::default();
    let mapping = mapping_for(1..=100);

    let report = Harmonizer::new(&names, &mapping, &store, HarmonizerSettings::default())
        .harmonize(&CompoundSource::FromTargets(targets), &analysis, &JsonOutput)
        .unwrap();

    assert_eq!(report.genes_skipped, 3);
    assert_eq!(report.compounds, 8);
    assert_eq!(report.newly_harmonized, 8);
    assert_eq!(report.table_rows, 8);
}

#[test]
fn table_is_flushed_every_ten_compounds() {
    let (_temp, store) = temp_store();
    let analysis: AnalysisName = "flush".parse().unwrap();
    let compounds = (1..=12).map(chembl).collect::<Vec<_>>();
    let names = MockNames {
        watch: Some(store.chemicals_path(&analysis)),
        ..Default::default()
    };
    let mapping = mapping_for(1..=12);

    Harmonizer::new(&names, &mapping, &store, HarmonizerSettings::default())
        .harmonize(&CompoundSource::CompoundList(compounds), &analysis, &JsonOutput)
        .unwrap();

    let rows = names.rows_on_disk.lock().unwrap().clone();
    assert_eq!(rows.len(), 12);
    assert!(rows[..10].iter().all(|count| *count == 0));
    assert_eq!(rows[10], 10);
    assert_eq!(harmonize::load_harmonized(&store, &analysis).unwrap().len(), 12);
}

#[test]
fn unmapped_compounds_are_dropped_and_cached_names_reused() {
    let (_temp, store) = temp_store();
    let analysis: AnalysisName = "resume".parse().unwrap();
    let source = CompoundSource::CompoundList(vec![chembl(1), chembl(2), chembl(3)]);
    let mapping = mapping_for(1..=2);

    let first = MockNames::default();
    let report = Harmonizer::new(&first, &mapping, &store, HarmonizerSettings::default())
        .harmonize(&source, &analysis, &JsonOutput)
        .unwrap();
    assert_eq!(report.unmapped, 1);
    assert_eq!(report.table_rows, 2);

    let table = std::fs::read_to_string(store.chemicals_path(&analysis).as_std_path()).unwrap();
    assert!(table.starts_with("chembl\tschembl_id\tname\n"));
    assert!(table.contains("CHEMBL1\tSCHEMBL1\tCHEMBL1-name"));
    assert!(!table.contains("CHEMBL3"));

    let second = MockNames::default();
    let again = Harmonizer::new(&second, &mapping, &store, HarmonizerSettings::default())
        .harmonize(&source, &analysis, &JsonOutput)
        .unwrap();
    assert_eq!(again.already_harmonized, 2);
    assert_eq!(again.newly_harmonized, 0);
    assert!(second.calls.lock().unwrap().is_empty());
}

#[test]
fn synonym_fallback_finds_surechembl_ids() {
    let (_temp, store) = temp_store();
    let analysis: AnalysisName = "fallback".parse().unwrap();
    let names = MockNames {
        synonyms: HashMap::from([
            ("CHEMBL7".to_string(), vec!["imatinib".to_string()]),
            (
                "imatinib".to_string(),
                vec!["Gleevec".to_string(), "SCHEMBL4".to_string()],
            ),
        ]),
        ..Default::default()
    };
    let settings = HarmonizerSettings {
        synonym_fallback: true,
        ..Default::default()
    };
    let mapping = CompoundMapping::default();

    let report = Harmonizer::new(&names, &mapping, &store, settings)
        .harmonize(
            &CompoundSource::CompoundList(vec![chembl(7)]),
            &analysis,
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(report.newly_harmonized, 1);
    let harmonized = harmonize::load_harmonized(&store, &analysis).unwrap();
    assert_eq!(harmonized[0].1.as_str(), "SCHEMBL4");
}

#[test]
fn load_harmonized_requires_a_previous_run() {
    let (_temp, store) = temp_store();
    let analysis: AnalysisName = "never".parse().unwrap();
    assert_matches!(
        harmonize::load_harmonized(&store, &analysis),
        Err(KiraError::MissingStageOutput(_))
    );
}

#[test]
fn compound_list_reads_chembl_column() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("chemicals.tsv");
    std::fs::write(&path, "chembl\tnote\nCHEMBL25\taspirin\n\t\nbogus\tx\n").unwrap();
    let compounds = harmonize::load_compound_list(&path).unwrap();
    assert_eq!(compounds, vec![chembl(25)]);
}

#[test]
fn synonym_fallback_misses_are_not_searched_again() {
    let (_temp, store) = temp_store();
    let analysis: AnalysisName = "misses".parse().unwrap();
    let settings = HarmonizerSettings {
        synonym_fallback: true,
        ..Default::default()
    };
    let mapping = CompoundMapping::default();
    let source = CompoundSource::CompoundList(vec![chembl(9)]);

    let first = MockNames::default();
    let report = Harmonizer::new(&first, &mapping, &store, settings.clone())
        .harmonize(&source, &analysis, &JsonOutput)
        .unwrap();
    assert_eq!(report.unmapped, 1);
    assert_eq!(
        *first.calls.lock().unwrap(),
        vec!["CHEMBL9".to_string(), "CHEMBL9-name".to_string()]
    );

    let second = MockNames::default();
    let report = Harmonizer::new(&second, &mapping, &store, settings)
        .harmonize(&source, &analysis, &JsonOutput)
        .unwrap();
    assert_eq!(report.unmapped, 1);
    assert_eq!(report.table_rows, 0);
    assert!(second.calls.lock().unwrap().is_empty());
}
