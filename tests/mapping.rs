use std::io::Write;
use std::path::Path;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_patent_miner::domain::{ChemblId, IdentifierMode, TargetInput};
use kira_patent_miner::error::KiraError;
use kira_patent_miner::mapping::{self, ResolverTables};
use kira_patent_miner::resolver::Resolver;

const CHEMBL_UNIPROT: &str = "# ChEMBL_30 uniprot mapping\n\
P00533\tCHEMBL203\tEpidermal growth factor receptor erbB1\tSINGLE PROTEIN\n\
P04626\tCHEMBL1824\tReceptor protein-tyrosine kinase erbB-2\tSINGLE PROTEIN\n";

const HGNC: &str = "HGNC ID\tApproved symbol\tUniProt ID(supplied by UniProt)\n\
HGNC:3236\tEGFR\tP00533\n\
HGNC:3430\tERBB2\tP04626\n\
HGNC:9999\tNOPROT\t\n";

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn uniprot_table_skips_comment_line() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "chembl_uniprot_mapping.txt", CHEMBL_UNIPROT);

    let table = mapping::load_uniprot_to_target(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table["P00533"].as_str(), "CHEMBL203");
}

#[test]
fn uniprot_table_reads_gzip() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("chembl_uniprot_mapping.txt.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(CHEMBL_UNIPROT.as_bytes()).unwrap();
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let table = mapping::load_uniprot_to_target(&path).unwrap();
    assert_eq!(table["P04626"].as_str(), "CHEMBL1824");
}

#[test]
fn empty_uniprot_table_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "empty.txt", "# header only\n");
    assert_matches!(
        mapping::load_uniprot_to_target(&path),
        Err(KiraError::MappingTable { .. })
    );
}

#[test]
fn missing_table_is_a_missing_input() {
    let temp = tempfile::tempdir().unwrap();
    assert_matches!(
        mapping::load_uniprot_to_target(&temp.path().join("nope.txt")),
        Err(KiraError::MissingInput(_))
    );
}

#[test]
fn hgnc_rows_without_accession_are_dropped() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "hgnc.tsv", HGNC);

    let table = mapping::load_symbol_to_uniprot(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table["ERBB2"], "P04626");
}

#[test]
fn compound_mapping_from_tsv_and_json() {
    let temp = tempfile::tempdir().unwrap();
    let tsv = write(
        temp.path(),
        "schembl.tsv",
        "chembl\tschembl_id\nCHEMBL25\tSCHEMBL1353\nCHEMBL26\t\n",
    );
    let json = write(
        temp.path(),
        "schembl.json",
        r#"{"CHEMBL25": "SCHEMBL1353", "CHEMBL941": "SCHEMBL8"}"#,
    );
    let aspirin: ChemblId = "CHEMBL25".parse().unwrap();

    let from_tsv = mapping::load_compound_mapping(&tsv).unwrap();
    assert_eq!(from_tsv.len(), 1);
    assert_eq!(from_tsv.get(&aspirin).unwrap().as_str(), "SCHEMBL1353");

    let from_json = mapping::load_compound_mapping(&json).unwrap();
    assert_eq!(from_json.len(), 2);
}

#[test]
fn read_columns_reports_missing_column() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "genes.csv", "gene,organism\nEGFR,human\n");
    let err = mapping::read_columns(&path, b',', &["uniprot"]).unwrap_err();
    assert_matches!(err, KiraError::MissingColumn { ref column, .. } if column == "uniprot");
}

#[test]
fn symbol_resolution_goes_through_uniprot() {
    let temp = tempfile::tempdir().unwrap();
    let uniprot = write(temp.path(), "chembl_uniprot_mapping.txt", CHEMBL_UNIPROT);
    let hgnc = write(temp.path(), "hgnc.tsv", HGNC);
    let tables = ResolverTables {
        uniprot_to_target: mapping::load_uniprot_to_target(&uniprot).unwrap(),
        symbol_to_uniprot: Some(mapping::load_symbol_to_uniprot(&hgnc).unwrap()),
    };
    let resolver = Resolver::new(tables, IdentifierMode::Symbol).unwrap();

    let egfr = resolver
        .resolve(&TargetInput::new("EGFR", IdentifierMode::Symbol))
        .unwrap();
    assert_eq!(egfr.as_str(), "CHEMBL203");
    assert!(
        resolver
            .resolve(&TargetInput::new("NOPROT", IdentifierMode::Symbol))
            .is_none()
    );
}
