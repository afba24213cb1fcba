use std::io::{self, Write};

use serde::Serialize;
use tracing::info;

use crate::pipeline::{
    ChemicalsResult, MappingFetchResult, OverviewResult, PatentsResult, ProgressEvent, ProgressSink,
    RunResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_chemicals(result: &ChemicalsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_patents(result: &PatentsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_overview(result: &OverviewResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_mappings(result: &MappingFetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

/// Human-readable summaries for interactive runs.
pub struct Summary;

impl Summary {
    pub fn chemicals(result: &ChemicalsResult) {
        let report = &result.report;
        println!("Bioactivity extraction for {}", result.analysis);
        println!("  targets:              {}", report.total_targets);
        println!("  newly processed:      {}", report.newly_processed);
        println!("  with compounds:       {}", report.with_compounds);
        println!(
            "  without compounds:    {} (no activity {}, unresolved {}, failed {})",
            report.zero_compound_targets(),
            report.resolved_empty,
            report.unresolved,
            report.failed
        );
        println!("  cache:                {}", result.cache_path);
    }

    pub fn patents(result: &PatentsResult) {
        let harmonize = &result.harmonize;
        let patents = &result.patents;
        println!("Patent extraction for {}", result.analysis);
        println!(
            "  chemicals:            {} ({} genes without chemicals skipped)",
            harmonize.compounds, harmonize.genes_skipped
        );
        println!(
            "  harmonized:           {} ({} new, {} without SureChEMBL id)",
            harmonize.table_rows, harmonize.newly_harmonized, harmonize.unmapped
        );
        println!(
            "  compounds visited:    {} ({} cached, {} failed)",
            patents.newly_visited, patents.already_visited, patents.failed
        );
        println!("  outcome:              {}", result.outcome);
        if let Some(path) = &result.cleaned_path {
            println!("  patents:              {} rows in {path}", result.cleaned_rows);
        }
        if let Some(path) = &result.gene_patent_path {
            println!("  per gene:             {path}");
        }
        println!("  finished:             {}", result.finished_at);
    }

    pub fn overview(result: &OverviewResult) {
        let report = &result.report;
        println!("Analysis {}", result.analysis);
        println!("  targets:              {}", report.total_targets);
        println!("  with compounds:       {}", report.with_compounds);
        println!("  no relevant activity: {}", report.resolved_empty);
        println!("  unresolved:           {}", report.unresolved);
        println!("  failed:               {}", report.failed);
    }

    pub fn mappings(result: &MappingFetchResult) {
        println!(
            "ChEMBL {} uniprot mapping ({}): {}",
            result.release, result.action, result.path
        );
    }
}
