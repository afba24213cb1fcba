use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_patent_miner::chembl::ChemblHttpClient;
use kira_patent_miner::config::{ConfigLoader, ResolvedConfig};
use kira_patent_miner::domain::{AnalysisName, IdentifierMode, Region, Separator};
use kira_patent_miner::error::KiraError;
use kira_patent_miner::mapping::MappingHttpClient;
use kira_patent_miner::output::{JsonOutput, LogProgress, OutputMode, Summary};
use kira_patent_miner::pipeline::{self, PatentInput, Pipeline, ProgressSink, TargetFile};
use kira_patent_miner::portal;
use kira_patent_miner::pubchem::PubchemHttpClient;
use kira_patent_miner::store::Store;

#[derive(Parser)]
#[command(name = "kira-pm")]
#[command(about = "Mine patents for compounds bioactive against a set of protein targets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Config file (defaults to kira-pm.json in the working directory)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Extract bioactive chemicals for a set of targets")]
    Chemicals(ChemicalsArgs),
    #[command(about = "Harmonize chemicals and extract their patents")]
    Patents(PatentsArgs),
    #[command(about = "Run chemical and patent extraction end to end")]
    Run(RunArgs),
    #[command(about = "Show the bioactivity report of an existing analysis")]
    Overview(OverviewArgs),
    #[command(about = "Manage identifier mapping tables")]
    Mappings(MappingsArgs),
}

#[derive(Args, Clone)]
struct TargetArgs {
    /// Delimited file with a column named after the identifier mode
    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value = "comma", value_parser = parse_separator)]
    separator: Separator,

    #[arg(long, value_enum, default_value_t = IdentifierMode::Accession)]
    mode: IdentifierMode,

    /// ChEMBL chembl_uniprot_mapping.txt
    #[arg(long)]
    uniprot_mapping: Option<PathBuf>,

    /// Use the mapping table downloaded for this ChEMBL release
    #[arg(long)]
    chembl_release: Option<String>,

    /// HGNC table, required with --mode symbol
    #[arg(long)]
    hgnc: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct PortalArgs {
    /// ChEMBL to SureChEMBL table (TSV or JSON)
    #[arg(long)]
    compound_mapping: Option<PathBuf>,

    /// Look up SureChEMBL ids in PubChem synonyms when the table has none
    #[arg(long)]
    synonym_fallback: bool,

    #[arg(long, value_enum)]
    region: Option<Region>,

    /// Earliest publication year kept
    #[arg(long)]
    year: Option<i32>,

    /// URL of a running WebDriver server
    #[arg(long)]
    webdriver_url: Option<String>,

    /// chromedriver binary to spawn
    #[arg(long)]
    chromedriver: Option<PathBuf>,
}

#[derive(Args)]
struct ChemicalsArgs {
    #[arg(long)]
    name: String,

    #[command(flatten)]
    targets: TargetArgs,
}

#[derive(Args)]
struct PatentsArgs {
    #[arg(long)]
    name: String,

    /// TSV with a chembl column; without it the chemicals of the analysis are used
    #[arg(long)]
    chemical_data: Option<PathBuf>,

    #[command(flatten)]
    portal: PortalArgs,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    name: String,

    #[command(flatten)]
    targets: TargetArgs,

    #[command(flatten)]
    portal: PortalArgs,
}

#[derive(Args)]
struct OverviewArgs {
    #[arg(long)]
    name: String,
}

#[derive(Args)]
struct MappingsArgs {
    #[command(subcommand)]
    command: MappingsCommand,
}

#[derive(Subcommand)]
enum MappingsCommand {
    #[command(about = "Download chembl_uniprot_mapping.txt into the global cache")]
    Fetch(MappingsFetchArgs),
}

#[derive(Args)]
struct MappingsFetchArgs {
    #[arg(long)]
    chembl_release: String,

    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        err if err.is_configuration() => 2,
        KiraError::ChemblHttp(_)
        | KiraError::ChemblStatus { .. }
        | KiraError::PubchemHttp(_)
        | KiraError::PubchemStatus { .. }
        | KiraError::MappingHttp(_)
        | KiraError::MappingStatus { .. }
        | KiraError::WebDriverHttp(_)
        | KiraError::WebDriver { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &LogProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };

    let store = Store::new()?;
    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Chemicals(args) => {
            let analysis = parse_analysis(&args.name)?;
            apply_target_args(&mut config, &args.targets);
            let targets = target_file(&args.targets);
            let app = build_pipeline(store, config)?;
            let result = app.run_chemicals(&analysis, &targets, sink)?;
            match output_mode {
                OutputMode::Interactive => Summary::chemicals(&result),
                OutputMode::NonInteractive => {
                    JsonOutput::print_chemicals(&result).into_diagnostic()?
                }
            }
            Ok(())
        }
        Commands::Patents(args) => {
            let analysis = parse_analysis(&args.name)?;
            apply_portal_args(&mut config, &args.portal);
            let input = match args.chemical_data {
                Some(path) => PatentInput::CompoundList(path),
                None => PatentInput::Targets,
            };
            let app = build_pipeline(store, config)?;
            let settings = app.config().patents.clone();
            let result = app.run_patents(
                &analysis,
                &input,
                || portal::open_rendered_portal(&settings),
                sink,
            )?;
            match output_mode {
                OutputMode::Interactive => Summary::patents(&result),
                OutputMode::NonInteractive => JsonOutput::print_patents(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Run(args) => {
            let analysis = parse_analysis(&args.name)?;
            apply_target_args(&mut config, &args.targets);
            apply_portal_args(&mut config, &args.portal);
            let targets = target_file(&args.targets);
            let app = build_pipeline(store, config)?;
            let settings = app.config().patents.clone();
            let result = app.run_all(
                &analysis,
                &targets,
                || portal::open_rendered_portal(&settings),
                sink,
            )?;
            match output_mode {
                OutputMode::Interactive => {
                    Summary::chemicals(&result.chemicals);
                    Summary::patents(&result.patents);
                }
                OutputMode::NonInteractive => JsonOutput::print_run(&result).into_diagnostic()?,
            }
            Ok(())
        }
        Commands::Overview(args) => {
            let analysis = parse_analysis(&args.name)?;
            let app = build_pipeline(store, config)?;
            let result = app.overview(&analysis)?;
            match output_mode {
                OutputMode::Interactive => Summary::overview(&result),
                OutputMode::NonInteractive => {
                    JsonOutput::print_overview(&result).into_diagnostic()?
                }
            }
            Ok(())
        }
        Commands::Mappings(MappingsArgs {
            command: MappingsCommand::Fetch(args),
        }) => {
            let client = MappingHttpClient::new()?;
            let result =
                pipeline::fetch_mappings(&store, &client, &args.chembl_release, args.force)?;
            match output_mode {
                OutputMode::Interactive => Summary::mappings(&result),
                OutputMode::NonInteractive => {
                    JsonOutput::print_mappings(&result).into_diagnostic()?
                }
            }
            Ok(())
        }
    }
}

fn build_pipeline(
    store: Store,
    config: ResolvedConfig,
) -> miette::Result<Pipeline<ChemblHttpClient, PubchemHttpClient>> {
    let chembl = ChemblHttpClient::new()?;
    let pubchem = PubchemHttpClient::new()?;
    Ok(Pipeline::new(store, config, chembl, pubchem))
}

fn parse_analysis(name: &str) -> miette::Result<AnalysisName> {
    Ok(name.parse::<AnalysisName>()?)
}

fn parse_separator(value: &str) -> Result<Separator, String> {
    value.parse::<Separator>().map_err(|err| err.to_string())
}

fn target_file(args: &TargetArgs) -> TargetFile {
    TargetFile {
        path: args.data.clone(),
        separator: args.separator,
        mode: args.mode,
    }
}

fn apply_target_args(config: &mut ResolvedConfig, args: &TargetArgs) {
    if let Some(path) = &args.uniprot_mapping {
        config.mappings.uniprot_to_chembl = Some(path.clone());
    }
    if let Some(release) = &args.chembl_release {
        config.mappings.chembl_release = Some(release.clone());
    }
    if let Some(path) = &args.hgnc {
        config.mappings.hgnc = Some(path.clone());
    }
}

fn apply_portal_args(config: &mut ResolvedConfig, args: &PortalArgs) {
    if let Some(path) = &args.compound_mapping {
        config.mappings.compound_to_schembl = Some(path.clone());
    }
    if args.synonym_fallback {
        config.harmonizer.synonym_fallback = true;
    }
    if let Some(region) = args.region {
        config.patents.region = region;
    }
    if let Some(year) = args.year {
        config.patents.cutoff_year = year;
    }
    if let Some(url) = &args.webdriver_url {
        config.patents.webdriver_url = Some(url.clone());
    }
    if let Some(path) = &args.chromedriver {
        config.patents.chromedriver = Some(path.clone());
    }
}
