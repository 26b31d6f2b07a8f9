use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use phenosync::catalog::{CatalogQuery, PgCatalogClient};
use phenosync::config::{ConfigLoader, ResolvedConfig};
use phenosync::decode::RawDecoder;
use phenosync::error::PhenoError;
use phenosync::fetch::{ConfiguredStore, Fetcher};
use phenosync::ledger::Ledger;
use phenosync::output::{JsonOutput, LogSink, OutputMode, print_stats_text, print_summary_text};
use phenosync::reconcile::{ReconcileOptions, Reconciler, refresh_ledger};
use phenosync::store::DatasetLayout;

#[derive(Parser)]
#[command(name = "phenosync")]
#[command(about = "Mirror a LemnaTec experiment into a local dataset of PNG images")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Print results as JSON on stdout")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Merge catalog captures and images into the dataset ledger")]
    Query(SourceArgs),
    #[command(about = "Transfer and decode images recorded in the ledger")]
    Materialize(MaterializeArgs),
    #[command(about = "Query the catalog, then materialize pending images")]
    Sync(MaterializeArgs),
    #[command(about = "Show ledger totals")]
    Status(StatusArgs),
}

#[derive(Args, Clone)]
struct SourceArgs {
    #[arg(long)]
    dataset: Utf8PathBuf,

    #[arg(long)]
    config: Option<String>,

    #[arg(long, help = "Override the configured experiment (measurement label)")]
    experiment: Option<String>,
}

#[derive(Args, Clone)]
struct MaterializeArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct StatusArgs {
    #[arg(long)]
    dataset: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PhenoError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PhenoError) -> u8 {
    match error {
        PhenoError::MissingConfig | PhenoError::LedgerMismatch { .. } => 2,
        PhenoError::Catalog(_) | PhenoError::CatalogRow { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    match cli.command {
        Commands::Query(args) => {
            let config = load_config(&args)?;
            let layout = DatasetLayout::new(args.dataset);
            let ledger = run_query(&config, &layout)?;
            print_stats(&ledger, &layout, output_mode)
        }
        Commands::Materialize(args) => {
            let config = load_config(&args.source)?;
            let layout = DatasetLayout::new(args.source.dataset.clone());
            let ledger = layout.open(&config.dataset_info())?;
            run_materialize(&config, layout, &ledger, args.dry_run, output_mode)
        }
        Commands::Sync(args) => {
            let config = load_config(&args.source)?;
            let layout = DatasetLayout::new(args.source.dataset.clone());
            // A dry run plans from the saved ledger; the catalog is not contacted.
            let ledger = if args.dry_run {
                layout.open(&config.dataset_info())?
            } else {
                run_query(&config, &layout)?
            };
            run_materialize(&config, layout, &ledger, args.dry_run, output_mode)
        }
        Commands::Status(args) => {
            let layout = DatasetLayout::new(args.dataset);
            let ledger = layout.load_ledger()?;
            print_stats(&ledger, &layout, output_mode)
        }
    }
}

fn load_config(args: &SourceArgs) -> Result<ResolvedConfig, PhenoError> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    if let Some(experiment) = &args.experiment {
        config.experiment = experiment.clone();
    }
    Ok(config)
}

fn run_query(config: &ResolvedConfig, layout: &DatasetLayout) -> Result<Ledger, PhenoError> {
    let client = PgCatalogClient::connect(&config.connection)?;
    let mut query = CatalogQuery::new(client, config.timezone, config.label_rules.clone());
    refresh_ledger(layout, &mut query, &config.dataset_info())
}

fn run_materialize(
    config: &ResolvedConfig,
    layout: DatasetLayout,
    ledger: &Ledger,
    dry_run: bool,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let fetcher = Fetcher::new(
        ConfiguredStore::from_config(config),
        &config.remote_root,
        &config.connection.database,
    );
    let reconciler = Reconciler::new(layout, fetcher, RawDecoder::new(config.formats.clone()));
    let options = ReconcileOptions { dry_run };

    match output_mode {
        OutputMode::Json => {
            let summary = reconciler.run(ledger, options, &JsonOutput);
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Text => {
            let summary = reconciler.run(ledger, options, &LogSink);
            print_summary_text(&summary);
        }
    }
    Ok(())
}

fn print_stats(
    ledger: &Ledger,
    layout: &DatasetLayout,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let stats = ledger.stats(layout);
    match output_mode {
        OutputMode::Json => JsonOutput::print_stats(&stats).into_diagnostic()?,
        OutputMode::Text => print_stats_text(&stats),
    }
    Ok(())
}
