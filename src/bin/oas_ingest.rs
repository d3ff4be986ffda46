use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use oas_ingest::app::App;
use oas_ingest::config::{ConfigLoader, ResolvedConfig};
use oas_ingest::domain::RunId;
use oas_ingest::error::IngestError;
use oas_ingest::output::JsonOutput;
use oas_ingest::store::{PARENT_TABLE, RunStore};

#[derive(Parser)]
#[command(name = "oas-ingest")]
#[command(about = "Ingest per-run compressed OAS sequence files into a two-tier SQLite store")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ingest every matching file from a directory")]
    Ingest(IngestArgs),
    #[command(about = "List run metadata from the parent table")]
    Runs(StoreArgs),
    #[command(about = "Query the parent table or a run's child table")]
    Query(QueryArgs),
    #[command(about = "Delete a run and, via cascade, all of its sequence rows")]
    DeleteRun(DeleteArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Directory holding the downloaded source files.
    #[arg(default_value = ".")]
    root: Utf8PathBuf,

    #[arg(long)]
    config: Option<String>,

    /// Override the database path from the config.
    #[arg(long)]
    db: Option<Utf8PathBuf>,

    /// Override the source file suffix from the config.
    #[arg(long)]
    suffix: Option<String>,

    /// Projected column, repeatable; overrides the config column list.
    #[arg(long = "column")]
    columns: Vec<String>,
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    db: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct QueryArgs {
    /// Table to query; defaults to the parent table.
    #[arg(default_value = PARENT_TABLE)]
    table: String,

    /// Equality filter as column=value, repeatable.
    #[arg(long = "where")]
    filters: Vec<String>,

    /// Column to return, repeatable; defaults to all columns.
    #[arg(long = "select")]
    select: Vec<String>,

    #[arg(long)]
    limit: Option<u32>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    db: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct DeleteArgs {
    run_id: String,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    db: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(ingest) = report.downcast_ref::<IngestError>() {
            return ExitCode::from(map_exit_code(ingest));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &IngestError) -> u8 {
    match error {
        IngestError::MissingConfig(_)
        | IngestError::ConfigRead(_)
        | IngestError::ConfigParse(_)
        | IngestError::UnknownTable(_)
        | IngestError::UnknownColumn(_) => 2,
        IngestError::Store(_) | IngestError::ReferentialIntegrity(_) => 3,
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
    match cli.command {
        Commands::Ingest(args) => run_ingest(args),
        Commands::Runs(args) => run_runs(args),
        Commands::Query(args) => run_query(args),
        Commands::DeleteRun(args) => run_delete(args),
    }
}

fn resolve(
    config: Option<&str>,
    db: Option<Utf8PathBuf>,
    suffix: Option<String>,
    columns: Vec<String>,
) -> miette::Result<ResolvedConfig> {
    let mut resolved = ConfigLoader::resolve(config).into_diagnostic()?;
    if let Some(db) = db {
        resolved.database = db;
    }
    if let Some(suffix) = suffix {
        resolved.suffix = suffix;
    }
    if !columns.is_empty() {
        resolved.columns = columns;
    }
    Ok(resolved)
}

fn run_ingest(args: IngestArgs) -> miette::Result<()> {
    let config = resolve(args.config.as_deref(), args.db, args.suffix, args.columns)?;
    let store = RunStore::open(&config.database, &config.columns).into_diagnostic()?;
    let mut app = App::new(store);
    let result = app.ingest_batch(&args.root, &config).into_diagnostic()?;
    JsonOutput::print_batch(&result).into_diagnostic()?;
    Ok(())
}

fn run_runs(args: StoreArgs) -> miette::Result<()> {
    let config = resolve(args.config.as_deref(), args.db, None, Vec::new())?;
    let store = RunStore::open(&config.database, &config.columns).into_diagnostic()?;
    let app = App::new(store);
    let runs = app.list_runs().into_diagnostic()?;
    JsonOutput::print_runs(&runs).into_diagnostic()?;
    Ok(())
}

fn run_query(args: QueryArgs) -> miette::Result<()> {
    let config = resolve(args.config.as_deref(), args.db, None, Vec::new())?;
    let filters = args
        .filters
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .ok_or_else(|| miette::Report::msg(format!("invalid filter `{raw}`, expected column=value")))
        })
        .collect::<miette::Result<Vec<_>>>()?;

    let store = RunStore::open(&config.database, &config.columns).into_diagnostic()?;
    let app = App::new(store);
    let select = if args.select.is_empty() {
        None
    } else {
        Some(args.select.as_slice())
    };
    let result = app
        .query(&args.table, &filters, select, args.limit)
        .into_diagnostic()?;
    JsonOutput::print_query(&result).into_diagnostic()?;
    Ok(())
}

fn run_delete(args: DeleteArgs) -> miette::Result<()> {
    let config = resolve(args.config.as_deref(), args.db, None, Vec::new())?;
    let run_id: RunId = args.run_id.parse().into_diagnostic()?;
    let mut store = RunStore::open(&config.database, &config.columns).into_diagnostic()?;
    let removed = store.delete_run(&run_id).into_diagnostic()?;
    if !removed {
        return Err(miette::Report::msg(format!("run {run_id} not found")));
    }
    Ok(())
}
