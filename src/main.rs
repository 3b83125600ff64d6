use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn};

use flight_delay_etl::config::{PipelineSettings, WarehouseConfig};
use flight_delay_etl::observability::{self, init_logging, push_metrics};
use flight_delay_etl::pipeline::{
    extract, transform, CommandRunner, Pipeline, PipelineOptions, RunReport,
};
use flight_delay_etl::storage::{PostgresWarehouse, Warehouse};
use flight_delay_etl::types::CanonicalRecord;

#[derive(Parser)]
#[command(name = "flight-etl")]
#[command(about = "Load flight delay records into the warehouse and rebuild its aggregates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, transform and load one source file, then run the aggregation job
    Run {
        /// Delimited source file with a header row
        csv_path: PathBuf,
        /// Pipeline settings (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Working directory of the aggregation project
        #[arg(long)]
        project_dir: Option<PathBuf>,
        /// Warehouse table to append to
        #[arg(long)]
        table: Option<String>,
        /// Also write JSON logs, rotated daily, to this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Extract and transform only; nothing is written
    Check {
        csv_path: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of canonical records to print
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Create the warehouse table if it is missing and print its row count
    InitDb {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        table: Option<String>,
    },
}

#[derive(Serialize)]
struct CheckReport<'a> {
    source: &'a Path,
    rows_in: usize,
    rows_dropped: usize,
    rows_out: usize,
    sample: &'a [CanonicalRecord],
}

#[derive(Serialize)]
struct TableReport<'a> {
    table: &'a str,
    rows: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let log_dir = match &cli.command {
        Commands::Run { log_dir, .. } => log_dir.clone(),
        _ => None,
    };
    let _guard = init_logging(log_dir.as_deref());

    if let Err(e) = observability::init() {
        warn!("metrics disabled: {}", e);
    }

    let outcome = match cli.command {
        Commands::Run {
            csv_path,
            config,
            project_dir,
            table,
            log_dir: _,
        } => run(&csv_path, config.as_deref(), table, project_dir).await,
        Commands::Check {
            csv_path,
            config,
            limit,
        } => check(&csv_path, config.as_deref(), limit),
        Commands::InitDb { config, table } => init_db(config.as_deref(), table).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn settings(
    config: Option<&Path>,
    table: Option<String>,
    project_dir: Option<PathBuf>,
) -> Result<PipelineSettings> {
    let mut settings = PipelineSettings::load_or_default(config).context("loading settings")?;
    if let Some(table) = table {
        settings.table = table;
    }
    if let Some(dir) = project_dir {
        settings.aggregation.project_dir = Some(dir);
    }
    settings.validate()?;
    Ok(settings)
}

async fn run(
    csv_path: &Path,
    config: Option<&Path>,
    table: Option<String>,
    project_dir: Option<PathBuf>,
) -> Result<ExitCode> {
    let settings = settings(config, table, project_dir)?;
    let project_dir = settings.project_dir()?.to_path_buf();
    let warehouse_config = WarehouseConfig::from_env()?;

    let warehouse = Arc::new(PostgresWarehouse::connect_lazy(
        &warehouse_config,
        settings.load.batch_size,
    ));
    let runner = Arc::new(CommandRunner::new(
        settings.aggregation.program.clone(),
        settings.aggregation.args.clone(),
    ));
    let options = PipelineOptions {
        table: settings.table.clone(),
        delimiter: settings.delimiter_byte(),
        project_dir,
    };
    let pipeline = Pipeline::new(warehouse, runner, options)?;

    let report = RunReport::from(pipeline.run(csv_path).await);
    println!("{}", serde_json::to_string_pretty(&report)?);

    match push_metrics(&report.run.id.to_string()).await {
        Ok(true) => info!("metrics pushed"),
        Ok(false) => {}
        Err(e) => warn!("Failed to push metrics to Pushgateway: {}", e),
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check(csv_path: &Path, config: Option<&Path>, limit: usize) -> Result<ExitCode> {
    let settings = settings(config, None, None)?;
    let raw = extract(csv_path, settings.delimiter_byte())
        .with_context(|| format!("extracting {}", csv_path.display()))?;
    let table = transform(&raw)?;

    let report = CheckReport {
        source: csv_path,
        rows_in: table.rows_in,
        rows_dropped: table.rows_dropped,
        rows_out: table.len(),
        sample: &table.records[..limit.min(table.len())],
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

async fn init_db(config: Option<&Path>, table: Option<String>) -> Result<ExitCode> {
    let settings = settings(config, table, None)?;
    let warehouse_config = WarehouseConfig::from_env()?;
    let warehouse = PostgresWarehouse::connect_lazy(&warehouse_config, settings.load.batch_size);

    warehouse
        .ensure_table(&settings.table)
        .await
        .with_context(|| format!("creating table {}", settings.table))?;
    let rows = warehouse.row_count(&settings.table).await?;

    let report = TableReport {
        table: &settings.table,
        rows,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}
