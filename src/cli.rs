use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use finledger::config::{InputFormat, PipelineConfig};
use finledger::ingest::ledger;
use finledger::pipeline::{IngestSummary, TransformReport, run_ingest, run_transform};
use finledger::utils::{discover_files, resolve_source_dirs};
use finledger::warehouse::Warehouse;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "finledger",
    about = "Ingest finance extracts and publish the partitioned gold ledger"
)]
pub struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for rotating log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load new raw extracts into the staging tables
    Ingest(RunArgs),
    /// Rebuild the gold dataset from the staging tables
    Transform(RunArgs),
    /// Ingest, then transform
    Run(RunArgs),
    /// List the files already ingested
    Ledger(RunArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// SQLite warehouse file
    #[arg(long, env = "DATABASE_PATH")]
    pub database_path: Option<PathBuf>,

    /// Prefix applied to relative source paths
    #[arg(long, env = "PROJECT_PATH")]
    pub project_path: Option<PathBuf>,

    /// Directory holding raw extracts (repeatable)
    #[arg(long = "source-path")]
    pub source_paths: Vec<PathBuf>,

    #[arg(long, value_enum)]
    pub input_format: Option<InputFormat>,

    /// Root of the Year=/Month= partition tree
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    /// Name of the materialized gold table
    #[arg(long)]
    pub gold_table: Option<String>,
}

impl RunArgs {
    /// Overrides `config` with every flag that was given.
    pub fn apply(self, config: &mut PipelineConfig) {
        if self.database_path.is_some() {
            config.database_path = self.database_path;
        }
        if self.project_path.is_some() {
            config.project_path = self.project_path;
        }
        if !self.source_paths.is_empty() {
            config.source_paths = self.source_paths;
        }
        if let Some(format) = self.input_format {
            config.input_format = format;
        }
        if self.output_path.is_some() {
            config.output_path = self.output_path;
        }
        if let Some(table) = self.gold_table {
            config.gold_table = table;
        }
    }
}

impl Cli {
    /// Configuration file (if any) merged with the subcommand's flags.
    pub fn resolve_config(&mut self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }

        let args = match &mut self.command {
            Commands::Ingest(args)
            | Commands::Transform(args)
            | Commands::Run(args)
            | Commands::Ledger(args) => std::mem::take(args),
        };
        args.apply(&mut config);
        Ok(config)
    }
}

pub async fn run_command(command: &Commands, config: &PipelineConfig) -> Result<()> {
    let warehouse = Warehouse::open(config.require_database_path()?)
        .await
        .context("Failed to open warehouse")?;

    let result = match command {
        Commands::Ingest(_) => handle_ingest(&warehouse, config).await.map(|_| ()),
        Commands::Transform(_) => handle_transform(&warehouse, config).await,
        Commands::Run(_) => match handle_ingest(&warehouse, config).await {
            Ok(_) => handle_transform(&warehouse, config).await,
            Err(e) => Err(e),
        },
        Commands::Ledger(_) => handle_ledger(&warehouse).await,
    };

    warehouse.close().await;
    result
}

#[expect(clippy::print_stdout)]
fn print_ingest(summary: &IngestSummary) {
    for file in &summary.loaded {
        println!("  loaded  {} -> {} ({} rows)", file.filename, file.category, file.rows);
    }
    for file in &summary.failed {
        println!("  FAILED  {}: {}", file.filename, file.reason);
    }
    println!("{}", summary.summary());
}

async fn handle_ingest(warehouse: &Warehouse, config: &PipelineConfig) -> Result<IngestSummary> {
    let dirs = resolve_source_dirs(config.project_path.as_deref(), &config.source_paths);
    if dirs.is_empty() {
        warn!("No existing source directory configured");
    }
    let candidates = discover_files(&dirs, config.input_format.extension())?;
    info!(
        "Found {} {} file(s) in {} source director(ies)",
        candidates.len(),
        config.input_format.extension(),
        dirs.len()
    );

    let summary = run_ingest(warehouse, &candidates).await?;
    print_ingest(&summary);
    Ok(summary)
}

#[expect(clippy::print_stdout)]
fn print_transform(report: &TransformReport) {
    for (scenario, rows) in &report.rows_per_scenario {
        println!("  {scenario}: {rows} rows");
    }
    println!("{}", report.summary());
}

async fn handle_transform(warehouse: &Warehouse, config: &PipelineConfig) -> Result<()> {
    let output = config.require_output_path()?;
    let report = run_transform(warehouse, output, &config.gold_table)
        .await
        .context("Gold transformation aborted")?;
    print_transform(&report);
    Ok(())
}

#[expect(clippy::print_stdout)]
async fn handle_ledger(warehouse: &Warehouse) -> Result<()> {
    ledger::bootstrap(warehouse.pool()).await?;
    let entries = ledger::entries(warehouse.pool()).await?;
    for entry in &entries {
        println!("{}  {}", entry.ingested_at.format("%Y-%m-%d %H:%M:%S"), entry.filename);
    }
    println!("{} file(s) ingested", entries.len());
    Ok(())
}
