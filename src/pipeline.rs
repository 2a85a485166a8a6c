//! Run orchestration: the ingest batch and the gold transform.
//!
//! An ingest run is incremental and per-file isolated. A transform run is a
//! full rebuild of the gold dataset from everything currently staged, and
//! aborts as a whole on any integrity problem.

use crate::error::Result;
use crate::gold::build_gold;
use crate::gold::columns::SCENARIO;
use crate::ingest::{Category, classify, ledger, load_file};
use crate::reference::ReferenceFrames;
use crate::utils::file_name;
use crate::warehouse::Warehouse;
use crate::writer::{WrittenPartition, materialize, write_partitions};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub filename: String,
    pub category: Category,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub filename: String,
    pub reason: String,
}

/// Outcome of one ingest batch.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub loaded: Vec<LoadedFile>,
    pub failed: Vec<FailedFile>,
    /// Candidates already ledgered, or repeated within the batch
    pub skipped: usize,
    pub duration: Duration,
}

impl IngestSummary {
    pub fn rows_loaded(&self) -> usize {
        self.loaded.iter().map(|f| f.rows).sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "Ingest completed: {} file(s) loaded ({} rows), {} failed, {} skipped, {:.2}s",
            self.loaded.len(),
            self.rows_loaded(),
            self.failed.len(),
            self.skipped,
            self.duration.as_secs_f64()
        )
    }
}

/// Loads every candidate not yet in the ledger.
///
/// Files are grouped by category and loaded in [`Category::ALL`] order. A file
/// that fails is logged and reported; the batch carries on with the rest.
/// Only warehouse-level failures (ledger bootstrap, ledger lookup) abort.
pub async fn run_ingest(warehouse: &Warehouse, candidates: &[PathBuf]) -> Result<IngestSummary> {
    let start = Instant::now();
    ledger::bootstrap(warehouse.pool()).await?;

    let fresh = ledger::filter_new(warehouse.pool(), candidates).await?;
    let mut summary = IngestSummary {
        skipped: candidates.len() - fresh.len(),
        ..Default::default()
    };

    if fresh.is_empty() {
        info!("No new files to ingest ({} already processed)", summary.skipped);
        summary.duration = start.elapsed();
        return Ok(summary);
    }
    info!(
        "{} new file(s) to ingest, {} skipped",
        fresh.len(),
        summary.skipped
    );

    for category in Category::ALL {
        let batch: Vec<&PathBuf> = fresh
            .iter()
            .filter(|path| classify(&file_name(path)) == category)
            .collect();
        if batch.is_empty() {
            continue;
        }
        info!("Processing {} file(s) for table {category}", batch.len());

        for path in batch {
            let filename = file_name(path);
            match load_file(warehouse, path, category).await {
                Ok(rows) => summary.loaded.push(LoadedFile {
                    filename,
                    category,
                    rows,
                }),
                Err(e) => {
                    error!("Failed to ingest {filename}: {e}");
                    summary.failed.push(FailedFile {
                        filename,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    summary.duration = start.elapsed();
    info!("{}", summary.summary());
    Ok(summary)
}

/// Outcome of one gold transform.
#[derive(Debug, Clone, Default)]
pub struct TransformReport {
    /// Rows read from the staging tables
    pub rows_staged: usize,
    pub rows_gold: usize,
    pub rows_per_scenario: BTreeMap<String, usize>,
    pub partitions: Vec<WrittenPartition>,
    pub duration: Duration,
}

impl TransformReport {
    pub fn summary(&self) -> String {
        format!(
            "Transform completed: {} staged rows → {} gold rows, {} scenario(s), {} partition(s), {:.2}s",
            self.rows_staged,
            self.rows_gold,
            self.rows_per_scenario.len(),
            self.partitions.len(),
            self.duration.as_secs_f64()
        )
    }
}

fn scenario_counts(gold: &DataFrame) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for scenario in gold.column(SCENARIO)?.str()?.into_iter().flatten() {
        *counts.entry(scenario.to_owned()).or_insert(0) += 1;
    }
    Ok(counts)
}

/// Reads every existing staging table, resolves it against the reference
/// tables and publishes the result as partitions and as `gold_table`.
///
/// With nothing staged, the output tree and the gold table are left untouched.
pub async fn run_transform(
    warehouse: &Warehouse,
    output_root: &Path,
    gold_table: &str,
) -> Result<TransformReport> {
    let start = Instant::now();

    let mut staged = Vec::new();
    for category in Category::ALL {
        let table = category.table_name();
        if !warehouse.table_exists(table).await? {
            info!("Staging table {table} does not exist, skipping");
            continue;
        }
        let df = warehouse.read_table(table).await?;
        info!("Read {} rows from {table}", df.height());
        staged.push((category, df));
    }

    let mut report = TransformReport {
        rows_staged: staged.iter().map(|(_, df)| df.height()).sum(),
        ..Default::default()
    };
    if staged.is_empty() {
        warn!("No staging tables found, nothing to transform");
        report.duration = start.elapsed();
        return Ok(report);
    }

    let refs = ReferenceFrames::load(warehouse).await?;
    let gold = build_gold(&staged, &refs)?;

    report.partitions = write_partitions(&gold, output_root)?;
    materialize(warehouse, &gold, gold_table).await?;

    report.rows_gold = gold.height();
    report.rows_per_scenario = scenario_counts(&gold)?;
    report.duration = start.elapsed();
    info!("{}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ingest_summary_message() {
        let summary = IngestSummary {
            loaded: vec![LoadedFile {
                filename: "ACT_2024_03.csv".to_owned(),
                category: Category::Actuals,
                rows: 12,
            }],
            failed: vec![FailedFile {
                filename: "broken.csv".to_owned(),
                reason: "bad".to_owned(),
            }],
            skipped: 3,
            duration: Duration::from_millis(1500),
        };
        assert_eq!(
            summary.summary(),
            "Ingest completed: 1 file(s) loaded (12 rows), 1 failed, 3 skipped, 1.50s"
        );
    }

    #[test]
    fn test_scenario_counts() -> Result<()> {
        let gold = df!(SCENARIO => &["Actuals", "Committed", "Actuals"])?;
        let counts = scenario_counts(&gold)?;
        assert_eq!(counts.get("Actuals"), Some(&2));
        assert_eq!(counts.get("Committed"), Some(&1));
        Ok(())
    }

    #[tokio::test]
    async fn test_ingest_with_no_candidates_bootstraps_ledger() -> Result<()> {
        let temp = TempDir::new()?;
        let warehouse = Warehouse::open(&temp.path().join("wh.db")).await?;

        let summary = run_ingest(&warehouse, &[]).await?;
        assert!(summary.loaded.is_empty());
        assert_eq!(summary.skipped, 0);
        assert!(warehouse.table_exists(ledger::LEDGER_TABLE).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_file_does_not_stop_batch() -> Result<()> {
        let temp = TempDir::new()?;
        let warehouse = Warehouse::open(&temp.path().join("wh.db")).await?;

        let good = temp.path().join("ACT_2024_03.csv");
        std::fs::write(
            &good,
            "Company Code,Fiscal Year,Fiscal Period,Amount\n1000,2024,3,10.5\n",
        )?;
        let missing = temp.path().join("ACT_2024_04.csv");

        let summary = run_ingest(&warehouse, &[missing, good]).await?;
        assert_eq!(summary.loaded.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].filename, "ACT_2024_04.csv");
        assert_eq!(warehouse.row_count("actuals").await?, 1);

        let again = run_ingest(&warehouse, &[temp.path().join("ACT_2024_03.csv")]).await?;
        assert_eq!(again.skipped, 1);
        assert!(again.loaded.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_transform_without_staging_leaves_output_alone() -> Result<()> {
        let temp = TempDir::new()?;
        let warehouse = Warehouse::open(&temp.path().join("wh.db")).await?;
        let output = temp.path().join("gold");

        let report = run_transform(&warehouse, &output, "gold_ledger").await?;
        assert_eq!(report.rows_gold, 0);
        assert!(report.partitions.is_empty());
        assert!(!output.exists());
        assert!(!warehouse.table_exists("gold_ledger").await?);
        Ok(())
    }
}
