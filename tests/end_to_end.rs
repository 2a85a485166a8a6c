//! End-to-end runs of the ingest and transform pipeline
//!
//! These tests seed a warehouse with reference tables, drop raw extracts in a
//! source directory and check the staged tables, the ledger, the partition
//! tree and the materialized gold table.

use finledger::error::Result;
use finledger::ingest::ledger;
use finledger::pipeline::{run_ingest, run_transform};
use finledger::utils::list_files_by_extension;
use finledger::warehouse::Warehouse;
use polars::prelude::*;
use std::path::Path;
use tempfile::TempDir;

async fn seed_reference_tables(warehouse: &Warehouse) -> Result<()> {
    let tables = [
        (
            "meta_wbs_elements",
            df!(
                "WBS Element" => &["P-100", "P-100.01"],
                "WBS Element Name" => &["Plant A", "Pump"],
                "Level" => &[1i64, 2],
                "P&L_Destination" => &[None, Some(410_000i64)],
                "Profit Center" => &[None, Some("PC9")]
            )?,
        ),
        (
            "meta_wbs_codification",
            df!(
                "Type Char" => &["P"],
                "Type" => &["Project"],
                "Type Local" => &["Projet"],
                "Bucket" => &["CAPEX"]
            )?,
        ),
        (
            "meta_profit_centers",
            df!(
                "Profit Center" => &["PC1", "PC9"],
                "Signature Code" => &["S1", "S9"]
            )?,
        ),
        (
            "meta_signatures",
            df!(
                "Signature Code" => &["S1", "S9"],
                "Signature Description" => &["Energy", "Projects"]
            )?,
        ),
        (
            "meta_cost_centers",
            df!(
                "Cost Center" => &["CC1"],
                "Standard Hierarchy Node" => &["N1"],
                "Profit Center" => &["PC1"]
            )?,
        ),
        (
            "meta_node_to_compass",
            df!(
                "Standard Hierarchy Node" => &["N1"],
                "Compass Code" => &["C300"]
            )?,
        ),
        (
            "meta_gl_accounts",
            df!("G/L Account" => &[400_000i64, 410_000])?,
        ),
        (
            "meta_gl_to_compass",
            df!(
                "Financial Statement Item" => &["C410"],
                "Account To" => &[410_000i64]
            )?,
        ),
        (
            "meta_fs_items",
            df!(
                "Financial Statement Item" => &["C300", "C410"],
                "Text" => &["Overheads", "Project costs"]
            )?,
        ),
    ];

    for (name, df) in &tables {
        warehouse.replace_table(name, df).await?;
    }
    Ok(())
}

fn write_extracts(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::write(
        dir.join("ACT_2024_03.csv"),
        "Company Code,Fiscal Year,Fiscal Period,G/L Account,Cost Center,Amount in Company Code Currency\n\
         1000,2024,3,400000,CC1,100.0\n\
         1000,2024,3,410000,,50.0\n",
    )?;
    std::fs::write(
        dir.join("ACT_2024_04.csv"),
        "Company Code,Fiscal Year,Fiscal Period,G/L Account,WBS Element,Supplier,Amount in Company Code Currency\n\
         1000,2024,4,400000,P-100.01,ACME,25.0\n",
    )?;
    std::fs::write(
        dir.join("commit_wbs_2024_03.csv"),
        "Object,CO Object Name,Fiscal Year,Period,Cost element,Val/COArea Crcy\n\
         P-100.01,Pump,2024,3,400000,20.0\n",
    )?;
    Ok(())
}

fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.map(ToOwned::to_owned))
        .collect())
}

#[tokio::test]
async fn test_ingest_then_transform() -> Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("Inputs");
    let output = temp.path().join("gold");
    write_extracts(&source)?;

    let warehouse = Warehouse::open(&temp.path().join("warehouse.db")).await?;
    seed_reference_tables(&warehouse).await?;

    let files = list_files_by_extension(&source, "csv")?;
    assert_eq!(files.len(), 3);

    let first = run_ingest(&warehouse, &files).await?;
    assert_eq!(first.loaded.len(), 3, "{}", first.summary());
    assert!(first.failed.is_empty());
    assert_eq!(first.rows_loaded(), 4);
    assert_eq!(ledger::entries(warehouse.pool()).await?.len(), 3);

    // Actuals from two files with different columns share one table
    let actuals = warehouse.read_table("actuals").await?;
    assert_eq!(actuals.height(), 3);
    assert_eq!(actuals.column("Supplier")?.null_count(), 2);
    assert_eq!(warehouse.row_count("commit_wbs").await?, 1);

    let second = run_ingest(&warehouse, &files).await?;
    assert_eq!(second.skipped, 3);
    assert!(second.loaded.is_empty());
    assert_eq!(warehouse.row_count("actuals").await?, 3);

    let report = run_transform(&warehouse, &output, "gold_ledger").await?;
    assert_eq!(report.rows_gold, 4);
    assert_eq!(report.rows_per_scenario.get("Actuals"), Some(&3));
    assert_eq!(report.rows_per_scenario.get("Committed"), Some(&1));
    assert_eq!(report.partitions.len(), 2);

    assert!(output.join("Year=2024/Month=3/part-0.parquet").is_file());
    assert!(output.join("Year=2024/Month=4/part-0.parquet").is_file());

    let gold = warehouse.read_table("gold_ledger").await?;
    assert_eq!(gold.height(), 4);
    assert_eq!(gold.get_column_names()[0].as_str(), "Index");
    let mut index: Vec<i64> = gold.column("Index")?.i64()?.into_no_null_iter().collect();
    index.sort_unstable();
    assert_eq!(index, vec![1, 2, 3, 4]);

    // The committed row takes G/L account and profit center from its WBS element
    let scenarios = text_values(&gold, "Scenario")?;
    let committed = scenarios
        .iter()
        .position(|s| s.as_deref() == Some("Committed"))
        .expect("committed row present");
    let compass = text_values(&gold, "Compass Text")?;
    let signature = text_values(&gold, "Signature Description")?;
    let fiscal = text_values(&gold, "Fiscal Type")?;
    assert_eq!(compass[committed].as_deref(), Some("Project costs"));
    assert_eq!(signature[committed].as_deref(), Some("Projects"));
    assert_eq!(fiscal[committed].as_deref(), Some("WBS"));

    warehouse.close().await;
    Ok(())
}

#[tokio::test]
async fn test_transform_aborts_without_reference_tables() -> Result<()> {
    let temp = TempDir::new()?;
    let source = temp.path().join("Inputs");
    let output = temp.path().join("gold");
    write_extracts(&source)?;

    let warehouse = Warehouse::open(&temp.path().join("warehouse.db")).await?;
    let files = list_files_by_extension(&source, "csv")?;
    run_ingest(&warehouse, &files).await?;

    let err = run_transform(&warehouse, &output, "gold_ledger")
        .await
        .expect_err("reference tables are required");
    assert!(err.is_fatal());
    assert!(!output.exists());
    assert!(!warehouse.table_exists("gold_ledger").await?);
    Ok(())
}
