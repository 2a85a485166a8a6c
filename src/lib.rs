//! # finledger - incremental finance ledger pipeline
//!
//! finledger loads raw financial extracts (actuals, commitments, cost-center
//! details, budgets and forecasts) into a SQLite warehouse, one staging table
//! per category, and rebuilds a harmonized gold ledger from them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use finledger::pipeline::{run_ingest, run_transform};
//! use finledger::utils::list_files_by_extension;
//! use finledger::warehouse::Warehouse;
//! use std::path::Path;
//!
//! # async fn example() -> finledger::error::Result<()> {
//! let warehouse = Warehouse::open(Path::new("warehouse.db")).await?;
//! let files = list_files_by_extension(Path::new("Inputs/ACT"), "csv")?;
//!
//! let ingest = run_ingest(&warehouse, &files).await?;
//! println!("{}", ingest.summary());
//!
//! let report = run_transform(&warehouse, Path::new("gold"), "gold_ledger").await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`ingest`]: routing, ledger and the per-file transactional loader
//! - [`reference`]: lookup frames derived from the `meta_*` tables
//! - [`gold`]: per-category gold pipelines and assembly
//! - [`writer`]: `Year=/Month=` parquet partitions and the gold table
//! - [`pipeline`]: ingest and transform runs with their reports
//! - [`warehouse`]: SQLite access and frame/table mapping
//! - [`config`], [`error`], [`logging`], [`utils`]
//!
//! ## Run semantics
//!
//! Ingestion is per-file atomic: a file's rows and its ledger entry are
//! committed together or not at all, and one bad file never stops the batch.
//! The transform is a full rebuild that aborts on any integrity problem
//! (missing reference table, duplicated lookup key).

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod gold;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod reference;
pub mod utils;
pub mod warehouse;
pub mod writer;
