//! Incremental ingestion of raw extracts into staging tables.
//!
//! - [`ledger`]: which file names have already been loaded
//! - [`classify`]: file name → staging category
//! - [`reader`]: raw file → typed frame
//! - [`loader`]: typed frame → staging table, atomically with the ledger write

pub mod classify;
pub mod ledger;
pub mod loader;
pub mod reader;

pub use classify::{Category, ROUTING_RULES, classify};
pub use ledger::{IngestedFile, LEDGER_TABLE};
pub use loader::{StagedRelation, load_file};
pub use reader::{PARTITION_DATE_COLUMN, SOURCE_FILE_COLUMN, read_raw_file};
