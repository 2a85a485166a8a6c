//! Atomic per-file load into a staging table.
//!
//! One file is one transaction: bind the typed frame to a temporary relation,
//! create or widen the staging table, copy the rows across, drop the temporary
//! relation and ledger the file name. Any failure rolls all of it back.

use super::classify::Category;
use super::ledger;
use super::reader::read_raw_file;
use crate::error::{PipelineError, Result};
use crate::utils::file_name;
use crate::warehouse::{self, Warehouse, quote_ident};
use polars::prelude::*;
use sqlx::SqliteConnection;
use std::path::Path;
use tracing::{info, warn};

/// Name of the temporary relation holding the incoming frame.
pub const INCOMING_RELATION: &str = "finledger_incoming";

/// A typed frame bound to a temporary table for the lifetime of one load
/// transaction.
///
/// [`StagedRelation::release`] drops it on the success path; on failure the
/// rollback of the surrounding transaction discards it, since SQLite treats
/// temp-schema DDL transactionally.
pub struct StagedRelation {
    columns: Vec<String>,
}

impl StagedRelation {
    pub async fn bind(conn: &mut SqliteConnection, df: &DataFrame) -> Result<Self> {
        sqlx::query(&format!(
            "DROP TABLE IF EXISTS temp.{}",
            quote_ident(INCOMING_RELATION)
        ))
        .execute(&mut *conn)
        .await?;
        warehouse::create_table_for(conn, INCOMING_RELATION, &df.schema(), true).await?;
        warehouse::insert_frame(conn, INCOMING_RELATION, df).await?;

        Ok(Self {
            columns: df
                .get_column_names()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        })
    }

    /// Appends the staged rows to `table`, matching columns by name.
    pub async fn append_to(&self, conn: &mut SqliteConnection, table: &str) -> Result<u64> {
        let column_list = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let result = sqlx::query(&format!(
            "INSERT INTO {} ({column_list}) SELECT {column_list} FROM temp.{}",
            quote_ident(table),
            quote_ident(INCOMING_RELATION)
        ))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn release(self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(&format!("DROP TABLE temp.{}", quote_ident(INCOMING_RELATION)))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Everything that must happen atomically for one file.
async fn load_unit(
    conn: &mut SqliteConnection,
    df: &DataFrame,
    filename: &str,
    table: &str,
) -> Result<usize> {
    let staged = StagedRelation::bind(conn, df).await?;

    let schema = df.schema();
    warehouse::create_table_for(conn, table, &schema, false).await?;
    warehouse::add_missing_columns(conn, table, &schema).await?;

    let appended = staged.append_to(conn, table).await?;
    staged.release(conn).await?;

    ledger::record(&mut *conn, filename).await?;
    Ok(usize::try_from(appended).unwrap_or(df.height()))
}

/// Loads one raw file into its category's staging table and ledgers it.
///
/// Returns the number of rows appended. Every error comes back as
/// [`PipelineError::Load`] (or [`PipelineError::DuplicateFile`]) for this file
/// only; nothing it did is left behind in the warehouse.
pub async fn load_file(warehouse: &Warehouse, path: &Path, category: Category) -> Result<usize> {
    let filename = file_name(path);
    let table = category.table_name();

    let df = read_raw_file(path).map_err(|e| PipelineError::load(&filename, e))?;

    let mut tx = warehouse.begin().await?;
    match load_unit(&mut tx, &df, &filename, table).await {
        Ok(rows) => {
            tx.commit()
                .await
                .map_err(|e| PipelineError::load(&filename, e))?;
            info!("Successfully ingested {filename} ({rows} rows) to table {table}");
            Ok(rows)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback for {filename} failed: {rollback}");
            }
            Err(match e {
                dup @ PipelineError::DuplicateFile { .. } => dup,
                other => PipelineError::load(&filename, other),
            })
        }
    }
}
