//! Append-only record of ingested file names.
//!
//! A file is "new" iff its name is absent from `ingested_files`. Names are
//! written inside the same transaction as the staging rows, so a file is
//! either fully ingested and ledgered or neither.

use crate::error::{PipelineError, Result};
use crate::utils::file_name;
use chrono::NaiveDateTime;
use sqlx::{Executor, Sqlite};
use std::collections::HashSet;
use std::path::PathBuf;

pub const LEDGER_TABLE: &str = "ingested_files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFile {
    pub filename: String,
    pub ingested_at: NaiveDateTime,
}

/// Creates the ledger table if absent.
pub async fn bootstrap<'e, E>(executor: E) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS ingested_files (
            filename TEXT PRIMARY KEY,
            ingested_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn has<'e, E>(executor: E, filename: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found: Option<String> =
        sqlx::query_scalar("SELECT filename FROM ingested_files WHERE filename = ?")
            .bind(filename)
            .fetch_optional(executor)
            .await?;
    Ok(found.is_some())
}

/// Records `filename`. Fails with [`PipelineError::DuplicateFile`] when it is
/// already present.
pub async fn record<'e, E>(executor: E, filename: &str) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("INSERT INTO ingested_files (filename) VALUES (?)")
        .bind(filename)
        .execute(executor)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(PipelineError::DuplicateFile {
                filename: filename.to_owned(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Candidates whose file name is not yet ledgered, in input order. A name
/// repeated within the batch is kept only the first time.
pub async fn filter_new<'e, E>(executor: E, candidates: &[PathBuf]) -> Result<Vec<PathBuf>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let processed: HashSet<String> = sqlx::query_scalar("SELECT filename FROM ingested_files")
        .fetch_all(executor)
        .await?
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    Ok(candidates
        .iter()
        .filter(|path| {
            let name = file_name(path);
            !processed.contains(&name) && seen.insert(name)
        })
        .cloned()
        .collect())
}

/// All ledger entries, oldest first.
pub async fn entries<'e, E>(executor: E) -> Result<Vec<IngestedFile>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String, NaiveDateTime)> = sqlx::query_as(
        "SELECT filename, ingested_at FROM ingested_files ORDER BY ingested_at, filename",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(filename, ingested_at)| IngestedFile {
            filename,
            ingested_at,
        })
        .collect())
}
