//! SQLite warehouse holding the ledger, the staging tables, the reference
//! tables and the materialized gold table.
//!
//! The pool is capped at a single connection, so every statement issued by the
//! pipeline is serialized against the store even though sqlx is async.

use crate::error::{PipelineError, Result, ResultExt as _};
use crate::utils::{date_from_epoch_days, epoch_days};
use chrono::NaiveDate;
use polars::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row as _, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::Path;

/// Quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Declared column type used when a frame becomes a table.
pub fn sql_type(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "BIGINT",
        DataType::Float32 | DataType::Float64 => "DOUBLE PRECISION",
        DataType::Boolean => "BOOLEAN",
        DataType::Date => "DATE",
        DataType::Datetime(_, _) => "TIMESTAMP",
        _ => "TEXT",
    }
}

/// Inverse of [`sql_type`] for reading tables back into frames.
fn polars_type(declared: &str) -> DataType {
    match declared.to_ascii_uppercase().as_str() {
        "BIGINT" | "INTEGER" | "INT" => DataType::Int64,
        "DOUBLE PRECISION" | "DOUBLE" | "REAL" | "FLOAT" => DataType::Float64,
        "BOOLEAN" => DataType::Boolean,
        "DATE" => DataType::Date,
        "TIMESTAMP" | "DATETIME" => DataType::Datetime(TimeUnit::Milliseconds, None),
        _ => DataType::String,
    }
}

/// A column of an existing table as SQLite reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub declared_type: String,
}

pub struct Warehouse {
    pool: SqlitePool,
}

impl Warehouse {
    /// Opens (creating if needed) the warehouse file.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open warehouse at {}", path.display()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        table_exists(&mut conn, table).await
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Reads a whole table into a frame, typed by its declared column types.
    pub async fn read_table(&self, table: &str) -> Result<DataFrame> {
        let mut conn = self.pool.acquire().await?;
        read_table(&mut conn, table).await
    }

    /// Drops and recreates `table` from `df` in one transaction.
    pub async fn replace_table(&self, table: &str, df: &DataFrame) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .execute(&mut *tx)
            .await?;
        create_table_for(&mut tx, table, &df.schema(), false).await?;
        insert_frame(&mut tx, table, df).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Whether `table` exists in the main schema or in this connection's temp schema.
pub async fn table_exists(conn: &mut SqliteConnection, table: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ( \
            SELECT name FROM sqlite_master WHERE type = 'table' \
            UNION ALL \
            SELECT name FROM sqlite_temp_master WHERE type = 'table' \
         ) WHERE name = ?",
    )
    .bind(table)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

/// Columns of `table` in declaration order; empty when the table does not exist.
pub async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<TableColumn>> {
    let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(TableColumn {
                name: row.try_get::<String, _>(0)?,
                declared_type: row.try_get::<String, _>(1)?,
            })
        })
        .collect()
}

/// `CREATE TABLE [IF NOT EXISTS]` with one column per schema entry.
pub async fn create_table_for(
    conn: &mut SqliteConnection,
    table: &str,
    schema: &Schema,
    temporary: bool,
) -> Result<()> {
    let columns: Vec<String> = schema
        .iter()
        .map(|(name, dtype)| format!("{} {}", quote_ident(name), sql_type(dtype)))
        .collect();

    if columns.is_empty() {
        return Err(PipelineError::DataProcessing(format!(
            "Cannot create table {table} without columns"
        )));
    }

    let kind = if temporary { "TEMP TABLE" } else { "TABLE IF NOT EXISTS" };
    let ddl = format!("CREATE {kind} {} ({})", quote_ident(table), columns.join(", "));
    sqlx::query(&ddl).execute(&mut *conn).await?;
    Ok(())
}

/// Name-based union of `schema` into an existing table: new columns are added,
/// a same-named column with another declared type is an error.
pub async fn add_missing_columns(
    conn: &mut SqliteConnection,
    table: &str,
    schema: &Schema,
) -> Result<()> {
    let existing = table_columns(conn, table).await?;

    for (name, dtype) in schema.iter() {
        let wanted = sql_type(dtype);
        match existing.iter().find(|c| c.name == name.as_str()) {
            Some(column) if column.declared_type.eq_ignore_ascii_case(wanted) => {}
            Some(column) => {
                return Err(PipelineError::DataProcessing(format!(
                    "Column '{name}' is {wanted} in the file but {} in table {table}",
                    column.declared_type
                )));
            }
            None => {
                let ddl = format!(
                    "ALTER TABLE {} ADD COLUMN {} {wanted}",
                    quote_ident(table),
                    quote_ident(name)
                );
                sqlx::query(&ddl).execute(&mut *conn).await?;
            }
        }
    }
    Ok(())
}

enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

fn sql_value(value: AnyValue<'_>) -> SqlValue {
    match value {
        AnyValue::Null => SqlValue::Null,
        AnyValue::Boolean(b) => SqlValue::Bool(b),
        AnyValue::Int8(v) => SqlValue::Int(i64::from(v)),
        AnyValue::Int16(v) => SqlValue::Int(i64::from(v)),
        AnyValue::Int32(v) => SqlValue::Int(i64::from(v)),
        AnyValue::Int64(v) => SqlValue::Int(v),
        AnyValue::UInt8(v) => SqlValue::Int(i64::from(v)),
        AnyValue::UInt16(v) => SqlValue::Int(i64::from(v)),
        AnyValue::UInt32(v) => SqlValue::Int(i64::from(v)),
        AnyValue::UInt64(v) => i64::try_from(v).map_or(SqlValue::Float(v as f64), SqlValue::Int),
        AnyValue::Float32(v) => SqlValue::Float(f64::from(v)),
        AnyValue::Float64(v) => SqlValue::Float(v),
        AnyValue::String(s) => SqlValue::Text(s.to_owned()),
        AnyValue::StringOwned(s) => SqlValue::Text(s.to_string()),
        AnyValue::Date(days) => date_from_epoch_days(days)
            .map_or(SqlValue::Null, |d| SqlValue::Text(d.format("%Y-%m-%d").to_string())),
        AnyValue::Datetime(v, unit, _) => {
            let millis = match unit {
                TimeUnit::Nanoseconds => v / 1_000_000,
                TimeUnit::Microseconds => v / 1_000,
                TimeUnit::Milliseconds => v,
            };
            chrono::DateTime::from_timestamp_millis(millis).map_or(SqlValue::Null, |dt| {
                SqlValue::Text(dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
            })
        }
        other => SqlValue::Text(other.to_string()),
    }
}

/// SQLite's cap on bound parameters in one statement.
const MAX_BIND_VARIABLES: usize = 32_766;

/// Appends every row of `df` to `table`, naming columns explicitly so table
/// columns missing from the frame are left NULL.
///
/// Rows go out as multi-row `INSERT ... VALUES` statements, chunked so each
/// stays under SQLite's bound-parameter limit.
pub async fn insert_frame(conn: &mut SqliteConnection, table: &str, df: &DataFrame) -> Result<usize> {
    let columns = df.get_columns();
    if columns.is_empty() || df.height() == 0 {
        return Ok(0);
    }

    let names: Vec<String> = columns.iter().map(|c| quote_ident(c.name())).collect();
    let prefix = format!("INSERT INTO {} ({}) ", quote_ident(table), names.join(", "));

    let chunk_size = (MAX_BIND_VARIABLES / columns.len()).max(1);
    let height = df.height();

    for start in (0..height).step_by(chunk_size) {
        let len = chunk_size.min(height - start);
        let rows = (start..start + len)
            .map(|row| {
                columns
                    .iter()
                    .map(|column| Ok(sql_value(column.get(row)?)))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = QueryBuilder::<Sqlite>::new(prefix.as_str());
        builder.push_values(rows, |mut values, row| {
            for value in row {
                match value {
                    SqlValue::Null => values.push_bind(Option::<String>::None),
                    SqlValue::Int(v) => values.push_bind(v),
                    SqlValue::Float(v) => values.push_bind(v),
                    SqlValue::Bool(v) => values.push_bind(v),
                    SqlValue::Text(v) => values.push_bind(v),
                };
            }
        });
        builder.build().execute(&mut *conn).await?;
    }

    Ok(height)
}

enum ColumnBuffer {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Date(Vec<Option<i32>>),
    Datetime(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    fn for_type(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int64 => Self::Int(Vec::new()),
            DataType::Float64 => Self::Float(Vec::new()),
            DataType::Boolean => Self::Bool(Vec::new()),
            DataType::Date => Self::Date(Vec::new()),
            DataType::Datetime(_, _) => Self::Datetime(Vec::new()),
            _ => Self::Text(Vec::new()),
        }
    }

    fn push(&mut self, row: &SqliteRow, idx: usize) -> Result<()> {
        // Unchecked decoding lets SQLite coerce values stored under a looser affinity.
        match self {
            Self::Int(values) => values.push(row.try_get_unchecked::<Option<i64>, _>(idx)?),
            Self::Float(values) => values.push(row.try_get_unchecked::<Option<f64>, _>(idx)?),
            Self::Bool(values) => values.push(row.try_get_unchecked::<Option<bool>, _>(idx)?),
            Self::Date(values) => {
                let text = row.try_get_unchecked::<Option<String>, _>(idx)?;
                values.push(
                    text.and_then(|t| NaiveDate::parse_from_str(t.get(..10).unwrap_or(&t), "%Y-%m-%d").ok())
                        .map(epoch_days),
                );
            }
            Self::Datetime(values) => {
                let text = row.try_get_unchecked::<Option<String>, _>(idx)?;
                values.push(text.and_then(|t| {
                    chrono::NaiveDateTime::parse_from_str(&t, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|dt| dt.and_utc().timestamp_millis())
                }));
            }
            Self::Text(values) => values.push(row.try_get_unchecked::<Option<String>, _>(idx)?),
        }
        Ok(())
    }

    fn into_column(self, name: &str) -> Result<Column> {
        let series = match self {
            Self::Int(v) => Series::new(name.into(), v),
            Self::Float(v) => Series::new(name.into(), v),
            Self::Bool(v) => Series::new(name.into(), v),
            Self::Date(v) => Series::new(name.into(), v).cast(&DataType::Date)?,
            Self::Datetime(v) => Series::new(name.into(), v)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Self::Text(v) => Series::new(name.into(), v),
        };
        Ok(series.into_column())
    }
}

/// Reads a whole table into a frame, typed by its declared column types.
pub async fn read_table(conn: &mut SqliteConnection, table: &str) -> Result<DataFrame> {
    let columns = table_columns(conn, table).await?;
    if columns.is_empty() {
        return Err(PipelineError::MissingReference(format!("table {table} does not exist")));
    }

    let mut buffers: Vec<ColumnBuffer> = columns
        .iter()
        .map(|c| ColumnBuffer::for_type(&polars_type(&c.declared_type)))
        .collect();

    let select_list: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let rows = sqlx::query(&format!(
        "SELECT {} FROM {}",
        select_list.join(", "),
        quote_ident(table)
    ))
    .fetch_all(&mut *conn)
    .await?;

    for row in &rows {
        for (idx, buffer) in buffers.iter_mut().enumerate() {
            buffer.push(row, idx)?;
        }
    }

    let frame_columns = buffers
        .into_iter()
        .zip(&columns)
        .map(|(buffer, column)| buffer.into_column(&column.name))
        .collect::<Result<Vec<_>>>()?;

    Ok(DataFrame::new(frame_columns)?)
}
