//! Year/Month-partitioned parquet output and the materialized gold table.
//!
//! Writing is overwrite-or-ignore: a partition present in the new dataset is
//! replaced, every other partition under the root is left alone.

use crate::error::{Result, ResultExt as _};
use crate::gold::columns::{MONTH, PARTITION_DATE, YEAR};
use crate::warehouse::Warehouse;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory value used for a null partition key.
pub const HIVE_DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";
pub const PARTITION_FILE: &str = "part-0.parquet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPartition {
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub rows: usize,
    pub path: PathBuf,
}

fn key_segment(name: &str, value: Option<i64>) -> String {
    match value {
        Some(v) => format!("{name}={v}"),
        None => format!("{name}={HIVE_DEFAULT_PARTITION}"),
    }
}

pub fn partition_dir(root: &Path, year: Option<i64>, month: Option<i64>) -> PathBuf {
    root.join(key_segment(YEAR, year))
        .join(key_segment(MONTH, month))
}

fn first_key(df: &DataFrame, name: &str) -> Result<Option<i64>> {
    let values = df.column(name)?.cast(&DataType::Int64)?;
    Ok(values.i64()?.get(0))
}

/// Writes one parquet file per (Year, Month). Partition columns live in the
/// path only. Each file is written beside its target and renamed over it.
pub fn write_partitions(gold: &DataFrame, root: &Path) -> Result<Vec<WrittenPartition>> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create output root {}", root.display()))?;

    let mut written = Vec::new();
    for part in gold.partition_by_stable([YEAR, MONTH], true)? {
        let year = first_key(&part, YEAR)?;
        let month = first_key(&part, MONTH)?;
        let mut data = part.drop(YEAR)?.drop(MONTH)?;

        let dir = partition_dir(root, year, month);
        std::fs::create_dir_all(&dir)?;
        let target = dir.join(PARTITION_FILE);
        let staging = dir.join(format!("{PARTITION_FILE}.tmp"));

        let file = std::fs::File::create(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        ParquetWriter::new(file).finish(&mut data)?;
        std::fs::rename(&staging, &target)
            .with_context(|| format!("Failed to replace {}", target.display()))?;

        debug!("Wrote {} rows to {}", data.height(), target.display());
        written.push(WrittenPartition {
            year,
            month,
            rows: data.height(),
            path: target,
        });
    }

    info!(
        "Wrote {} partition(s) under {}",
        written.len(),
        root.display()
    );
    Ok(written)
}

/// Replaces `table` with the gold dataset, `PartitionDate` as a timestamp.
pub async fn materialize(warehouse: &Warehouse, gold: &DataFrame, table: &str) -> Result<()> {
    let mut df = gold.clone();
    let timestamps = df
        .column(PARTITION_DATE)?
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    df.with_column(timestamps)?;

    warehouse.replace_table(table, &df).await?;
    info!("Materialized {} gold rows into table {table}", df.height());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse;
    use tempfile::TempDir;

    fn gold() -> Result<DataFrame> {
        let mut df = df!(
            "Index" => &[1i64, 2, 3, 4],
            YEAR => &[Some(2024i64), Some(2024), Some(2024), None],
            MONTH => &[Some(3i64), Some(3), Some(4), None],
            "Amount" => &[1.0f64, 2.0, 3.0, 4.0]
        )?;
        let dates = Series::new(PARTITION_DATE.into(), &[Some(19_783i32), Some(19_783), Some(19_814), None])
            .cast(&DataType::Date)?;
        df.with_column(dates)?;
        Ok(df)
    }

    fn read(path: &Path) -> Result<DataFrame> {
        Ok(ParquetReader::new(std::fs::File::open(path)?).finish()?)
    }

    #[test]
    fn test_partitions_layout() -> Result<()> {
        let temp = TempDir::new()?;
        let written = write_partitions(&gold()?, temp.path())?;
        assert_eq!(written.len(), 3);

        let march = temp.path().join("Year=2024").join("Month=3").join(PARTITION_FILE);
        let df = read(&march)?;
        assert_eq!(df.height(), 2);
        assert!(df.column(YEAR).is_err());
        assert!(df.column(MONTH).is_err());
        assert!(df.column(PARTITION_DATE).is_ok());

        let unknown = partition_dir(temp.path(), None, None).join(PARTITION_FILE);
        assert!(unknown.ends_with(
            Path::new("Year=__HIVE_DEFAULT_PARTITION__/Month=__HIVE_DEFAULT_PARTITION__/part-0.parquet")
        ));
        assert_eq!(read(&unknown)?.height(), 1);
        assert!(!march.with_extension("parquet.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_rewrite_only_touches_present_partitions() -> Result<()> {
        let temp = TempDir::new()?;
        write_partitions(&gold()?, temp.path())?;

        let update = gold()?
            .lazy()
            .filter(col(MONTH).eq(lit(3i64)))
            .limit(1)
            .collect()?;
        write_partitions(&update, temp.path())?;

        let march = temp.path().join("Year=2024/Month=3").join(PARTITION_FILE);
        let april = temp.path().join("Year=2024/Month=4").join(PARTITION_FILE);
        assert_eq!(read(&march)?.height(), 1);
        assert_eq!(read(&april)?.height(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_materialize_stores_timestamp() -> Result<()> {
        let temp = TempDir::new()?;
        let warehouse = Warehouse::open(&temp.path().join("wh.db")).await?;

        materialize(&warehouse, &gold()?, "gold_ledger").await?;
        materialize(&warehouse, &gold()?, "gold_ledger").await?;
        assert_eq!(warehouse.row_count("gold_ledger").await?, 4);

        let mut conn = warehouse.pool().acquire().await?;
        let columns = warehouse::table_columns(&mut conn, "gold_ledger").await?;
        let partition = columns.iter().find(|c| c.name == PARTITION_DATE);
        assert_eq!(partition.map(|c| c.declared_type.as_str()), Some("TIMESTAMP"));
        Ok(())
    }
}
