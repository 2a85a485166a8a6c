//! Reads one raw extract into a typed frame.
//!
//! Both input formats end up with the same schema: the declared numeric
//! columns below are cast strictly, every other column is text.

use crate::error::{PipelineError, Result};
use crate::utils::{file_name, partition_date_column};
use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

pub const SOURCE_FILE_COLUMN: &str = "source_file";
pub const PARTITION_DATE_COLUMN: &str = "PartitionDate";

const FISCAL_YEAR: &str = "Fiscal Year";
const PERIOD_COLUMNS: [&str; 2] = ["Fiscal Period", "Period"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawType {
    Integer,
    Float,
}

impl RawType {
    fn dtype(self) -> DataType {
        match self {
            Self::Integer => DataType::Int64,
            Self::Float => DataType::Float64,
        }
    }
}

/// Columns with a non-text type. Anything not listed is read as text.
pub const RAW_COLUMN_TYPES: [(&str, RawType); 13] = [
    ("Amount in Company Code Currency", RawType::Float),
    ("Distribution Channel", RawType::Integer),
    ("Fiscal Period", RawType::Integer),
    ("Fiscal Year", RawType::Integer),
    ("G/L Account", RawType::Integer),
    ("Period", RawType::Integer),
    ("Quantity/Plan", RawType::Float),
    ("Reference Item", RawType::Integer),
    ("Total Quantity", RawType::Float),
    ("Val.in rep.cur.", RawType::Float),
    ("Val/COArea Crcy", RawType::Float),
    ("Value TranCurr", RawType::Float),
    ("Value in Obj. Crcy", RawType::Float),
];

pub fn raw_type(column: &str) -> Option<RawType> {
    RAW_COLUMN_TYPES
        .iter()
        .find(|(name, _)| *name == column)
        .map(|&(_, kind)| kind)
}

/// Extracts come out of the source system as ISO-8859-1.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    let bytes = std::fs::read(path)?;
    let text = decode_latin1(&bytes);

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;
    Ok(df)
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = std::fs::File::open(path)?;
    Ok(ParquetReader::new(file).finish()?)
}

/// Casts every column to its declared type (text by default). A non-empty
/// value that does not parse is an error, not a null.
pub fn apply_raw_types(mut df: DataFrame) -> Result<DataFrame> {
    let schema = df.schema().clone();
    let exprs: Vec<Expr> = schema
        .iter()
        .map(|(name, dtype)| {
            let source = col(name.as_str());
            match raw_type(name) {
                Some(kind) if dtype == &DataType::String => source
                    .str()
                    .strip_chars(lit(NULL))
                    .strict_cast(kind.dtype())
                    .alias(name.as_str()),
                Some(kind) => source.strict_cast(kind.dtype()).alias(name.as_str()),
                None if dtype == &DataType::String => source,
                // calendar values become ISO text, the same shape a CSV date has
                None if matches!(dtype, DataType::Datetime(_, _)) => source
                    .cast(DataType::Date)
                    .cast(DataType::String)
                    .alias(name.as_str()),
                None => source.cast(DataType::String).alias(name.as_str()),
            }
        })
        .collect();

    df = df.lazy().select(exprs).collect()?;
    Ok(df)
}

/// Reads `path` into a typed frame stamped with `source_file` and, when the
/// extract carries a fiscal year and period, `PartitionDate`.
pub fn read_raw_file(path: &Path) -> Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    let df = match ext.as_str() {
        "parquet" => read_parquet(path)?,
        "csv" | "txt" => read_csv(path)?,
        _ => {
            return Err(PipelineError::DataProcessing(format!(
                "Unsupported file extension: {ext}"
            )));
        }
    };

    let mut df = apply_raw_types(df)?;
    df.with_column(Series::new(
        SOURCE_FILE_COLUMN.into(),
        vec![file_name(path); df.height()],
    ))?;

    let period = PERIOD_COLUMNS
        .iter()
        .find(|name| df.get_column_index(name).is_some());
    if let (true, Some(period)) = (df.get_column_index(FISCAL_YEAR).is_some(), period) {
        let partition = partition_date_column(&df, FISCAL_YEAR, period, PARTITION_DATE_COLUMN)?;
        df.with_column(partition)?;
    }

    Ok(df)
}
