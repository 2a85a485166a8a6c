//! File discovery and fiscal calendar helpers shared by the loader and the
//! gold transformer.

use crate::error::{Result, ResultExt as _};
use chrono::{Datelike as _, NaiveDate};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Highest fiscal period accepted; 13..=16 are year-end special periods.
pub const MAX_FISCAL_PERIOD: i64 = 16;

/// List all files in `directory` with the given extension (case-insensitive),
/// sorted by file name.
pub fn list_files_by_extension(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(directory)
        .with_context(|| format!("Failed to read directory {}", directory.display()))?;

    for entry in entries {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Joins each source path onto `project_path` (when given) and keeps the ones
/// that exist as directories. Missing directories are logged and skipped.
pub fn resolve_source_dirs(project_path: Option<&Path>, source_paths: &[PathBuf]) -> Vec<PathBuf> {
    source_paths
        .iter()
        .map(|p| match project_path {
            Some(root) => root.join(p),
            None => p.clone(),
        })
        .filter(|dir| {
            let ok = dir.is_dir();
            if !ok {
                warn!("Source path {} does not exist or is not a dir", dir.display());
            }
            ok
        })
        .collect()
}

/// Collects every matching file from all source directories.
pub fn discover_files(dirs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in dirs {
        files.extend(list_files_by_extension(dir, extension)?);
    }
    Ok(files)
}

/// File name used as the ledger key and as `source_file`.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// First calendar day of a fiscal year/period. Special periods clamp to December.
pub fn first_of_month(year: i64, period: i64) -> Option<NaiveDate> {
    if !(1..=MAX_FISCAL_PERIOD).contains(&period) {
        return None;
    }
    let year = i32::try_from(year).ok()?;
    let month = u32::try_from(period.min(12)).ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Days since the Unix epoch, the physical representation of a polars `Date`.
pub fn epoch_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - NaiveDate::from_ymd_opt(1970, 1, 1).map_or(0, |d| d.num_days_from_ce())
}

/// Inverse of [`epoch_days`].
pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(chrono::Duration::days(i64::from(days)))
}

/// Builds a `Date` column holding the first day of each row's year/period.
///
/// Rows where either input is null (or the period is out of range) get null.
pub fn partition_date_column(
    df: &DataFrame,
    year_col: &str,
    period_col: &str,
    name: &str,
) -> Result<Column> {
    let years = df.column(year_col)?.cast(&DataType::Int64)?;
    let periods = df.column(period_col)?.cast(&DataType::Int64)?;

    let days: Vec<Option<i32>> = years
        .i64()?
        .into_iter()
        .zip(periods.i64()?)
        .map(|(year, period)| match (year, period) {
            (Some(y), Some(p)) => first_of_month(y, p).map(epoch_days),
            _ => None,
        })
        .collect();

    Ok(Series::new(name.into(), days)
        .cast(&DataType::Date)?
        .into_column())
}
