//! Canonical gold column names and the raw aliases they are read from.

use crate::ingest::Category;
use crate::reference::{clean_text, integer_from};
use polars::prelude::*;

pub const COMPANY_CODE: &str = "Company Code";
pub const FISCAL_YEAR: &str = "Fiscal Year";
pub const FISCAL_PERIOD: &str = "Fiscal Period";
pub const GL_ACCOUNT: &str = "G/L Account";
pub const COST_CENTER_CODE: &str = "Cost Center Code";
pub const COST_CENTER_NAME: &str = "Cost Center Name";
pub const PARTNER_COST_CENTER_CODE: &str = "Partner Cost Center Code";
pub const PROFIT_CENTER_CODE: &str = "Profit Center Code";
pub const WBS_ELEMENT_CODE: &str = "WBS Element Code";
pub const WBS_ELEMENT_NAME: &str = "WBS Element Name";
pub const PRODUCT_CODE: &str = "Product Code";
pub const DOCUMENT_DATE: &str = "Document Date";
pub const AMOUNT: &str = "Amount";

pub const WBS_TYPE_CHAR: &str = "WBS Type Char";
pub const WBS_GL_ACCOUNT: &str = "WBS G/L Account";
pub const WBS_PROFIT_CENTER_CODE: &str = "WBS Profit Center Code";
pub const GL_COMPASS_CODE: &str = "GL Compass Code";
pub const CC_COMPASS_CODE: &str = "CC Compass Code";
pub const CC_PROFIT_CENTER_CODE: &str = "CC Profit Center Code";
pub const COMPASS_CODE: &str = "Compass Code";
pub const COMPASS_TEXT: &str = "Compass Text";
pub const SIGNATURE_CODE: &str = "Signature Code";
pub const SIGNATURE_DESCRIPTION: &str = "Signature Description";
pub const FISCAL_TYPE: &str = "Fiscal Type";
pub const SCENARIO: &str = "Scenario";
pub const YEAR: &str = "Year";
pub const MONTH: &str = "Month";
pub const PARTITION_DATE: &str = "PartitionDate";
pub const INDEX: &str = "Index";

/// Accepted textual date layouts, tried in order.
pub const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y%m%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free text, kept as read.
    Text,
    /// Identifier: trimmed, blank becomes null.
    Code,
    Integer,
    Float,
    Date,
}

impl ColumnKind {
    pub fn dtype(self) -> DataType {
        match self {
            Self::Text | Self::Code => DataType::String,
            Self::Integer => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Date => DataType::Date,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CanonicalColumn {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub aliases: &'static [&'static str],
}

const fn canonical(
    name: &'static str,
    kind: ColumnKind,
    aliases: &'static [&'static str],
) -> CanonicalColumn {
    CanonicalColumn {
        name,
        kind,
        aliases,
    }
}

/// Columns every category is mapped onto, in gold order.
pub const CANONICAL_COLUMNS: [CanonicalColumn; 24] = [
    canonical(COMPANY_CODE, ColumnKind::Code, &["Company Code"]),
    canonical(FISCAL_YEAR, ColumnKind::Integer, &["Fiscal Year"]),
    canonical(FISCAL_PERIOD, ColumnKind::Integer, &["Fiscal Period", "Period"]),
    canonical(
        GL_ACCOUNT,
        ColumnKind::Integer,
        &["G/L Account", "Cost element", "Cost Element"],
    ),
    canonical(
        "G/L Account Name",
        ColumnKind::Text,
        &["G/L Account Name", "Cost element descr.", "Cost element name"],
    ),
    canonical(COST_CENTER_CODE, ColumnKind::Code, &["Cost Center"]),
    canonical(COST_CENTER_NAME, ColumnKind::Text, &["Cost Center Name"]),
    canonical(
        PARTNER_COST_CENTER_CODE,
        ColumnKind::Code,
        &["Partner Cost Center"],
    ),
    canonical(PROFIT_CENTER_CODE, ColumnKind::Code, &["Profit Center"]),
    canonical("Profit Center Name", ColumnKind::Text, &["Profit Center Name"]),
    canonical(WBS_ELEMENT_CODE, ColumnKind::Code, &["WBS Element"]),
    canonical(WBS_ELEMENT_NAME, ColumnKind::Text, &["WBS Element Name"]),
    canonical(PRODUCT_CODE, ColumnKind::Code, &["Product"]),
    canonical("Material Code", ColumnKind::Code, &["Material"]),
    canonical(
        "Project Code",
        ColumnKind::Code,
        &["Project", "Project definition"],
    ),
    canonical("Project Name", ColumnKind::Text, &["Project Name"]),
    canonical(
        "Purchasing Document",
        ColumnKind::Code,
        &["Purchasing Document"],
    ),
    canonical("Supplier", ColumnKind::Code, &["Supplier"]),
    canonical(
        "Document Type",
        ColumnKind::Text,
        &[
            "Journal Entry Type",
            "Accounting doc type",
            "Reference Doc. Type",
        ],
    ),
    canonical(
        "Description",
        ColumnKind::Text,
        &["Journal Entry Item Text", "Name"],
    ),
    canonical(
        DOCUMENT_DATE,
        ColumnKind::Date,
        &["Document Date", "Posting Date"],
    ),
    canonical(
        AMOUNT,
        ColumnKind::Float,
        &[
            "Amount in Company Code Currency",
            "Val/COArea Crcy",
            "Val.in rep.cur.",
            "Value in Obj. Crcy",
        ],
    ),
    canonical(
        "Quantity",
        ColumnKind::Float,
        &["Total Quantity", "Quantity/Plan"],
    ),
    canonical("Source File", ColumnKind::Text, &["source_file"]),
];

/// Columns added after canonicalization, in gold order.
pub const DERIVED_COLUMNS: [(&str, ColumnKind); 16] = [
    ("WBS Level", ColumnKind::Integer),
    ("WBS Parent Code", ColumnKind::Code),
    ("WBS Parent Name", ColumnKind::Text),
    (WBS_TYPE_CHAR, ColumnKind::Code),
    ("WBS Type", ColumnKind::Text),
    ("WBS Type Local", ColumnKind::Text),
    ("WBS Bucket", ColumnKind::Text),
    (COMPASS_CODE, ColumnKind::Code),
    (COMPASS_TEXT, ColumnKind::Text),
    (SIGNATURE_CODE, ColumnKind::Code),
    (SIGNATURE_DESCRIPTION, ColumnKind::Text),
    (FISCAL_TYPE, ColumnKind::Text),
    (SCENARIO, ColumnKind::Text),
    (YEAR, ColumnKind::Integer),
    (MONTH, ColumnKind::Integer),
    (PARTITION_DATE, ColumnKind::Date),
];

/// Aliases a category consults before the shared ones.
fn category_aliases(category: Category, canonical: &str) -> &'static [&'static str] {
    match (category, canonical) {
        (Category::CommitCc, COST_CENTER_CODE) | (Category::CommitWbs, WBS_ELEMENT_CODE) => {
            &["Object"]
        }
        (Category::CommitCc, COST_CENTER_NAME) | (Category::CommitWbs, WBS_ELEMENT_NAME) => {
            &["CO Object Name"]
        }
        _ => &[],
    }
}

/// Gold schema without `Index`: canonical columns then derived ones.
pub fn gold_fields() -> Vec<(&'static str, DataType)> {
    CANONICAL_COLUMNS
        .iter()
        .map(|c| (c.name, c.kind.dtype()))
        .chain(DERIVED_COLUMNS.iter().map(|&(name, kind)| (name, kind.dtype())))
        .collect()
}

pub fn gold_schema() -> Schema {
    std::iter::once(Field::new(INDEX.into(), DataType::Int64))
        .chain(
            gold_fields()
                .into_iter()
                .map(|(name, dtype)| Field::new(name.into(), dtype)),
        )
        .collect()
}

/// First layout in [`DATE_FORMATS`] that parses; anything else is null.
pub fn parse_date(expr: Expr) -> Expr {
    let text = expr.cast(DataType::String).str().strip_chars(lit(NULL));
    let attempts: Vec<Expr> = DATE_FORMATS
        .iter()
        .map(|format| {
            text.clone().str().to_date(StrptimeOptions {
                format: Some((*format).into()),
                strict: false,
                exact: true,
                ..Default::default()
            })
        })
        .collect();
    coalesce(&attempts)
}

/// Parses every text column whose name mentions "date".
pub fn parse_date_columns(df: &DataFrame) -> PolarsResult<DataFrame> {
    let exprs: Vec<Expr> = df
        .get_columns()
        .iter()
        .map(|column| {
            let name = column.name().as_str();
            if column.dtype() == &DataType::String && name.to_lowercase().contains("date") {
                parse_date(col(name)).alias(name)
            } else {
                col(name)
            }
        })
        .collect();
    df.clone().lazy().select(exprs).collect()
}

fn converted(df: &DataFrame, source: &str, kind: ColumnKind) -> Expr {
    let dtype = df.column(source).map(|c| c.dtype().clone());
    match kind {
        ColumnKind::Text => col(source).cast(DataType::String),
        ColumnKind::Code => clean_text(col(source)),
        ColumnKind::Integer => integer_from(df, source),
        ColumnKind::Float => match dtype {
            Ok(DataType::String) => col(source)
                .str()
                .strip_chars(lit(NULL))
                .cast(DataType::Float64),
            _ => col(source).cast(DataType::Float64),
        },
        ColumnKind::Date => match dtype {
            Ok(DataType::Date) => col(source),
            Ok(DataType::Datetime(_, _)) => col(source).cast(DataType::Date),
            _ => parse_date(col(source)),
        },
    }
}

/// Maps a staging frame onto the canonical columns. The first present alias
/// wins; a column with no alias present comes out all-null.
pub fn canonicalize(raw: &DataFrame, category: Category) -> LazyFrame {
    let exprs: Vec<Expr> = CANONICAL_COLUMNS
        .iter()
        .map(|column| {
            category_aliases(category, column.name)
                .iter()
                .chain(column.aliases)
                .find(|alias| raw.get_column_index(alias).is_some())
                .map_or_else(
                    || lit(NULL).cast(column.kind.dtype()),
                    |alias| converted(raw, alias, column.kind),
                )
                .alias(column.name)
        })
        .collect();
    raw.clone().lazy().select(exprs)
}

/// Selects exactly the gold columns (minus `Index`), adding typed nulls for
/// the missing ones, so category results can be stacked.
pub fn conform(mut lf: LazyFrame) -> PolarsResult<LazyFrame> {
    let schema = lf.collect_schema()?;
    let exprs: Vec<Expr> = gold_fields()
        .into_iter()
        .map(|(name, dtype)| {
            if schema.contains(name) {
                col(name).cast(dtype)
            } else {
                lit(NULL).cast(dtype).alias(name)
            }
        })
        .collect();
    Ok(lf.select(exprs))
}
