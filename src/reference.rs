//! Reference resolution: turns the `meta_*` tables into the five lookup
//! frames every gold pipeline joins against.
//!
//! All transforms here are pure functions over collected frames. Joins declare
//! their cardinality up front and fail with
//! [`PipelineError::SchemaIntegrity`] when the data breaks it.

use crate::error::{PipelineError, Result};
use crate::warehouse::Warehouse;
use polars::prelude::*;
use tracing::{debug, info};

pub const META_WBS_ELEMENTS: &str = "meta_wbs_elements";
pub const META_WBS_CODIFICATION: &str = "meta_wbs_codification";
pub const META_PROFIT_CENTERS: &str = "meta_profit_centers";
pub const META_SIGNATURES: &str = "meta_signatures";
pub const META_COST_CENTERS: &str = "meta_cost_centers";
pub const META_NODE_TO_COMPASS: &str = "meta_node_to_compass";
pub const META_GL_ACCOUNTS: &str = "meta_gl_accounts";
pub const META_GL_TO_COMPASS: &str = "meta_gl_to_compass";
pub const META_FS_ITEMS: &str = "meta_fs_items";

/// Declared shape of a join, checked before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
}

impl Cardinality {
    fn left_unique(self) -> bool {
        matches!(self, Self::OneToOne | Self::OneToMany)
    }

    fn right_unique(self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }
}

/// Trims a text expression and turns blanks into nulls.
pub fn clean_text(expr: Expr) -> Expr {
    let trimmed = expr.cast(DataType::String).str().strip_chars(lit(NULL));
    when(trimmed.clone().eq(lit("")))
        .then(lit(NULL).cast(DataType::String))
        .otherwise(trimmed)
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

/// Cleaned text from the first present source column, or a null column.
fn text_from(df: &DataFrame, sources: &[&str]) -> Expr {
    sources
        .iter()
        .find(|name| has_column(df, name))
        .map_or_else(
            || lit(NULL).cast(DataType::String),
            |name| clean_text(col(*name)),
        )
}

/// Integer view of a code column that may have been stored as text.
pub(crate) fn integer_from(df: &DataFrame, source: &str) -> Expr {
    match df.column(source).map(|c| c.dtype().clone()) {
        Ok(dtype) if dtype.is_integer() || dtype.is_float() => col(source).cast(DataType::Int64),
        Ok(_) => col(source)
            .cast(DataType::String)
            .str()
            .strip_chars(lit(NULL))
            .cast(DataType::Int64),
        Err(_) => lit(NULL).cast(DataType::Int64),
    }
}

pub fn require_columns(df: &DataFrame, table: &str, columns: &[&str]) -> Result<()> {
    let missing: Vec<&str> = columns
        .iter()
        .copied()
        .filter(|name| !has_column(df, name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::MissingReference(format!(
            "table {table} lacks required column(s): {}",
            missing.join(", ")
        )))
    }
}

/// Fails when a non-null value of `key` occurs more than once.
pub fn ensure_unique_key(df: &DataFrame, key: &str, context: &str) -> Result<()> {
    let duplicates = df
        .clone()
        .lazy()
        .filter(col(key).is_not_null())
        .group_by([col(key)])
        .agg([len().alias("occurrences")])
        .filter(col("occurrences").gt(lit(1)))
        .collect()?;

    if duplicates.height() == 0 {
        return Ok(());
    }

    let example = duplicates.column(key)?.get(0)?;
    let occurrences = duplicates.column("occurrences")?.get(0)?;
    Err(PipelineError::integrity(
        context,
        format!(
            "{} duplicated value(s) of '{key}', e.g. {example} occurs {occurrences} times",
            duplicates.height()
        ),
    ))
}

/// Joins `right` onto `left` by the shared column `on` after checking the
/// declared cardinality. Null keys are ignored by the check and never match.
pub fn validated_join(
    left: LazyFrame,
    right: &DataFrame,
    on: &str,
    how: JoinType,
    cardinality: Cardinality,
    context: &str,
) -> Result<LazyFrame> {
    if cardinality.right_unique() {
        ensure_unique_key(right, on, context)?;
    }
    if cardinality.left_unique() {
        let keys = left.clone().select([col(on)]).collect()?;
        ensure_unique_key(&keys, on, context)?;
    }
    debug!("Joining {context} on '{on}' ({cardinality:?})");

    Ok(left.join(
        right.clone().lazy(),
        [col(on)],
        [col(on)],
        JoinArgs::new(how),
    ))
}

/// Raw reference tables as produced by the metadata loader.
pub struct ReferenceTables {
    pub wbs_elements: DataFrame,
    pub wbs_codification: DataFrame,
    pub profit_centers: DataFrame,
    pub signatures: DataFrame,
    pub cost_centers: DataFrame,
    pub node_to_compass: DataFrame,
    pub gl_accounts: DataFrame,
    pub gl_to_compass: DataFrame,
    pub fs_items: DataFrame,
}

impl ReferenceTables {
    /// Reads every `meta_*` table. A missing table or required column is fatal.
    pub async fn load(warehouse: &Warehouse) -> Result<Self> {
        async fn read(warehouse: &Warehouse, table: &str, required: &[&str]) -> Result<DataFrame> {
            let df = warehouse.read_table(table).await?;
            require_columns(&df, table, required)?;
            debug!("Loaded {table}: {} rows", df.height());
            Ok(df)
        }

        Ok(Self {
            wbs_elements: read(
                warehouse,
                META_WBS_ELEMENTS,
                &["WBS Element", "WBS Element Name", "Level"],
            )
            .await?,
            wbs_codification: read(warehouse, META_WBS_CODIFICATION, &["Type Char"]).await?,
            profit_centers: read(
                warehouse,
                META_PROFIT_CENTERS,
                &["Profit Center", "Signature Code"],
            )
            .await?,
            signatures: read(
                warehouse,
                META_SIGNATURES,
                &["Signature Code", "Signature Description"],
            )
            .await?,
            cost_centers: read(
                warehouse,
                META_COST_CENTERS,
                &["Cost Center", "Standard Hierarchy Node"],
            )
            .await?,
            node_to_compass: read(
                warehouse,
                META_NODE_TO_COMPASS,
                &["Standard Hierarchy Node", "Compass Code"],
            )
            .await?,
            gl_accounts: read(warehouse, META_GL_ACCOUNTS, &["G/L Account"]).await?,
            gl_to_compass: read(
                warehouse,
                META_GL_TO_COMPASS,
                &["Financial Statement Item", "Account To"],
            )
            .await?,
            fs_items: read(warehouse, META_FS_ITEMS, &["Financial Statement Item"]).await?,
        })
    }
}

/// Parent code/name and type char for each WBS row, by one ordered scan.
///
/// Order-sensitive: rows must arrive in hierarchy traversal order. The most
/// recent level-1 row seeds the parent of every row after it; a level-1 row
/// with a null code or name keeps the previous value for that field.
fn wbs_parents(df: &DataFrame) -> Result<[Column; 3]> {
    let levels = df.column("WBS Level")?.i64()?;
    let codes = df.column("WBS Element Code")?.str()?;
    let names = df.column("WBS Element Name")?.str()?;

    let mut parent_code: Option<String> = None;
    let mut parent_name: Option<String> = None;
    let mut parent_codes = Vec::with_capacity(df.height());
    let mut parent_names = Vec::with_capacity(df.height());
    let mut type_chars = Vec::with_capacity(df.height());

    for ((level, code), name) in levels.into_iter().zip(codes).zip(names) {
        if level == Some(1) {
            if let Some(code) = code {
                parent_code = Some(code.to_owned());
            }
            if let Some(name) = name {
                parent_name = Some(name.to_owned());
            }
        }
        parent_codes.push(parent_code.clone());
        parent_names.push(parent_name.clone());
        type_chars.push(code.and_then(|c| c.chars().next()).map(String::from));
    }

    Ok([
        Column::new("WBS Parent Code".into(), parent_codes),
        Column::new("WBS Parent Name".into(), parent_names),
        Column::new("WBS Type Char".into(), type_chars),
    ])
}

/// WBS elements with parent, type char and codification bucket.
pub fn enhance_wbs(elements: &DataFrame, codification: &DataFrame) -> Result<DataFrame> {
    let mut wbs = elements
        .clone()
        .lazy()
        .select([
            clean_text(col("WBS Element")).alias("WBS Element Code"),
            col("WBS Element Name")
                .cast(DataType::String)
                .alias("WBS Element Name"),
            integer_from(elements, "Level").alias("WBS Level"),
            integer_from(elements, "P&L_Destination").alias("WBS G/L Account"),
            text_from(elements, &["Profit Center"]).alias("WBS Profit Center Code"),
        ])
        .collect()?;

    for column in wbs_parents(&wbs)? {
        wbs.with_column(column)?;
    }

    let types = codification
        .clone()
        .lazy()
        .select([
            clean_text(col("Type Char")).alias("WBS Type Char"),
            text_from(codification, &["Type"]).alias("WBS Type"),
            text_from(codification, &["Type Local"]).alias("WBS Type Local"),
            text_from(codification, &["Bucket", "WBS Bucket"]).alias("WBS Bucket"),
        ])
        .collect()?;

    let enhanced = validated_join(
        wbs.lazy(),
        &types,
        "WBS Type Char",
        JoinType::Left,
        Cardinality::ManyToOne,
        "wbs_codification",
    )?
    .collect()?;
    Ok(enhanced)
}

/// Profit centers with their signature code and description.
pub fn link_profit_center_signature(
    profit_centers: &DataFrame,
    signatures: &DataFrame,
) -> Result<DataFrame> {
    let centers = profit_centers.clone().lazy().select([
        clean_text(col("Profit Center")).alias("Profit Center Code"),
        clean_text(col("Signature Code")).alias("Signature Code"),
    ]);
    let descriptions = signatures
        .clone()
        .lazy()
        .select([
            clean_text(col("Signature Code")).alias("Signature Code"),
            col("Signature Description")
                .cast(DataType::String)
                .alias("Signature Description"),
        ])
        .collect()?;

    Ok(validated_join(
        centers,
        &descriptions,
        "Signature Code",
        JoinType::Left,
        Cardinality::ManyToOne,
        "profit_centers_to_signatures",
    )?
    .collect()?)
}

/// Cost centers mapped to a compass code through their hierarchy node.
/// Cost centers whose node has no mapping are dropped.
pub fn link_cost_center_compass(
    cost_centers: &DataFrame,
    node_to_compass: &DataFrame,
) -> Result<DataFrame> {
    let centers = cost_centers.clone().lazy().select([
        clean_text(col("Cost Center")).alias("Cost Center Code"),
        clean_text(col("Standard Hierarchy Node")).alias("Standard Hierarchy Node"),
        text_from(cost_centers, &["Profit Center"]).alias("CC Profit Center Code"),
    ]);
    let nodes = node_to_compass
        .clone()
        .lazy()
        .select([
            clean_text(col("Standard Hierarchy Node")).alias("Standard Hierarchy Node"),
            clean_text(col("Compass Code")).alias("CC Compass Code"),
        ])
        .collect()?;

    Ok(validated_join(
        centers,
        &nodes,
        "Standard Hierarchy Node",
        JoinType::Inner,
        Cardinality::ManyToOne,
        "cost_center_to_compass",
    )?
    .select([
        col("Cost Center Code"),
        col("CC Compass Code"),
        col("CC Profit Center Code"),
    ])
    .collect()?)
}

/// G/L accounts with their compass code. Each account maps to at most one code.
pub fn link_gl_compass(gl_accounts: &DataFrame, gl_to_compass: &DataFrame) -> Result<DataFrame> {
    let accounts = gl_accounts
        .clone()
        .lazy()
        .select([integer_from(gl_accounts, "G/L Account").alias("G/L Account")]);
    let mapping = gl_to_compass
        .clone()
        .lazy()
        .select([
            integer_from(gl_to_compass, "Account To").alias("G/L Account"),
            clean_text(col("Financial Statement Item")).alias("GL Compass Code"),
        ])
        .collect()?;

    Ok(validated_join(
        accounts,
        &mapping,
        "G/L Account",
        JoinType::Left,
        Cardinality::OneToOne,
        "gl_to_compass",
    )?
    .collect()?)
}

/// Compass code → display text. Blank text falls back to the code itself.
pub fn compass_codes(fs_items: &DataFrame) -> Result<DataFrame> {
    let code = clean_text(col("Financial Statement Item"));
    Ok(fs_items
        .clone()
        .lazy()
        .select([
            code.clone().alias("Compass Code"),
            coalesce(&[text_from(fs_items, &["Text"]), code]).alias("Compass Text"),
        ])
        .collect()?)
}

/// The five derived lookup frames. Every gold pipeline borrows the whole set,
/// so a frame cannot be forgotten for one category.
#[derive(Debug, Clone)]
pub struct ReferenceFrames {
    pub wbs_enhanced: DataFrame,
    pub gl_to_compass: DataFrame,
    pub cost_center_to_compass: DataFrame,
    pub compass_codes: DataFrame,
    pub profit_centers_to_signatures: DataFrame,
}

impl ReferenceFrames {
    pub fn build(tables: &ReferenceTables) -> Result<Self> {
        let frames = Self {
            wbs_enhanced: enhance_wbs(&tables.wbs_elements, &tables.wbs_codification)?,
            gl_to_compass: link_gl_compass(&tables.gl_accounts, &tables.gl_to_compass)?,
            cost_center_to_compass: link_cost_center_compass(
                &tables.cost_centers,
                &tables.node_to_compass,
            )?,
            compass_codes: compass_codes(&tables.fs_items)?,
            profit_centers_to_signatures: link_profit_center_signature(
                &tables.profit_centers,
                &tables.signatures,
            )?,
        };
        info!(
            "Reference frames built: {} WBS elements, {} G/L accounts, {} cost centers, {} compass codes, {} profit centers",
            frames.wbs_enhanced.height(),
            frames.gl_to_compass.height(),
            frames.cost_center_to_compass.height(),
            frames.compass_codes.height(),
            frames.profit_centers_to_signatures.height()
        );
        Ok(frames)
    }

    pub async fn load(warehouse: &Warehouse) -> Result<Self> {
        Self::build(&ReferenceTables::load(warehouse).await?)
    }
}
