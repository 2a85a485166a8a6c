//! Per-category gold pipelines and the final assembly of the gold dataset.

use super::columns::{
    FISCAL_PERIOD, FISCAL_YEAR, INDEX, MONTH, PARTITION_DATE, PROFIT_CENTER_CODE, SCENARIO, YEAR,
    canonicalize, conform, gold_schema, parse_date_columns,
};
use super::enrich::{
    CompassResolution, FiscalType, apply_wbs_override, attach_compass_text, attach_signature,
    classify_fiscal_type, classify_fiscal_type_excluding_non_project, fixed_fiscal_type,
    invert_sign, resolve_compass,
};
use crate::error::Result;
use crate::ingest::Category;
use crate::reference::ReferenceFrames;
use crate::utils::partition_date_column;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Label distinguishing the record families in the gold dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Scenario {
    Actuals,
    Committed,
    CostCenterDetails,
    Budget,
    LiveEstimate,
    PreBudget,
    Trend,
}

impl Scenario {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Actuals => "Actuals",
            Self::Committed => "Committed",
            Self::CostCenterDetails => "Cost Center Details",
            Self::Budget => "Budget",
            Self::LiveEstimate => "Live Estimate",
            Self::PreBudget => "Pre-Budget",
            Self::Trend => "Trend",
        }
    }

    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Actuals => Self::Actuals,
            Category::CommitCc | Category::CommitWbs => Self::Committed,
            Category::CostCenterDetails => Self::CostCenterDetails,
            Category::WbsBudget | Category::ForecastBudget => Self::Budget,
            Category::ForecastLiveEstimate => Self::LiveEstimate,
            Category::ForecastPreBudget => Self::PreBudget,
            Category::ForecastTrend => Self::Trend,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn finish(lf: LazyFrame, scenario: Scenario) -> Result<LazyFrame> {
    Ok(conform(lf.with_column(lit(scenario.as_str()).alias(SCENARIO)))?)
}

pub fn transform_actuals(raw: &DataFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    let lf = canonicalize(raw, Category::Actuals);
    let lf = apply_wbs_override(lf, refs)?;
    let lf = resolve_compass(lf, refs, CompassResolution::CostCenterFallback)?;
    let lf = attach_compass_text(lf, refs)?;
    let lf = attach_signature(lf, refs)?;
    let lf = invert_sign(lf);
    let lf = classify_fiscal_type_excluding_non_project(lf);
    finish(lf, Scenario::Actuals)
}

pub fn transform_cost_center_details(raw: &DataFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    let lf = canonicalize(raw, Category::CostCenterDetails);
    let lf = apply_wbs_override(lf, refs)?;
    let lf = resolve_compass(
        lf,
        refs,
        CompassResolution::CostCenterFallbackWithProfitCenter,
    )?;
    let lf = attach_compass_text(lf, refs)?;
    let lf = invert_sign(lf);
    let lf = attach_signature(lf, refs)?;
    let lf = classify_fiscal_type(lf);
    finish(lf, Scenario::CostCenterDetails)
}

/// Committed costs booked on WBS elements. Always fiscal type WBS.
pub fn transform_commit_wbs(raw: &DataFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    let raw = parse_date_columns(raw)?;
    let lf = canonicalize(&raw, Category::CommitWbs)
        .with_column(lit(NULL).cast(DataType::String).alias(PROFIT_CENTER_CODE));
    let lf = fixed_fiscal_type(lf, FiscalType::Wbs);
    let lf = apply_wbs_override(lf, refs)?;
    let lf = resolve_compass(lf, refs, CompassResolution::GlOnly)?;
    let lf = attach_compass_text(lf, refs)?;
    Ok(conform(lf)?)
}

/// Committed costs booked on cost centers. Always fiscal type COST CENTER.
pub fn transform_commit_cc(raw: &DataFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    let raw = parse_date_columns(raw)?;
    let lf = canonicalize(&raw, Category::CommitCc);
    let lf = fixed_fiscal_type(lf, FiscalType::CostCenter);
    let lf = resolve_compass(lf, refs, CompassResolution::CostCenterFallback)?;
    let lf = attach_compass_text(lf, refs)?;
    Ok(conform(lf)?)
}

/// Both committed sides stacked (WBS first), then signed by profit center.
pub fn transform_committed(
    wbs: Option<&DataFrame>,
    cost_centers: Option<&DataFrame>,
    refs: &ReferenceFrames,
) -> Result<Option<LazyFrame>> {
    let mut sides = Vec::new();
    if let Some(raw) = wbs {
        sides.push(transform_commit_wbs(raw, refs)?);
    }
    if let Some(raw) = cost_centers {
        sides.push(transform_commit_cc(raw, refs)?);
    }
    if sides.is_empty() {
        return Ok(None);
    }

    let committed = concat(sides, UnionArgs::default())?;
    let committed = attach_signature(committed, refs)?;
    Ok(Some(finish(committed, Scenario::Committed)?))
}

/// Budget and forecast extracts. Amounts keep their sign.
pub fn transform_plan(
    raw: &DataFrame,
    category: Category,
    refs: &ReferenceFrames,
) -> Result<LazyFrame> {
    let lf = canonicalize(raw, category);
    let lf = apply_wbs_override(lf, refs)?;
    let lf = resolve_compass(lf, refs, CompassResolution::CostCenterFallback)?;
    let lf = attach_compass_text(lf, refs)?;
    let lf = attach_signature(lf, refs)?;
    let lf = classify_fiscal_type(lf);
    finish(lf, Scenario::for_category(category))
}

/// Stacks the category results and adds `Year`, `Month`, `PartitionDate` and
/// a dense 1-based `Index` as the first column.
pub fn assemble(parts: Vec<LazyFrame>) -> Result<DataFrame> {
    if parts.is_empty() {
        return Ok(DataFrame::empty_with_schema(&gold_schema()));
    }

    let stacked = concat(parts, UnionArgs::default())?
        .with_columns([col(FISCAL_YEAR).alias(YEAR), col(FISCAL_PERIOD).alias(MONTH)]);
    let mut df = conform(stacked)?.collect()?;

    let partition = partition_date_column(&df, YEAR, MONTH, PARTITION_DATE)?;
    df.with_column(partition)?;

    let mut df = df.with_row_index(INDEX.into(), Some(1))?;
    let index = df.column(INDEX)?.cast(&DataType::Int64)?;
    df.with_column(index)?;
    Ok(df)
}

/// Runs every staged category through its pipeline, in [`Category::ALL`]
/// order, and assembles the gold dataset.
pub fn build_gold(staged: &[(Category, DataFrame)], refs: &ReferenceFrames) -> Result<DataFrame> {
    let frame = |category: Category| {
        staged
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, df)| df)
    };

    let mut parts = Vec::new();
    for category in Category::ALL {
        let part = match category {
            // stacked together with commit_cc
            Category::CommitWbs => continue,
            Category::CommitCc => transform_committed(
                frame(Category::CommitWbs),
                frame(Category::CommitCc),
                refs,
            )?,
            Category::Actuals => frame(category)
                .map(|raw| transform_actuals(raw, refs))
                .transpose()?,
            Category::CostCenterDetails => frame(category)
                .map(|raw| transform_cost_center_details(raw, refs))
                .transpose()?,
            plan => frame(plan)
                .map(|raw| transform_plan(raw, plan, refs))
                .transpose()?,
        };
        match part {
            Some(lf) => {
                debug!("Gold pipeline prepared for {category}");
                parts.push(lf);
            }
            None => debug!("No staged rows for {category}"),
        }
    }

    let gold = assemble(parts)?;
    info!("Gold dataset assembled: {} rows", gold.height());
    Ok(gold)
}
