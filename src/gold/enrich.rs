//! Enrichment steps shared by the per-category gold pipelines.

use super::columns::{
    AMOUNT, CC_COMPASS_CODE, CC_PROFIT_CENTER_CODE, COMPASS_CODE, COST_CENTER_CODE, FISCAL_TYPE,
    GL_ACCOUNT, GL_COMPASS_CODE, PARTNER_COST_CENTER_CODE, PRODUCT_CODE, PROFIT_CENTER_CODE,
    SIGNATURE_CODE, SIGNATURE_DESCRIPTION, WBS_ELEMENT_CODE, WBS_GL_ACCOUNT,
    WBS_PROFIT_CENTER_CODE, WBS_TYPE_CHAR,
};
use crate::error::Result;
use crate::reference::{Cardinality, ReferenceFrames, validated_join};
use polars::prelude::*;
use std::fmt;

/// WBS type char whose codes are ignored by fiscal-type classification.
pub const NON_PROJECT_WBS_TYPE: &str = "M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiscalType {
    Wbs,
    CostCenter,
    NoWbs,
    Finance,
}

impl FiscalType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wbs => "WBS",
            Self::CostCenter => "COST CENTER",
            Self::NoWbs => "NO WBS",
            Self::Finance => "FINANCE",
        }
    }

    pub fn lit(self) -> Expr {
        lit(self.as_str())
    }
}

impl fmt::Display for FiscalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a row's compass code is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompassResolution {
    /// G/L account mapping only.
    GlOnly,
    /// G/L account first, then the cost center's hierarchy node.
    CostCenterFallback,
    /// As `CostCenterFallback`, and a missing profit center is also taken from
    /// the cost center.
    CostCenterFallbackWithProfitCenter,
}

/// Removes `names` from `lf` where present.
pub fn without(mut lf: LazyFrame, names: &[&str]) -> Result<LazyFrame> {
    let schema = lf.collect_schema()?;
    let keep: Vec<Expr> = schema
        .iter_names()
        .filter(|name| !names.contains(&name.as_str()))
        .map(|name| col(name.as_str()))
        .collect();
    Ok(lf.select(keep))
}

/// Replaces the WBS-derived columns with the enhanced WBS lookup. The lookup's
/// G/L account and profit center win wherever they are non-null.
pub fn apply_wbs_override(lf: LazyFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    let wbs = &refs.wbs_enhanced;
    let stale: Vec<&str> = wbs
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| *name != WBS_ELEMENT_CODE)
        .collect();
    let lf = without(lf, &stale)?;

    let joined = validated_join(
        lf,
        wbs,
        WBS_ELEMENT_CODE,
        JoinType::Left,
        Cardinality::ManyToOne,
        "wbs_enhanced",
    )?
    .with_columns([
        coalesce(&[col(WBS_GL_ACCOUNT), col(GL_ACCOUNT)]).alias(GL_ACCOUNT),
        coalesce(&[col(WBS_PROFIT_CENTER_CODE), col(PROFIT_CENTER_CODE)])
            .alias(PROFIT_CENTER_CODE),
    ]);
    without(joined, &[WBS_GL_ACCOUNT, WBS_PROFIT_CENTER_CODE])
}

/// Sets `Compass Code` (and, when asked, back-fills `Profit Center Code`).
/// An unmatched lookup leaves a null.
pub fn resolve_compass(
    lf: LazyFrame,
    refs: &ReferenceFrames,
    resolution: CompassResolution,
) -> Result<LazyFrame> {
    let lf = validated_join(
        without(lf, &[COMPASS_CODE])?,
        &refs.gl_to_compass,
        GL_ACCOUNT,
        JoinType::Left,
        Cardinality::ManyToOne,
        "gl_to_compass",
    )?;

    let lf = match resolution {
        CompassResolution::GlOnly => lf.with_column(col(GL_COMPASS_CODE).alias(COMPASS_CODE)),
        CompassResolution::CostCenterFallback
        | CompassResolution::CostCenterFallbackWithProfitCenter => {
            let lf = validated_join(
                lf,
                &refs.cost_center_to_compass,
                COST_CENTER_CODE,
                JoinType::Left,
                Cardinality::ManyToOne,
                "cost_center_to_compass",
            )?
            .with_column(
                coalesce(&[col(GL_COMPASS_CODE), col(CC_COMPASS_CODE)]).alias(COMPASS_CODE),
            );
            if resolution == CompassResolution::CostCenterFallbackWithProfitCenter {
                lf.with_column(
                    coalesce(&[col(PROFIT_CENTER_CODE), col(CC_PROFIT_CENTER_CODE)])
                        .alias(PROFIT_CENTER_CODE),
                )
            } else {
                lf
            }
        }
    };

    without(lf, &[GL_COMPASS_CODE, CC_COMPASS_CODE, CC_PROFIT_CENTER_CODE])
}

pub fn attach_compass_text(lf: LazyFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    let names: Vec<&str> = refs
        .compass_codes
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .filter(|name| *name != COMPASS_CODE)
        .collect();
    validated_join(
        without(lf, &names)?,
        &refs.compass_codes,
        COMPASS_CODE,
        JoinType::Left,
        Cardinality::ManyToOne,
        "compass_codes",
    )
}

pub fn attach_signature(lf: LazyFrame, refs: &ReferenceFrames) -> Result<LazyFrame> {
    validated_join(
        without(lf, &[SIGNATURE_CODE, SIGNATURE_DESCRIPTION])?,
        &refs.profit_centers_to_signatures,
        PROFIT_CENTER_CODE,
        JoinType::Left,
        Cardinality::ManyToOne,
        "profit_centers_to_signatures",
    )
}

/// Actuals are stored with the inverse of their economic sign.
pub fn invert_sign(lf: LazyFrame) -> LazyFrame {
    lf.with_column((col(AMOUNT) * lit(-1.0)).alias(AMOUNT))
}

/// Fiscal type from the presence of codes, first matching branch wins.
/// `wbs` is the WBS code as classification should see it.
pub fn fiscal_type(wbs: Expr) -> Expr {
    when(wbs.clone().is_not_null())
        .then(FiscalType::Wbs.lit())
        .when(
            col(COST_CENTER_CODE)
                .is_not_null()
                .or(col(PARTNER_COST_CENTER_CODE).is_not_null()),
        )
        .then(FiscalType::CostCenter.lit())
        .when(wbs.is_null().and(col(PRODUCT_CODE).is_not_null()))
        .then(FiscalType::NoWbs.lit())
        .otherwise(FiscalType::Finance.lit())
}

pub fn classify_fiscal_type(lf: LazyFrame) -> LazyFrame {
    lf.with_column(fiscal_type(col(WBS_ELEMENT_CODE)).alias(FISCAL_TYPE))
}

/// Classification that treats WBS codes of type `M` as absent. The WBS code
/// column itself is left as it was.
pub fn classify_fiscal_type_excluding_non_project(lf: LazyFrame) -> LazyFrame {
    let effective_wbs = when(col(WBS_TYPE_CHAR).eq(lit(NON_PROJECT_WBS_TYPE)))
        .then(lit(NULL).cast(DataType::String))
        .otherwise(col(WBS_ELEMENT_CODE));
    lf.with_column(fiscal_type(effective_wbs).alias(FISCAL_TYPE))
}

pub fn fixed_fiscal_type(lf: LazyFrame, fiscal_type: FiscalType) -> LazyFrame {
    lf.with_column(fiscal_type.lit().alias(FISCAL_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gold::test_support::reference_frames as refs;

    fn string_at(df: &DataFrame, key: &str, value: &str, column: &str) -> Option<String> {
        let idx = df
            .column(key)
            .ok()?
            .str()
            .ok()?
            .into_iter()
            .position(|k| k == Some(value))?;
        df.column(column).ok()?.str().ok()?.get(idx).map(ToOwned::to_owned)
    }

    #[test]
    fn test_wbs_override_prefers_non_null_wbs_values() -> Result<()> {
        let raw = df!(
            WBS_ELEMENT_CODE => &[Some("P-100.01"), Some("P-200"), None],
            GL_ACCOUNT => &[400_000i64, 400_100, 400_200],
            PROFIT_CENTER_CODE => &["PC1", "PC2", "PC3"],
            "WBS Element Name" => &["stale", "stale", "stale"]
        )?;

        let df = apply_wbs_override(raw.lazy(), &refs()?)?
            .sort_by_exprs([col(GL_ACCOUNT)], SortMultipleOptions::default())
            .collect()?;
        let accounts: Vec<Option<i64>> = df.column(GL_ACCOUNT)?.i64()?.into_iter().collect();
        assert_eq!(accounts, vec![Some(400_100), Some(400_200), Some(410_000)]);

        assert_eq!(string_at(&df, WBS_ELEMENT_CODE, "P-100.01", PROFIT_CENTER_CODE).as_deref(), Some("PC9"));
        assert_eq!(string_at(&df, WBS_ELEMENT_CODE, "P-200", PROFIT_CENTER_CODE).as_deref(), Some("PC2"));
        assert_eq!(string_at(&df, WBS_ELEMENT_CODE, "P-100.01", "WBS Element Name").as_deref(), Some("Pump"));
        assert!(df.column(WBS_GL_ACCOUNT).is_err());
        Ok(())
    }

    #[test]
    fn test_compass_falls_back_to_cost_center() -> Result<()> {
        let raw = df!(
            GL_ACCOUNT => &[400_000i64, 410_000, 999_999],
            COST_CENTER_CODE => &[Some("CC1"), Some("CC1"), None],
            PROFIT_CENTER_CODE => &[None, Some("PC7"), None],
            "Row" => &["a", "b", "c"]
        )?;
        let refs = refs()?;

        let fallback = resolve_compass(
            raw.clone().lazy(),
            &refs,
            CompassResolution::CostCenterFallbackWithProfitCenter,
        )?
        .collect()?;
        assert_eq!(string_at(&fallback, "Row", "a", COMPASS_CODE).as_deref(), Some("C300"));
        assert_eq!(string_at(&fallback, "Row", "b", COMPASS_CODE).as_deref(), Some("C410"));
        assert_eq!(string_at(&fallback, "Row", "c", COMPASS_CODE), None);
        assert_eq!(string_at(&fallback, "Row", "a", PROFIT_CENTER_CODE).as_deref(), Some("PC1"));
        assert_eq!(string_at(&fallback, "Row", "b", PROFIT_CENTER_CODE).as_deref(), Some("PC7"));
        assert!(fallback.column(CC_COMPASS_CODE).is_err());

        let gl_only = resolve_compass(raw.lazy(), &refs, CompassResolution::GlOnly)?.collect()?;
        assert_eq!(string_at(&gl_only, "Row", "a", COMPASS_CODE), None);
        assert_eq!(string_at(&gl_only, "Row", "b", COMPASS_CODE).as_deref(), Some("C410"));
        Ok(())
    }

    #[test]
    fn test_duplicate_lookup_key_aborts() -> Result<()> {
        let mut refs = refs()?;
        refs.profit_centers_to_signatures = df!(
            PROFIT_CENTER_CODE => &["PC1", "PC1"],
            SIGNATURE_CODE => &["S1", "S2"],
            SIGNATURE_DESCRIPTION => &["Energy", "Water"]
        )?;
        let raw = df!(PROFIT_CENTER_CODE => &["PC1"])?;

        let err = attach_signature(raw.lazy(), &refs).err();
        assert!(err.is_some_and(|e| e.is_fatal()));
        Ok(())
    }

    #[test]
    fn test_fiscal_type_branches() -> Result<()> {
        let df = df!(
            WBS_ELEMENT_CODE => &[Some("P-1"), None, None, None, None],
            COST_CENTER_CODE => &[Some("CC1"), Some("CC1"), None, None, None],
            PARTNER_COST_CENTER_CODE => &[None, None, Some("CC2"), None, None],
            PRODUCT_CODE => &[Some("X"), None, None, Some("X"), None]
        )?;

        let classified = classify_fiscal_type(df.lazy()).collect()?;
        let types: Vec<Option<&str>> = classified.column(FISCAL_TYPE)?.str()?.into_iter().collect();
        assert_eq!(
            types,
            vec![
                Some("WBS"),
                Some("COST CENTER"),
                Some("COST CENTER"),
                Some("NO WBS"),
                Some("FINANCE"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_m_type_wbs_is_ignored_but_kept() -> Result<()> {
        let df = df!(
            WBS_ELEMENT_CODE => &["M-200.01", "P-100.01"],
            WBS_TYPE_CHAR => &["M", "P"],
            COST_CENTER_CODE => &[None, Some("CC1")],
            PARTNER_COST_CENTER_CODE => &[None::<&str>, None],
            PRODUCT_CODE => &[Some("X"), None]
        )?;

        let classified = classify_fiscal_type_excluding_non_project(df.lazy()).collect()?;
        let types: Vec<Option<&str>> = classified.column(FISCAL_TYPE)?.str()?.into_iter().collect();
        assert_eq!(types, vec![Some("NO WBS"), Some("WBS")]);
        assert_eq!(
            classified.column(WBS_ELEMENT_CODE)?.str()?.get(0),
            Some("M-200.01")
        );
        Ok(())
    }

    #[test]
    fn test_invert_sign() -> Result<()> {
        let df = invert_sign(df!(AMOUNT => &[Some(100.0f64), None])?.lazy()).collect()?;
        let amounts: Vec<Option<f64>> = df.column(AMOUNT)?.f64()?.into_iter().collect();
        assert_eq!(amounts, vec![Some(-100.0), None]);
        Ok(())
    }
}
