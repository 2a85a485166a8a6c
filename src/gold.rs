//! Gold transformation: staged rows resolved against the reference frames
//! into one harmonized, partition-ready ledger.
//!
//! Each staging category has its own pipeline in [`transform`], built from the
//! shared steps in [`enrich`]. Every pipeline ends on the same column set
//! ([`columns::gold_fields`]) so the results stack without reconciliation.

pub mod columns;
pub mod enrich;
pub mod transform;

pub use columns::{CANONICAL_COLUMNS, DERIVED_COLUMNS, gold_schema};
pub use enrich::{CompassResolution, FiscalType};
pub use transform::{Scenario, assemble, build_gold};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::reference::ReferenceFrames;
    use polars::prelude::*;

    /// A small, consistent set of lookup frames.
    pub fn reference_frames() -> PolarsResult<ReferenceFrames> {
        Ok(ReferenceFrames {
            wbs_enhanced: df!(
                "WBS Element Code" => &["P-100.01", "P-200", "M-7"],
                "WBS Element Name" => &["Pump", "Plant B", "Motor"],
                "WBS Level" => &[2i64, 1, 2],
                "WBS G/L Account" => &[Some(410_000i64), None, None],
                "WBS Profit Center Code" => &[Some("PC9"), None, None],
                "WBS Parent Code" => &["P-100", "P-200", "M-1"],
                "WBS Parent Name" => &["Plant A", "Plant B", "Maintenance"],
                "WBS Type Char" => &["P", "P", "M"],
                "WBS Type" => &["Project", "Project", "Maintenance"],
                "WBS Type Local" => &["Projet", "Projet", "Entretien"],
                "WBS Bucket" => &["CAPEX", "CAPEX", "OPEX"]
            )?,
            gl_to_compass: df!(
                "G/L Account" => &[400_000i64, 410_000],
                "GL Compass Code" => &[None, Some("C410")]
            )?,
            cost_center_to_compass: df!(
                "Cost Center Code" => &["CC1"],
                "CC Compass Code" => &["C300"],
                "CC Profit Center Code" => &["PC1"]
            )?,
            compass_codes: df!(
                "Compass Code" => &["C300", "C410"],
                "Compass Text" => &["Overheads", "Project costs"]
            )?,
            profit_centers_to_signatures: df!(
                "Profit Center Code" => &["PC1", "PC9"],
                "Signature Code" => &["S1", "S9"],
                "Signature Description" => &["Energy", "Projects"]
            )?,
        })
    }
}
