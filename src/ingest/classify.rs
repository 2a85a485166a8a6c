//! Filename routing of raw extracts to staging tables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Staging table a raw extract is loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Actuals,
    CommitCc,
    CommitWbs,
    CostCenterDetails,
    WbsBudget,
    ForecastBudget,
    ForecastLiveEstimate,
    ForecastPreBudget,
    ForecastTrend,
}

impl Category {
    /// Every category, in the order batches are processed.
    pub const ALL: [Self; 9] = [
        Self::Actuals,
        Self::CommitCc,
        Self::CommitWbs,
        Self::CostCenterDetails,
        Self::WbsBudget,
        Self::ForecastBudget,
        Self::ForecastLiveEstimate,
        Self::ForecastPreBudget,
        Self::ForecastTrend,
    ];

    /// Name of the staging table.
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Actuals => "actuals",
            Self::CommitCc => "commit_cc",
            Self::CommitWbs => "commit_wbs",
            Self::CostCenterDetails => "cost_center_details",
            Self::WbsBudget => "wbs_budget",
            Self::ForecastBudget => "forecast_budget",
            Self::ForecastLiveEstimate => "forecast_live_estimate",
            Self::ForecastPreBudget => "forecast_pre_budget",
            Self::ForecastTrend => "forecast_trend",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Substring rules checked against the lower-cased file name, first match wins.
///
/// Order is significant: `ccdet` must beat `commit_cc`, and the specific
/// forecast markers must be tested before the generic `_bud_`.
pub const ROUTING_RULES: [(&str, Category); 8] = [
    ("ccdet", Category::CostCenterDetails),
    ("commit_cc", Category::CommitCc),
    ("commit_wbs", Category::CommitWbs),
    ("wbs_budget", Category::WbsBudget),
    ("_le_", Category::ForecastLiveEstimate),
    ("_prebud_", Category::ForecastPreBudget),
    ("_bud_", Category::ForecastBudget),
    ("_t0", Category::ForecastTrend),
];

/// Category for a raw file name. Anything unmatched is actuals.
pub fn classify(filename: &str) -> Category {
    let lowered = filename.to_lowercase();
    ROUTING_RULES
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map_or(Category::Actuals, |&(_, category)| category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_rule_routes() {
        let cases = [
            ("NEO_CCDET_2024_03.csv", Category::CostCenterDetails),
            ("neo_commit_cc_2024.csv", Category::CommitCc),
            ("NEO_COMMIT_WBS_2024.parquet", Category::CommitWbs),
            ("capex_wbs_budget_2025.csv", Category::WbsBudget),
            ("fc_LE_2024.csv", Category::ForecastLiveEstimate),
            ("fc_prebud_2025.csv", Category::ForecastPreBudget),
            ("fc_bud_2025.csv", Category::ForecastBudget),
            ("fc_t0_2025.csv", Category::ForecastTrend),
        ];
        for (name, expected) in cases {
            assert_eq!(classify(name), expected, "{name}");
        }
    }

    #[test]
    fn test_ccdet_beats_commit_cc() {
        assert_eq!(
            classify("commit_cc_ccdet_2024.csv"),
            Category::CostCenterDetails
        );
    }

    #[test]
    fn test_unmatched_falls_back_to_actuals() {
        assert_eq!(classify("NEO_ACT_2024_03.csv"), Category::Actuals);
        assert_eq!(classify(""), Category::Actuals);
    }

    #[test]
    fn test_table_names_are_distinct() {
        let mut names: Vec<&str> = Category::ALL.iter().map(|c| c.table_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Category::ALL.len());
    }
}
