use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The canonical metrics carried in chart-ready quarterly records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    #[schemars(description = "Top-line revenue (total revenue, net sales, turnover)")]
    Revenue,

    #[schemars(description = "Bottom-line net income (net profit)")]
    NetIncome,

    #[schemars(description = "Earnings before interest, taxes, depreciation and amortization")]
    Ebitda,
}

impl MetricKey {
    pub const ALL: [MetricKey; 3] = [MetricKey::Revenue, MetricKey::NetIncome, MetricKey::Ebitda];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Revenue => "revenue",
            MetricKey::NetIncome => "net_income",
            MetricKey::Ebitda => "ebitda",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKey::Revenue => "Revenue",
            MetricKey::NetIncome => "Net Income",
            MetricKey::Ebitda => "EBITDA",
        }
    }

    /// Lower-case names recognized for this metric. Extend here to accept new
    /// vendor labels.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            MetricKey::Revenue => &[
                "revenue",
                "total revenue",
                "total revenues",
                "net sales",
                "sales",
                "turnover",
                "operating revenue",
            ],
            MetricKey::NetIncome => &[
                "net_income",
                "net income",
                "net profit",
                "profit",
                "net income common stockholders",
            ],
            MetricKey::Ebitda => &["ebitda", "adjusted ebitda", "normalized ebitda"],
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a human or vendor metric name onto a canonical key.
///
/// Matching is case-insensitive and exact after trimming. Unknown names yield
/// `None` and are expected to be dropped by the caller.
pub fn resolve_metric(name: &str) -> Option<MetricKey> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    MetricKey::ALL
        .into_iter()
        .find(|key| key.as_str() == needle || key.aliases().contains(&needle.as_str()))
}
