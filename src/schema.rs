use crate::metrics::MetricKey;
use crate::quarter::quarter_sort_key;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One chart-ready row: a quarter and whichever canonical metrics are known.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QuarterRecord {
    #[schemars(description = "Fiscal quarter in the form 'Q<1-4> <YYYY>', e.g. 'Q2 2025'")]
    pub quarter: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Total revenue for the quarter as a plain integer (no separators)")]
    pub revenue: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Net income for the quarter as a plain integer (no separators)")]
    pub net_income: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "EBITDA for the quarter as a plain integer (no separators)")]
    pub ebitda: Option<i64>,
}

impl QuarterRecord {
    pub fn new(quarter: impl Into<String>) -> Self {
        Self {
            quarter: quarter.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, metric: MetricKey) -> Option<i64> {
        match metric {
            MetricKey::Revenue => self.revenue,
            MetricKey::NetIncome => self.net_income,
            MetricKey::Ebitda => self.ebitda,
        }
    }

    pub fn set(&mut self, metric: MetricKey, value: Option<i64>) {
        match metric {
            MetricKey::Revenue => self.revenue = value,
            MetricKey::NetIncome => self.net_income = value,
            MetricKey::Ebitda => self.ebitda = value,
        }
    }

    /// Copies every metric present in `other` over this record.
    pub fn merge_from(&mut self, other: &QuarterRecord) {
        for metric in MetricKey::ALL {
            if let Some(value) = other.get(metric) {
                self.set(metric, Some(value));
            }
        }
    }

    pub fn has_metrics(&self) -> bool {
        MetricKey::ALL.iter().any(|m| self.get(*m).is_some())
    }
}

/// Canonical quarterly data handed to chart consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct QuarterlyPayload {
    #[serde(default)]
    #[schemars(
        description = "Metric name (e.g. 'Total Revenue') mapped to quarter label ('Q2 2025') mapped to an integer value"
    )]
    pub quarterly_financials: BTreeMap<String, BTreeMap<String, i64>>,

    #[serde(default)]
    #[schemars(
        description = "One record per quarter, oldest first, using the keys quarter, revenue, net_income and ebitda"
    )]
    pub quarters: Vec<QuarterRecord>,
}

impl QuarterlyPayload {
    pub fn is_empty(&self) -> bool {
        self.quarters.is_empty() && self.quarterly_financials.values().all(BTreeMap::is_empty)
    }

    /// Inserts a record, folding it into an existing record with the same label.
    pub fn upsert_record(&mut self, record: QuarterRecord) {
        match self.quarters.iter_mut().find(|r| r.quarter == record.quarter) {
            Some(existing) => existing.merge_from(&record),
            None => self.quarters.push(record),
        }
    }

    /// Stable chronological sort; unparseable labels stay at the front.
    pub fn sort_quarters(&mut self) {
        self.quarters.sort_by_key(|r| quarter_sort_key(&r.quarter));
    }

    /// Overlays `other` on this payload.
    ///
    /// Values from `other` win for the same metric and quarter. Quarters and
    /// metrics present on only one side are kept as they are.
    pub fn merge_from(&mut self, other: &QuarterlyPayload) {
        for (metric, series) in &other.quarterly_financials {
            let target = self.quarterly_financials.entry(metric.clone()).or_default();
            for (quarter, value) in series {
                target.insert(quarter.clone(), *value);
            }
        }
        for record in &other.quarters {
            self.upsert_record(record.clone());
        }
        self.sort_quarters();
    }

    /// Chronological `(quarter, value)` pairs for one canonical metric.
    pub fn series(&self, metric: MetricKey) -> Vec<(String, i64)> {
        let mut points: Vec<(String, i64)> = self
            .quarters
            .iter()
            .filter_map(|r| r.get(metric).map(|v| (r.quarter.clone(), v)))
            .collect();
        points.sort_by_key(|(quarter, _)| quarter_sort_key(quarter));
        points
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(QuarterlyPayload)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}
