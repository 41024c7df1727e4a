//! Chart-ready views over a [`QuarterlyPayload`].

use crate::metrics::MetricKey;
use crate::schema::{QuarterRecord, QuarterlyPayload};
use crate::quarter::quarter_sort_key;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SUMMARY_QUARTERS: usize = 4;

/// The `n` most recent records, oldest first.
pub fn latest_quarters(payload: &QuarterlyPayload, n: usize) -> Vec<&QuarterRecord> {
    let mut records: Vec<&QuarterRecord> = payload.quarters.iter().collect();
    records.sort_by_key(|r| quarter_sort_key(&r.quarter));
    let skip = records.len().saturating_sub(n);
    records.into_iter().skip(skip).collect()
}

/// `82_000_000_000` becomes `$82.00B`; absent values become `N/A`.
pub fn format_billions(value: Option<i64>) -> String {
    match value {
        Some(v) => format!("${:.2}B", v as f64 / 1e9),
        None => "N/A".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub metric: MetricKey,
    pub values: Vec<Option<i64>>,
}

/// Last few quarters for each canonical metric that has any data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlySummary {
    pub company: String,
    pub quarters: Vec<String>,
    pub rows: Vec<SummaryRow>,
}

impl QuarterlySummary {
    pub fn from_payload(company: &str, payload: &QuarterlyPayload, n: usize) -> Option<Self> {
        let records = latest_quarters(payload, n);
        if records.is_empty() {
            return None;
        }
        let rows: Vec<SummaryRow> = MetricKey::ALL
            .into_iter()
            .map(|metric| SummaryRow {
                metric,
                values: records.iter().map(|r| r.get(metric)).collect(),
            })
            .filter(|row| row.values.iter().any(Option::is_some))
            .collect();
        if rows.is_empty() {
            return None;
        }
        Some(Self {
            company: company.to_string(),
            quarters: records.iter().map(|r| r.quarter.clone()).collect(),
            rows,
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("# Quarterly Summary - {}\n\n", self.company));

        output.push_str("| Metric |");
        for quarter in &self.quarters {
            output.push_str(&format!(" {} |", quarter));
        }
        output.push('\n');
        output.push_str("|---|");
        for _ in &self.quarters {
            output.push_str("---|");
        }
        output.push('\n');

        for row in &self.rows {
            output.push_str(&format!("| {} |", row.metric.display_name()));
            for value in &row.values {
                output.push_str(&format!(" {} |", format_billions(*value)));
            }
            output.push('\n');
        }
        output
    }

    /// Raw integers; absent cells are left empty.
    pub fn to_csv(&self) -> String {
        let mut output = String::from("Metric");
        for quarter in &self.quarters {
            output.push_str(&format!(",{}", quarter));
        }
        output.push('\n');

        for row in &self.rows {
            output.push_str(row.metric.display_name());
            for value in &row.values {
                match value {
                    Some(v) => output.push_str(&format!(",{}", v)),
                    None => output.push(','),
                }
            }
            output.push('\n');
        }
        output
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearOverYearRow {
    pub metric: MetricKey,
    pub current: i64,
    pub previous: i64,
}

impl YearOverYearRow {
    pub fn change_pct(&self) -> Option<f64> {
        if self.previous == 0 {
            return None;
        }
        Some((self.current - self.previous) as f64 / self.previous.abs() as f64 * 100.0)
    }
}

/// Latest quarter against the quarter four positions earlier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearOverYear {
    pub latest: String,
    pub year_ago: String,
    pub rows: Vec<YearOverYearRow>,
}

/// Needs at least five quarters. Only metrics known in both quarters are
/// compared; `None` when nothing is comparable.
pub fn year_over_year(payload: &QuarterlyPayload) -> Option<YearOverYear> {
    let records = latest_quarters(payload, usize::MAX);
    if records.len() < 5 {
        return None;
    }
    let latest = records[records.len() - 1];
    let year_ago = records[records.len() - 5];

    let rows: Vec<YearOverYearRow> = MetricKey::ALL
        .into_iter()
        .filter_map(|metric| match (latest.get(metric), year_ago.get(metric)) {
            (Some(current), Some(previous)) => Some(YearOverYearRow {
                metric,
                current,
                previous,
            }),
            _ => None,
        })
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(YearOverYear {
        latest: latest.quarter.clone(),
        year_ago: year_ago.quarter.clone(),
        rows,
    })
}
