//! Builds [`QuarterlyPayload`]s from whatever shape the producers hand over.
//!
//! Inputs are classified once into a [`PayloadSource`] and then reshaped into
//! the canonical payload. Agent output may carry the data as an embedded block:
//!
//! ```text
//! === QUARTERLY DATA (returned) ===
//! {"quarterly_financials": {...}, "quarters": [...], "sources": [...]}
//! === END ===
//! ```
//!
//! A block whose body is literally `OK` means "no data yet".

use crate::error::{AnalysisError, Result};
use crate::metrics::resolve_metric;
use crate::quarter::{looks_like_quarter, normalize_quarter};
use crate::schema::{QuarterRecord, QuarterlyPayload};
use crate::table::{coerce_integer, label_from_value, normalize_orientation, QuarterlyTable};
use crate::utils::clean_json_output;
use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const QUARTERLY_BLOCK_START: &str = "=== QUARTERLY DATA (returned) ===";
pub const QUARTERLY_BLOCK_END: &str = "=== END ===";
pub const NO_DATA_SENTINEL: &str = "OK";

const QUARTER_FIELDS: &[&str] = &["quarter", "period", "fiscal_quarter", "date"];

fn block_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)===\s*QUARTERLY DATA\s*\(returned\)\s*===")
            .expect("block start regex must compile")
    })
}

fn block_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)===\s*END\s*===").expect("block end regex must compile"))
}

/// Byte ranges of one embedded block: the whole block and its body.
struct BlockSpan {
    start: usize,
    body_start: usize,
    body_end: usize,
    end: usize,
}

fn find_block_span(text: &str) -> Option<BlockSpan> {
    let start = block_start_re().find(text)?;
    let rest = &text[start.end()..];
    let (body_end, end) = match block_end_re().find(rest) {
        Some(m) => (start.end() + m.start(), start.end() + m.end()),
        None => (text.len(), text.len()),
    };
    Some(BlockSpan {
        start: start.start(),
        body_start: start.end(),
        body_end,
        end,
    })
}

/// The contents of an embedded quarterly data block.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedBlock {
    /// The literal `OK` body.
    Sentinel,
    Data(Value),
    Malformed(String),
}

impl EmbeddedBlock {
    /// Locates and parses the first block in `text`.
    pub fn find(text: &str) -> Option<Self> {
        let span = find_block_span(text)?;
        let body = text[span.body_start..span.body_end].trim();
        let unfenced = body
            .trim_matches('`')
            .trim()
            .trim_start_matches("json")
            .trim();
        if unfenced.eq_ignore_ascii_case(NO_DATA_SENTINEL) {
            return Some(Self::Sentinel);
        }

        let candidate = clean_json_output(body);
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => Some(Self::Data(value)),
            Err(e) => Some(Self::Malformed(e.to_string())),
        }
    }

    /// URLs listed under the block's `sources` key.
    pub fn sources(&self) -> Vec<String> {
        match self {
            Self::Data(Value::Object(map)) => map
                .get("sources")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub fn into_payload(self) -> Result<QuarterlyPayload> {
        match self {
            Self::Sentinel => Err(AnalysisError::EmptyQuarterlyData),
            Self::Malformed(reason) => Err(AnalysisError::MalformedBlock(reason)),
            Self::Data(value) => build(PayloadSource::from_json(value)?),
        }
    }
}

/// Removes the first embedded block (markers included) from `text`.
pub fn strip_embedded_block(text: &str) -> String {
    match find_block_span(text) {
        Some(span) => format!("{}{}", &text[..span.start], &text[span.end..]),
        None => text.to_string(),
    }
}

/// Every input shape the payload builder accepts.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Flat per-quarter records, e.g. `[{"quarter": "Q2 2025", "revenue": 1}]`.
    Records(Vec<Value>),
    /// Metric-keyed financials, e.g. the `quarterly_financials` object.
    Financials(QuarterlyTable),
    /// An object keyed by quarter labels: `{"Q2 2025": {"Revenue": 1}}`.
    QuarterKeyed(QuarterlyTable),
    /// A raw table from a data vendor, orientation unknown.
    Table(QuarterlyTable),
    /// Several shapes from one document. Later parts take precedence.
    Combined(Vec<PayloadSource>),
    /// Free text that should contain an embedded block.
    EmbeddedText(String),
}

impl PayloadSource {
    /// Classifies a JSON value.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Self::Records(items)),
            Value::String(text) => Ok(Self::EmbeddedText(text)),
            Value::Object(map) => Self::from_object(map),
            other => Err(AnalysisError::UnsupportedShape(format!(
                "cannot build quarterly data from {}",
                other
            ))),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Result<Self> {
        map.remove("sources");

        let financials = map.remove("quarterly_financials");
        let records = map.remove("quarters");
        if financials.is_some() || records.is_some() {
            let mut parts = Vec::new();
            if let Some(value) = financials {
                parts.push(Self::from_financials(value)?);
            }
            match records {
                Some(Value::Array(items)) => parts.push(Self::Records(items)),
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(AnalysisError::UnsupportedShape(format!(
                        "'quarters' must be a list, found {}",
                        other
                    )))
                }
            }
            return Ok(match parts.len() {
                1 => parts.remove(0),
                _ => Self::Combined(parts),
            });
        }

        if QuarterlyTable::is_split_shape(&map) {
            return Ok(Self::Table(QuarterlyTable::from_split(&map)?));
        }
        let table = QuarterlyTable::from_nested_map(&map)?;
        if map.keys().any(|k| looks_like_quarter(k)) {
            Ok(Self::QuarterKeyed(table))
        } else {
            Ok(Self::Financials(table))
        }
    }

    fn from_financials(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) if QuarterlyTable::is_split_shape(&map) => {
                Ok(Self::Table(QuarterlyTable::from_split(&map)?))
            }
            Value::Object(map) => Ok(Self::Financials(QuarterlyTable::from_nested_map(&map)?)),
            Value::Array(items) => Ok(Self::Records(items)),
            Value::Null => Ok(Self::Financials(QuarterlyTable::default())),
            other => Err(AnalysisError::UnsupportedShape(format!(
                "'quarterly_financials' must be an object, found {}",
                other
            ))),
        }
    }
}

/// Builds the canonical payload from any accepted source.
pub fn build(source: PayloadSource) -> Result<QuarterlyPayload> {
    match source {
        PayloadSource::Records(items) => Ok(payload_from_records(&items)),
        PayloadSource::Financials(table)
        | PayloadSource::QuarterKeyed(table)
        | PayloadSource::Table(table) => Ok(payload_from_table(normalize_orientation(table))),
        PayloadSource::Combined(parts) => {
            let mut payload = QuarterlyPayload::default();
            for part in parts {
                payload.merge_from(&build(part)?);
            }
            Ok(payload)
        }
        PayloadSource::EmbeddedText(text) => EmbeddedBlock::find(&text)
            .ok_or(AnalysisError::NoEmbeddedBlock)?
            .into_payload(),
    }
}

fn record_quarter(record: &Map<String, Value>) -> Option<String> {
    record
        .iter()
        .find(|(key, _)| QUARTER_FIELDS.contains(&key.trim().to_lowercase().as_str()))
        .map(|(_, value)| normalize_quarter(&label_from_value(value)))
        .filter(|label| !label.trim().is_empty())
}

fn payload_from_records(items: &[Value]) -> QuarterlyPayload {
    let mut payload = QuarterlyPayload::default();
    for item in items {
        let Some(record) = item.as_object() else {
            debug!("Skipping non-object quarterly record: {}", item);
            continue;
        };
        let Some(quarter) = record_quarter(record) else {
            warn!("{}", AnalysisError::MissingQuarter(item.to_string()));
            continue;
        };

        let mut row = QuarterRecord::new(quarter);
        for (key, value) in record {
            if let Some(metric) = resolve_metric(key) {
                if let Some(number) = coerce_integer(value) {
                    row.set(metric, Some(number));
                }
            }
        }
        payload.upsert_record(row);
    }
    payload.sort_quarters();
    payload
}

fn payload_from_table(table: QuarterlyTable) -> QuarterlyPayload {
    let quarters: Vec<String> = table
        .column_labels
        .iter()
        .map(|label| normalize_quarter(label))
        .collect();

    let mut payload = QuarterlyPayload::default();
    for (row_idx, metric_name) in table.row_labels.iter().enumerate() {
        let series: BTreeMap<String, i64> = quarters
            .iter()
            .enumerate()
            .filter_map(|(col_idx, q)| table.get(row_idx, col_idx).map(|v| (q.clone(), v)))
            .collect();
        if !series.is_empty() {
            payload
                .quarterly_financials
                .entry(metric_name.trim().to_string())
                .or_default()
                .extend(series);
        }
    }

    for (col_idx, quarter) in quarters.iter().enumerate() {
        let mut record = QuarterRecord::new(quarter.clone());
        for (row_idx, metric_name) in table.row_labels.iter().enumerate() {
            if let (Some(metric), Some(value)) =
                (resolve_metric(metric_name), table.get(row_idx, col_idx))
            {
                record.set(metric, Some(value));
            }
        }
        if record.has_metrics() {
            payload.upsert_record(record);
        }
    }
    payload.sort_quarters();
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SPEC_BLOCK: &str = r#"Financial research summary.
=== QUARTERLY DATA (returned) ===
{"quarterly_financials": {"Total Revenue": {"Q2 2025": 82000000000}}, "quarters": [{"quarter":"Q2 2025","revenue":82000000000}], "sources": ["https://example.com/q2"]}
=== END ===
Trailing commentary."#;

    #[test]
    fn test_records_are_normalized_and_sorted() {
        let source = PayloadSource::from_json(json!([
            {"quarter": "2025Q2", "Revenue": "1,200", "Gross Profit": 5},
            {"quarter": "Q1 2025", "revenue": 1000.9, "net_income": "n/a"},
            {"revenue": 7},
            "not a record"
        ]))
        .unwrap();
        let payload = build(source).unwrap();

        assert!(payload.quarterly_financials.is_empty());
        assert_eq!(payload.quarters.len(), 2);
        assert_eq!(payload.quarters[0].quarter, "Q1 2025");
        assert_eq!(payload.quarters[0].revenue, Some(1000));
        assert_eq!(payload.quarters[0].net_income, None);
        assert_eq!(payload.quarters[1].quarter, "Q2 2025");
        assert_eq!(payload.quarters[1].revenue, Some(1200));
    }

    #[test]
    fn test_financials_object() {
        let source = PayloadSource::from_json(json!({
            "quarterly_financials": {
                "Total Revenue": {"2025-03-31": 100, "2025-06-30": 120},
                "Net Income": {"2025-03-31": 10, "2025-06-30": null},
                "Gross Profit": {"2025-03-31": 50}
            }
        }))
        .unwrap();
        assert!(matches!(source, PayloadSource::Financials(_)));
        let payload = build(source).unwrap();

        assert_eq!(payload.quarterly_financials["Total Revenue"]["Q2 2025"], 120);
        assert_eq!(payload.quarterly_financials["Gross Profit"]["Q1 2025"], 50);
        assert!(!payload.quarterly_financials["Net Income"].contains_key("Q2 2025"));

        assert_eq!(payload.quarters.len(), 2);
        assert_eq!(payload.quarters[0].net_income, Some(10));
        assert_eq!(payload.quarters[1].net_income, None);
        assert_eq!(payload.quarters[1].revenue, Some(120));
    }

    #[test]
    fn test_scalar_sibling_keeps_valid_metrics() {
        let source = PayloadSource::from_json(json!({
            "quarterly_financials": {
                "Total Revenue": {"Q2 2025": 82000000000_i64},
                "currency": "USD"
            }
        }))
        .unwrap();
        let payload = build(source).unwrap();

        assert_eq!(payload.quarterly_financials["Total Revenue"]["Q2 2025"], 82_000_000_000);
        assert!(!payload.quarterly_financials.contains_key("currency"));
        assert_eq!(payload.quarters.len(), 1);
        assert_eq!(payload.quarters[0].revenue, Some(82_000_000_000));
    }

    #[test]
    fn test_transposed_input_builds_identical_payload() {
        let by_metric = json!({
            "Total Revenue": {"Q1 2025": 100, "Q2 2025": 120},
            "EBITDA": {"Q1 2025": 30, "Q2 2025": 35}
        });
        let by_quarter = json!({
            "Q1 2025": {"Total Revenue": 100, "EBITDA": 30},
            "Q2 2025": {"Total Revenue": 120, "EBITDA": 35}
        });

        let a = PayloadSource::from_json(by_metric).unwrap();
        let b = PayloadSource::from_json(by_quarter).unwrap();
        assert!(matches!(a, PayloadSource::Financials(_)));
        assert!(matches!(b, PayloadSource::QuarterKeyed(_)));
        assert_eq!(build(a).unwrap(), build(b).unwrap());
    }

    #[test]
    fn test_raw_table_of_either_orientation() {
        let mut rows = QuarterlyTable::new(
            vec!["Net Sales".to_string()],
            vec!["Q4 2024".to_string(), "Q1 2025".to_string()],
        );
        rows.set(0, 0, Some(5));
        rows.set(0, 1, Some(6));
        let transposed = rows.transpose();

        let a = build(PayloadSource::Table(rows)).unwrap();
        let b = build(PayloadSource::Table(transposed)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.quarters[0].quarter, "Q4 2024");
        assert_eq!(a.quarters[1].revenue, Some(6));
    }

    #[test]
    fn test_ambiguous_table_yields_no_records() {
        let source = PayloadSource::from_json(json!({
            "latest": {"Total Revenue": 1}
        }))
        .unwrap();
        let payload = build(source).unwrap();
        assert!(payload.quarters.is_empty());
    }

    #[test]
    fn test_embedded_block_spec_example() {
        let payload = build(PayloadSource::EmbeddedText(SPEC_BLOCK.to_string())).unwrap();
        assert_eq!(payload.quarters.len(), 1);
        assert_eq!(payload.quarters[0].quarter, "Q2 2025");
        assert_eq!(payload.quarters[0].revenue, Some(82_000_000_000));
        assert_eq!(
            payload.quarterly_financials["Total Revenue"]["Q2 2025"],
            82_000_000_000
        );
    }

    #[test]
    fn test_embedded_block_sources() {
        let block = EmbeddedBlock::find(SPEC_BLOCK).unwrap();
        assert_eq!(block.sources(), vec!["https://example.com/q2"]);
    }

    #[test]
    fn test_sentinel_is_distinguishable() {
        let text = "=== QUARTERLY DATA (returned) ===\nOK\n=== END ===";
        assert_eq!(EmbeddedBlock::find(text), Some(EmbeddedBlock::Sentinel));
        let result = build(PayloadSource::EmbeddedText(text.to_string()));
        assert!(matches!(result, Err(AnalysisError::EmptyQuarterlyData)));
    }

    #[test]
    fn test_missing_and_malformed_blocks() {
        let result = build(PayloadSource::EmbeddedText("no data here".to_string()));
        assert!(matches!(result, Err(AnalysisError::NoEmbeddedBlock)));

        let text = "=== QUARTERLY DATA (returned) ===\n{\"quarters\": [\n=== END ===";
        let result = build(PayloadSource::EmbeddedText(text.to_string()));
        assert!(matches!(result, Err(AnalysisError::MalformedBlock(_))));
    }

    #[test]
    fn test_fenced_block_without_end_marker() {
        let text = "=== quarterly data (returned) ===\n```json\n[{\"quarter\": \"Q3 2024\", \"ebitda\": 9}]\n```";
        let payload = build(PayloadSource::EmbeddedText(text.to_string())).unwrap();
        assert_eq!(payload.quarters[0].ebitda, Some(9));
    }

    #[test]
    fn test_strip_embedded_block() {
        let stripped = strip_embedded_block(SPEC_BLOCK);
        assert!(stripped.contains("Financial research summary."));
        assert!(stripped.contains("Trailing commentary."));
        assert!(!stripped.contains("82000000000"));
        assert!(!stripped.contains("QUARTERLY DATA"));
    }

    #[test]
    fn test_unsupported_shapes() {
        assert!(PayloadSource::from_json(json!(42)).is_err());
        assert!(PayloadSource::from_json(json!({"quarters": "Q1"})).is_err());
    }
}
