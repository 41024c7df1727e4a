//! Two-axis financial tables of unknown orientation.
//!
//! Vendors and agents hand over tables either as metrics × quarters or as
//! quarters × metrics. [`normalize_orientation`] settles on metrics as rows and
//! quarters as columns using a two-step label heuristic. When neither axis looks
//! like quarters the table passes through unchanged.

use crate::error::{AnalysisError, Result};
use crate::quarter::looks_like_quarter;
use log::debug;
use serde_json::{Map, Value};

/// Row/column labelled grid of integer cells. Absent cells are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuarterlyTable {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    cells: Vec<Vec<Option<i64>>>,
}

impl QuarterlyTable {
    pub fn new(row_labels: Vec<String>, column_labels: Vec<String>) -> Self {
        let cells = vec![vec![None; column_labels.len()]; row_labels.len()];
        Self {
            row_labels,
            column_labels,
            cells,
        }
    }

    /// Builds a table from `{outer: {inner: value}}`. Outer keys become rows,
    /// inner keys become columns in order of first appearance. Scalar siblings
    /// such as `"currency": "USD"` are skipped; a map with no object entries at
    /// all is rejected.
    pub fn from_nested_map(map: &Map<String, Value>) -> Result<Self> {
        let mut rows: Vec<(&String, &Map<String, Value>)> = Vec::new();
        let mut skipped = Vec::new();
        for (outer, inner) in map {
            match inner.as_object() {
                Some(inner) => rows.push((outer, inner)),
                None => {
                    debug!("Skipping '{}': expected an object, found {}", outer, value_kind(inner));
                    skipped.push((outer, inner));
                }
            }
        }
        if rows.is_empty() {
            if let Some((outer, inner)) = skipped.first() {
                return Err(AnalysisError::UnsupportedShape(format!(
                    "expected an object of values under '{}', found {}",
                    outer,
                    value_kind(inner)
                )));
            }
        }

        let mut columns: Vec<String> = Vec::new();
        for (_, inner) in &rows {
            for key in inner.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let labels = rows.iter().map(|(outer, _)| (*outer).clone()).collect();
        let mut table = Self::new(labels, columns);
        for (row_idx, (_, inner)) in rows.iter().enumerate() {
            for (key, value) in inner.iter() {
                if let Some(col_idx) = table.column_labels.iter().position(|c| c == key) {
                    table.cells[row_idx][col_idx] = coerce_integer(value);
                }
            }
        }
        Ok(table)
    }

    /// Builds a table from a dataframe "split" export:
    /// `{"index": [...], "columns": [...], "data": [[...], ...]}`.
    pub fn from_split(map: &Map<String, Value>) -> Result<Self> {
        let labels = |key: &str| -> Result<Vec<String>> {
            map.get(key)
                .and_then(Value::as_array)
                .map(|items| items.iter().map(label_from_value).collect())
                .ok_or_else(|| {
                    AnalysisError::UnsupportedShape(format!("split table is missing '{}'", key))
                })
        };
        let rows = labels("index")?;
        let columns = labels("columns")?;
        let data = map.get("data").and_then(Value::as_array).ok_or_else(|| {
            AnalysisError::UnsupportedShape("split table is missing 'data'".to_string())
        })?;

        let mut table = Self::new(rows, columns);
        for (row_idx, row) in data.iter().enumerate().take(table.row_labels.len()) {
            if let Some(values) = row.as_array() {
                for (col_idx, value) in values.iter().enumerate().take(table.column_labels.len()) {
                    table.cells[row_idx][col_idx] = coerce_integer(value);
                }
            }
        }
        Ok(table)
    }

    pub fn is_split_shape(map: &Map<String, Value>) -> bool {
        map.contains_key("index") && map.contains_key("columns") && map.contains_key("data")
    }

    pub fn get(&self, row: usize, column: usize) -> Option<i64> {
        self.cells.get(row).and_then(|r| r.get(column)).copied().flatten()
    }

    pub fn set(&mut self, row: usize, column: usize, value: Option<i64>) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = value;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_labels.is_empty() || self.column_labels.is_empty()
    }

    pub fn transpose(&self) -> Self {
        let mut out = Self::new(self.column_labels.clone(), self.row_labels.clone());
        for (r, row) in self.cells.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                out.cells[c][r] = *value;
            }
        }
        out
    }
}

/// Coerces a JSON leaf into an integer, truncating fractions.
///
/// Strings may carry thousands separators, spaces or a leading currency
/// symbol. Booleans, nulls, non-finite numbers and anything unparseable are
/// treated as absent.
pub fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().and_then(truncate_float)
            }
        }
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches(['$', '€', '£'])
                .chars()
                .filter(|c| !matches!(c, ',' | '_' | ' '))
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            if let Ok(i) = cleaned.parse::<i64>() {
                return Some(i);
            }
            cleaned.parse::<f64>().ok().and_then(truncate_float)
        }
        _ => None,
    }
}

fn truncate_float(f: f64) -> Option<i64> {
    if !f.is_finite() || f.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(f.trunc() as i64)
}

pub(crate) fn label_from_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn majority_quarter_like(labels: &[String]) -> bool {
    if labels.is_empty() {
        return false;
    }
    let hits = labels.iter().filter(|l| looks_like_quarter(l)).count();
    hits * 2 > labels.len()
}

pub fn columns_look_like_quarters(table: &QuarterlyTable) -> bool {
    majority_quarter_like(&table.column_labels)
}

pub fn rows_look_like_quarters(table: &QuarterlyTable) -> bool {
    majority_quarter_like(&table.row_labels)
}

/// First pass: decide from the column labels, then the row labels.
pub fn orientation_needs_transpose(table: &QuarterlyTable) -> bool {
    if columns_look_like_quarters(table) {
        return false;
    }
    rows_look_like_quarters(table)
}

/// Second pass: quarters still sitting in the index while the columns are not
/// quarter-like.
pub fn quarters_left_in_index(table: &QuarterlyTable) -> bool {
    rows_look_like_quarters(table) && !columns_look_like_quarters(table)
}

/// Returns the table with metrics as rows and quarters as columns.
pub fn normalize_orientation(table: QuarterlyTable) -> QuarterlyTable {
    let mut table = table;
    if orientation_needs_transpose(&table) {
        debug!("Quarter labels found in rows; transposing table");
        table = table.transpose();
    }
    if quarters_left_in_index(&table) {
        debug!("Quarter labels still in rows after first pass; transposing again");
        table = table.transpose();
    }
    table
}
