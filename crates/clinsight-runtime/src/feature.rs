//! Feature values, records and tabular frames.
//!
//! Prediction payloads arrive as flat JSON objects. A [`FeatureRecord`] keeps
//! the field order of the incoming payload; a [`Frame`] is a column-ordered
//! batch built from a list of records (union of keys, first-seen order).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single feature value as found in a request payload.
///
/// Free-form nested data (arrays, objects) is preserved as [`FeatureValue::Json`]
/// so it can be carried through logging and enrichment without the numeric
/// paths having to understand it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(serde_json::Value),
}

impl FeatureValue {
    /// Strictly numeric view: integers and floats only.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Int(i) => Some(*i as f64),
            FeatureValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Scalar view used by the single-record heuristic: booleans count as 0/1.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            FeatureValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Str(v.to_string())
    }
}

/// A flat mapping from feature name to value, in payload order.
pub type FeatureRecord = IndexMap<String, FeatureValue>;

/// Column-ordered tabular batch of feature records.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<FeatureRecord>,
}

impl Frame {
    /// Build a frame from records. Columns are the union of all record keys
    /// in first-seen order; rows keep their original maps, so a missing cell
    /// is simply an absent key.
    pub fn from_records(rows: Vec<FeatureRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// One-row frame, the shape batch-only models expect for single requests.
    pub fn from_record(record: FeatureRecord) -> Self {
        Self::from_records(vec![record])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&FeatureValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Columns whose present values are all numeric (or null). Booleans and
    /// strings disqualify a column, matching dataframe dtype selection.
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|col| {
                self.rows.iter().all(|row| match row.get(col.as_str()) {
                    None => true,
                    Some(v) => v.is_null() || v.as_f64().is_some(),
                })
            })
            .cloned()
            .collect()
    }

    /// Per-row mean over the given columns, skipping missing and null cells.
    /// A row with no numeric cells contributes 0.0.
    pub fn row_mean(&self, row: usize, columns: &[String]) -> f64 {
        let Some(record) = self.rows.get(row) else {
            return 0.0;
        };
        let vals: Vec<f64> = columns
            .iter()
            .filter_map(|c| record.get(c).and_then(FeatureValue::as_f64))
            .collect();
        if vals.is_empty() {
            0.0
        } else {
            vals.iter().sum::<f64>() / vals.len() as f64
        }
    }

    /// Numeric cell with missing and null cells defaulting to 0.0.
    /// Returns `None` when the cell holds a non-numeric value.
    pub fn numeric_or_zero(&self, row: usize, column: &str) -> Option<f64> {
        match self.get(row, column) {
            None | Some(FeatureValue::Null) => Some(0.0),
            Some(FeatureValue::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            Some(v) => v.as_f64(),
        }
    }
}

/// Convenience constructor used by tests and baseline training.
pub fn record(pairs: &[(&str, FeatureValue)]) -> FeatureRecord {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
