use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single spreadsheet cell as it comes out of the workbook.
///
/// Serializes untagged so rows round-trip to the same JSON the dashboard
/// already consumes: numbers stay numbers, text stays text, blanks are `null`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Blank text, zero, `false` and empty cells are all "unset" when picking
    /// between a localized header and its fallback.
    pub fn is_set(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Text(s) => !s.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                Some(format!("{}", *n as i64))
            }
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// One data row keyed by the header row of its sheet.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct Row {
    cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Row::default()
    }

    pub fn insert(&mut self, header: impl Into<String>, value: CellValue) {
        self.cells.insert(header.into(), value);
    }

    pub fn get(&self, header: &str) -> Option<&CellValue> {
        self.cells.get(header)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(|v| *v == CellValue::Empty)
    }

    /// First set value among `headers`, in order. Sheets carry a localized
    /// column name with an English fallback, so callers pass both.
    pub fn pick(&self, headers: &[&str]) -> CellValue {
        headers
            .iter()
            .filter_map(|h| self.cells.get(*h))
            .find(|v| v.is_set())
            .cloned()
            .unwrap_or_default()
    }

    pub fn pick_f64(&self, headers: &[&str]) -> f64 {
        self.pick(headers).as_f64().unwrap_or(0.0)
    }

    pub fn pick_text(&self, headers: &[&str]) -> Option<String> {
        self.pick(headers).as_text()
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        Row {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
