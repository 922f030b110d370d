use serde::{Deserialize, Serialize};
use std::fmt;

/// Cell texts that stand for a missing value, matched exactly.
///
/// These are the markers spreadsheet exports and data tools write for "no
/// value"; a cell holding one of them is read as empty.
pub const NA_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// A raw value read from one cell of the selected column.
///
/// Spreadsheets hand us whatever the author typed: text, numbers, booleans,
/// dates, formula errors or nothing at all. Nothing is interpreted here beyond
/// remembering which kind of value it was.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Date/time/duration cells, already rendered to text by the reader
    DateTime(String),
    /// A spreadsheet error cell such as `#N/A`
    Error(String),
    Empty,
}

impl CellValue {
    /// Textual form of the value, before trimming.
    ///
    /// Returns `None` for values that mean "missing": empty cells, NaN floats
    /// and spreadsheet error cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) | CellValue::DateTime(s) => Some(s.clone()),
            CellValue::Int(i) => Some(i.to_string()),
            CellValue::Float(f) if f.is_nan() => None,
            CellValue::Float(f) => Some(f.to_string()),
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Error(_) | CellValue::Empty => None,
        }
    }

    /// Normalized text for classification.
    ///
    /// The value is converted to text and trimmed. Missing values and
    /// whitespace-only text become the empty string, which means "nothing to
    /// classify". Never fails.
    pub fn normalized(&self) -> String {
        self.as_text()
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    /// Builds a cell from a CSV field or a text cell.
    ///
    /// Empty fields and the [`NA_MARKERS`] are missing values.
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() || NA_MARKERS.contains(&field) {
            CellValue::Empty
        } else {
            CellValue::Text(field.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Error(e) => write!(f, "{}", e),
            other => write!(f, "{}", other.as_text().unwrap_or_default()),
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

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

// Free-function form used by the classifier
pub fn normalize_text(value: &CellValue) -> String {
    value.normalized()
}
