use crate::cell::CellValue;
use crate::error::InputError;
use calamine::{Data, Reader, open_workbook_auto};
use log::debug;
use std::collections::HashMap;
use std::path::Path;

/// Spreadsheet formats we can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Xlsx,
    Xls,
    Csv,
}

impl SpreadsheetFormat {
    /// Detects the format from a file name's extension.
    ///
    /// # Examples
    /// ```
    /// use emotion_report::loader::SpreadsheetFormat;
    ///
    /// assert_eq!(SpreadsheetFormat::from_path("survey.XLSX").unwrap(), SpreadsheetFormat::Xlsx);
    /// assert!(SpreadsheetFormat::from_path("notes.txt").is_err());
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") => Ok(SpreadsheetFormat::Xlsx),
            Some("xls") => Ok(SpreadsheetFormat::Xls),
            Some("csv") => Ok(SpreadsheetFormat::Csv),
            Some(ext) => Err(InputError::UnsupportedFormat(format!(
                "unsupported file extension: .{}",
                ext
            ))),
            None => Err(InputError::UnsupportedFormat(
                "file has no extension".to_string(),
            )),
        }
    }
}

/// A header row plus data rows, all as raw cell values.
#[derive(Clone, Debug, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// Builds a table from a header row and data rows.
    ///
    /// Blank headers are named `Unnamed: <index>` and repeated headers get a
    /// `.1`, `.2`, ... suffix so every column can be selected by name. Rows
    /// shorter than the header are padded with empty cells.
    pub fn new(header: Vec<CellValue>, rows: Vec<Vec<CellValue>>) -> Self {
        let columns = column_names(&header);
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();

        Table { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The selected column's values, in row order.
    pub fn column_values(&self, column: &str) -> Result<Vec<CellValue>, InputError> {
        let index = self
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| InputError::ColumnNotFound(column.to_string()))?;

        Ok(self.rows.iter().map(|row| row[index].clone()).collect())
    }
}

fn column_names(header: &[CellValue]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();

    header
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let mut name = cell.normalized();
            if name.is_empty() {
                name = format!("Unnamed: {}", i);
            }
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            unique
        })
        .collect()
}

/// Loads the first worksheet of an Excel workbook.
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<Table, InputError> {
    let mut workbook = open_workbook_auto(filepath.as_ref())
        .map_err(|e| InputError::Unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(InputError::EmptySheet)?
        .map_err(|e| InputError::Unreadable(e.to_string()))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or(InputError::EmptySheet)?
        .iter()
        .map(header_cell)
        .collect();
    let rows = rows
        .map(|row| row.iter().map(from_excel_cell).collect::<Vec<_>>())
        .collect();
    let table = Table::new(header, rows);
    debug!(
        "Loaded workbook with {} columns and {} rows",
        table.columns.len(),
        table.row_count()
    );
    Ok(table)
}

fn from_excel_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::String(s) => CellValue::from_field(s),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(e) => CellValue::Error(e.to_string()),
        Data::Empty => CellValue::Empty,
        // Dates and durations
        other => CellValue::DateTime(other.to_string()),
    }
}

// Header names are taken literally, missing-value markers included
fn header_cell(cell: &Data) -> CellValue {
    match cell {
        Data::String(s) => CellValue::Text(s.clone()),
        other => from_excel_cell(other),
    }
}

/// Loads a CSV file whose first record is the header.
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Table, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(filepath.as_ref())
        .map_err(|e| InputError::Unreadable(e.to_string()))?;

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record.map_err(|e| InputError::Unreadable(e.to_string()))?,
        None => return Err(InputError::EmptySheet),
    };
    let header = header
        .iter()
        .map(|name| CellValue::Text(name.to_string()))
        .collect();

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| InputError::Unreadable(e.to_string()))?;
        rows.push(record.iter().map(CellValue::from_field).collect());
    }

    Ok(Table::new(header, rows))
}

/// Detects the file type and loads it with the matching reader.
pub fn load_table(filepath: impl AsRef<Path>) -> Result<Table, InputError> {
    let path = filepath.as_ref();
    match SpreadsheetFormat::from_path(path)? {
        SpreadsheetFormat::Csv => from_csv(path),
        SpreadsheetFormat::Xlsx | SpreadsheetFormat::Xls => from_excel(path),
    }
}
