#![cfg(not(tarpaulin_include))]

use crate::report::Report;
use std::error::Error;

/// Convert a report to CSV format
///
/// One row per label with its count, percentage (two decimals) and display
/// color, preceded by a header row. Quoting of labels containing commas or
/// quotes is left to the csv writer.
///
/// # Arguments
/// * `report` - Reference to the report to convert
///
/// # Returns
/// * `Result<String, Box<dyn Error>>` - CSV content as a string or an error
///
/// # Examples
/// ```
/// use emotion_report::classifier::Label;
/// use emotion_report::downloader::to_csv;
/// use emotion_report::report::{ColorScheme, Report};
///
/// let report = Report::from_labels(&[Label::Emotion("joy".into())], ColorScheme::Palette);
/// let csv = to_csv(&report).unwrap();
/// assert!(csv.starts_with("label,count,percentage,color\n"));
/// ```
pub fn to_csv(report: &Report) -> Result<String, Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["label", "count", "percentage", "color"])?;

    for entry in &report.entries {
        writer.write_record([
            entry.label.clone(),
            entry.count.to_string(),
            format!("{:.2}", entry.percentage),
            entry.color.clone(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    Ok(String::from_utf8(bytes)?)
}

/// Convert a report to XLSX format
///
/// Writes the same table as [`to_csv`] plus a total row, with the percentage
/// column formatted as a percentage.
///
/// # Returns
/// * `Result<Vec<u8>, Box<dyn Error>>` - XLSX file content as bytes or an error
pub fn to_xlsx(report: &Report) -> Result<Vec<u8>, Box<dyn Error>> {
    use rust_xlsxwriter::{Format, Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Report")?;

    let bold = Format::new().set_bold();
    let percent = Format::new().set_num_format("0.00%");

    for (col, title) in ["Label", "Count", "Percentage", "Color"].iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }

    for (i, entry) in report.entries.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_string(row, 0, entry.label.as_str())?;
        worksheet.write_number(row, 1, entry.count as f64)?;
        worksheet.write_number_with_format(row, 2, entry.percentage / 100.0, &percent)?;
        worksheet.write_string(row, 3, entry.color.as_str())?;
    }

    let total_row = (report.entries.len() + 1) as u32;
    worksheet.write_string_with_format(total_row, 0, "Total", &bold)?;
    worksheet.write_number_with_format(total_row, 1, report.total as f64, &bold)?;

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}
