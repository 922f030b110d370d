/*!
# Emotion Report

Batch emotion classification for spreadsheet columns, with a browser front end.

## Overview

A user uploads a spreadsheet (`.xlsx`, `.xls` or `.csv`), picks one column,
and every value in that column is classified into a single emotion label by a
pretrained text-classification model. The labels are aggregated into counts,
percentages and colors and shown as a table plus a pie chart.

## Architecture

### Pipeline
- **loader**: Reads the first worksheet (or the CSV) into a header + rows table
- **cell**: Cell values and the normalization that turns them into model input
- **classifier**: Fixed-size batching, `NO_TEXT` for blanks, `ERROR` for failed items
- **model**: The model seam and its load policy (once, or per run)
- **report**: Counting, percentages and label colors

### Presentation
- **graph**: SVG pie/donut chart with a legend
- **downloader**: CSV and XLSX export of a report
- **app**: Axum routes, upload bookkeeping and HTML templates (feature `web`)
- **session**: Pending uploads keyed by an opaque cookie id (feature `web`)

### Configuration
- **config**: Profiles (classic, dashboard) and command line arguments
- **error**: Input errors versus model errors

## Web Endpoints

- `GET /` - Upload form
- `POST /upload` - Stores the spreadsheet and shows its columns
- `POST /predict` - Classifies the chosen column and renders the report
- `POST /api/classify` - Same in one shot, answering with JSON
- `GET /health` - Liveness probe
*/

pub mod cell;
pub mod classifier;
pub mod config;
pub mod downloader;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod report;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod session;

pub use cell::CellValue;
pub use classifier::{BatchClassifier, Label};
pub use error::{ClassifyError, InputError, ModelError};
pub use loader::{Table, load_table};
pub use model::{EmotionModel, LoadPolicy, ModelHandle};
pub use report::{ColorScheme, Report, ReportEntry};
