use thiserror::Error;

/// Problems with what the user sent us.
///
/// These are reported straight back with a 4xx status and are never retried.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("Invalid file format: {0}")]
    UnsupportedFormat(String),

    #[error("No column selected")]
    NoColumnSelected,

    /// The request carried no (or an unknown) upload id
    #[error("No file found")]
    NoPendingUpload,

    /// The upload id is known but the file is gone from disk
    #[error("File not found")]
    FileMissing,

    #[error("Column '{0}' not found in the spreadsheet")]
    ColumnNotFound(String),

    #[error("The spreadsheet has {rows} rows, which exceeds the limit of {limit}")]
    TooManyRows { rows: usize, limit: usize },

    #[error("The spreadsheet is empty")]
    EmptySheet,

    #[error("Could not read the spreadsheet: {0}")]
    Unreadable(String),
}

/// Failures of the underlying emotion model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The model could not be made ready at all. Fatal for the run.
    #[error("failed to load emotion model: {0}")]
    Load(String),

    /// A single prediction failed. Recovered as an `ERROR` label.
    #[error("prediction failed: {0}")]
    Predict(String),
}

/// Everything that can stop a classification run before it produces labels.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
