//! Batch classification of one spreadsheet column.

use crate::cell::{CellValue, normalize_text};
use crate::error::{ClassifyError, InputError, ModelError};
use crate::loader::Table;
use crate::model::{EmotionModel, ModelHandle};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Chunk size used by the classic front end.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(32).unwrap();

/// Token budget every model input is truncated to.
pub const MAX_INPUT_TOKENS: usize = 512;

/// Label assigned to a value with nothing to classify.
pub const NO_TEXT: &str = "NO_TEXT";

/// Label assigned when the model failed on a value.
pub const ERROR: &str = "ERROR";

/// The label assigned to one input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Label {
    /// A label produced by the model
    Emotion(String),
    /// The input was empty after normalization
    NoText,
    /// The model failed on this input
    Error,
}

impl Label {
    pub fn as_str(&self) -> &str {
        match self {
            Label::Emotion(label) => label,
            Label::NoText => NO_TEXT,
            Label::Error => ERROR,
        }
    }

    /// True for labels the system produces itself rather than the model.
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Label::Emotion(_))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Runs a column of raw values through an emotion model.
///
/// Inputs are processed in chunks of `batch_size` only to bound how much is
/// held at once; chunking never changes the labels or their order.
#[derive(Clone, Debug)]
pub struct BatchClassifier {
    batch_size: NonZeroUsize,
    max_length: usize,
    max_rows: Option<usize>,
}

impl Default for BatchClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchClassifier {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self {
            batch_size,
            max_length: MAX_INPUT_TOKENS,
            max_rows: None,
        }
    }

    /// Rejects inputs longer than `limit` before the model is touched.
    pub fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.max_rows = limit;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.max_rows
    }

    /// Fails with `TooManyRows` when `rows` is over the configured cap.
    pub fn check_row_limit(&self, rows: usize) -> Result<(), InputError> {
        match self.max_rows {
            Some(limit) if rows > limit => Err(InputError::TooManyRows { rows, limit }),
            _ => Ok(()),
        }
    }

    /// One label per input, in input order.
    ///
    /// Never fails: empty inputs get `NO_TEXT` without calling the model, and a
    /// failing call gets `ERROR` while the rest of the batch carries on.
    pub fn classify(&self, model: &dyn EmotionModel, values: &[CellValue]) -> Vec<Label> {
        let mut labels = Vec::with_capacity(values.len());

        for (index, chunk) in values.chunks(self.batch_size.get()).enumerate() {
            debug!(
                "Classifying batch {} ({} values)",
                index + 1,
                chunk.len()
            );
            labels.extend(self.classify_chunk(model, chunk));
        }

        labels
    }

    fn classify_chunk(&self, model: &dyn EmotionModel, chunk: &[CellValue]) -> Vec<Label> {
        let texts: Vec<String> = chunk.iter().map(normalize_text).collect();

        texts
            .iter()
            .map(|text| {
                if text.is_empty() {
                    Label::NoText
                } else {
                    self.predict_one(model, text)
                }
            })
            .collect()
    }

    fn predict_one(&self, model: &dyn EmotionModel, text: &str) -> Label {
        let outcome = catch_unwind(AssertUnwindSafe(|| model.predict(text, self.max_length)))
            .unwrap_or_else(|_| Err(ModelError::Predict("model panicked".to_string())));

        match outcome {
            Ok(label) => Label::Emotion(label),
            Err(e) => {
                warn!("Error processing text: {}", e);
                Label::Error
            }
        }
    }

    /// Checks the row cap, loads the model and classifies `values`.
    ///
    /// Only a model that cannot be loaded makes this fail after the input
    /// passed validation.
    pub fn classify_with(
        &self,
        handle: &ModelHandle,
        values: &[CellValue],
    ) -> Result<Vec<Label>, ClassifyError> {
        self.check_row_limit(values.len())?;

        let model = handle.acquire()?;
        let labels = self.classify(model.as_ref(), values);

        info!(
            "Classified {} values in batches of {}",
            labels.len(),
            self.batch_size
        );
        Ok(labels)
    }

    /// Classifies the column `column` of `table`.
    pub fn classify_column(
        &self,
        handle: &ModelHandle,
        table: &Table,
        column: &str,
    ) -> Result<Vec<Label>, ClassifyError> {
        let values = table.column_values(column)?;
        self.classify_with(handle, &values)
    }
}
