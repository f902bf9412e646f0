//! Error types for FoamTune.

use thiserror::Error;

/// Result type alias for FoamTune operations.
pub type Result<T> = std::result::Result<T, FoamTuneError>;

/// Main error type for FoamTune operations.
#[derive(Error, Debug)]
pub enum FoamTuneError {
    /// A template referenced a field the record does not carry.
    #[error("{}", missing_field_message(.field, .record))]
    MissingField {
        /// Name of the absent field.
        field: String,
        /// Position of the record in its batch, when known.
        record: Option<usize>,
    },

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The projection step expected a column that upstream did not produce.
    #[error("Schema drift: expected column '{column}' is not present")]
    SchemaDrift {
        /// Name of the missing column.
        column: String,
    },

    /// A failure while processing one record of a batch.
    #[error("Record {index}: {source}")]
    Record {
        /// Position of the record in its batch.
        index: usize,
        /// Underlying failure.
        #[source]
        source: Box<FoamTuneError>,
    },

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Parquet/Arrow reader errors.
    #[error("Parquet error: {0}")]
    Parquet(String),

    /// HuggingFace Hub errors.
    #[error("Hub error: {0}")]
    Hub(String),

    /// Errors raised by a training strategy.
    #[error("Training error: {0}")]
    Training(String),
}

fn missing_field_message(field: &str, record: &Option<usize>) -> String {
    match record {
        Some(index) => format!("Missing field '{field}' in record {index}"),
        None => format!("Missing field '{field}'"),
    }
}

impl FoamTuneError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a missing-field error without record context.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            record: None,
        }
    }

    /// Attach the position of the failing record.
    ///
    /// Missing-field errors take the index directly; everything else is
    /// wrapped in [`FoamTuneError::Record`]. Already-indexed errors are
    /// returned unchanged.
    #[must_use]
    pub fn at_record(self, index: usize) -> Self {
        match self {
            Self::MissingField {
                field,
                record: None,
            } => Self::MissingField {
                field,
                record: Some(index),
            },
            err @ (Self::MissingField { .. } | Self::Record { .. }) => err,
            other => Self::Record {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Position of the failing record, if known.
    pub fn record_index(&self) -> Option<usize> {
        match self {
            Self::MissingField { record, .. } => *record,
            Self::Record { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FoamTuneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for FoamTuneError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_names_field_and_record() {
        let err = FoamTuneError::missing_field("0/U").at_record(3);
        assert_eq!(err.to_string(), "Missing field '0/U' in record 3");
        assert_eq!(err.record_index(), Some(3));
    }

    #[test]
    fn test_at_record_wraps_other_errors_once() {
        let err = FoamTuneError::Tokenizer("bad byte".into())
            .at_record(7)
            .at_record(9);
        assert_eq!(err.record_index(), Some(7));
        assert!(err.to_string().starts_with("Record 7:"));
    }
}
