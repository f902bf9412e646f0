//! Column pruning after tokenization.

use crate::{Record, TokenizedExample};
use foamtune_core::{DatasetConfig, FoamTuneError, Result};

/// Token id column.
pub const INPUT_IDS: &str = "input_ids";
/// Label column.
pub const LABELS: &str = "labels";
/// Attention mask column.
pub const ATTENTION_MASK: &str = "attention_mask";
/// Formatted text column.
pub const TEXT: &str = "text";

/// Keeps the tokenized outputs and drops every upstream column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    remove_columns: Vec<String>,
    keep_attention_mask: bool,
}

impl Projection {
    /// Create a projection expecting to remove `remove_columns`.
    pub fn new(remove_columns: Vec<String>, keep_attention_mask: bool) -> Self {
        Self {
            remove_columns,
            keep_attention_mask,
        }
    }

    /// Build from the dataset section of a run configuration.
    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(config.remove_columns.clone(), config.keep_attention_mask)
    }

    /// Columns that survive the projection.
    pub fn retained_columns(&self) -> Vec<&'static str> {
        if self.keep_attention_mask {
            vec![INPUT_IDS, LABELS, ATTENTION_MASK]
        } else {
            vec![INPUT_IDS, LABELS]
        }
    }

    /// Columns present upstream of the projection for a batch of records:
    /// every record field, the formatted text and the tokenizer outputs.
    pub fn upstream_columns(records: &[Record]) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        };
        records.iter().flat_map(Record::field_names).for_each(&mut push);
        [TEXT, INPUT_IDS, LABELS, ATTENTION_MASK].into_iter().for_each(&mut push);
        columns
    }

    /// Check that every expected column exists upstream.
    pub fn check_schema<S: AsRef<str>>(&self, available: &[S]) -> Result<()> {
        let has = |name: &str| available.iter().any(|c| c.as_ref() == name);
        let required: Vec<&str> = self.retained_columns();
        let expected = self.remove_columns.iter().map(String::as_str);
        match required.into_iter().chain(expected).find(|name| !has(name)) {
            Some(column) => Err(FoamTuneError::SchemaDrift {
                column: column.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Drop the columns that do not survive.
    pub fn apply(&self, mut example: TokenizedExample) -> TokenizedExample {
        if !self.keep_attention_mask {
            example.attention_mask = Vec::new();
        }
        example
    }
}
