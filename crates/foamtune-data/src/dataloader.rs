//! DataLoader for creating training batches.

use crate::TokenizedExample;
use foamtune_core::{FoamTuneError, Result, TrainingArguments};
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Multiplier used to form length-grouped mega-batches.
const MEGABATCH_MULT: usize = 50;

/// A batch of tokenized examples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingBatch {
    /// Token ids, one row per example.
    pub input_ids: Vec<Vec<u32>>,
    /// Labels, one row per example.
    pub labels: Vec<Vec<i64>>,
    /// Dataset positions of the rows.
    pub indices: Vec<usize>,
}

impl TrainingBatch {
    /// Number of examples in the batch.
    pub fn batch_size(&self) -> usize {
        self.indices.len()
    }
}

/// Configuration for the DataLoader.
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Batch size.
    pub batch_size: usize,
    /// Whether to shuffle the data.
    pub shuffle: bool,
    /// Random seed for shuffling.
    pub seed: u64,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
    /// Order examples so each batch holds similar lengths.
    pub group_by_length: bool,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            shuffle: true,
            seed: 42,
            drop_last: false,
            group_by_length: false,
        }
    }
}

impl DataLoaderConfig {
    /// Training loader settings from the trainer hyperparameters.
    pub fn from_args(args: &TrainingArguments) -> Self {
        Self {
            batch_size: args.per_device_train_batch_size,
            shuffle: true,
            seed: args.seed,
            drop_last: false,
            group_by_length: args.group_by_length,
        }
    }
}

/// DataLoader that yields batches from tokenized examples.
#[derive(Debug)]
pub struct DataLoader {
    examples: Vec<TokenizedExample>,
    config: DataLoaderConfig,
    indices: Vec<usize>,
    position: usize,
}

impl DataLoader {
    /// Create a new DataLoader.
    pub fn new(examples: Vec<TokenizedExample>, config: DataLoaderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(FoamTuneError::config("batch_size must be at least 1"));
        }
        let mut loader = Self {
            indices: (0..examples.len()).collect(),
            examples,
            config,
            position: 0,
        };
        loader.reorder(loader.config.seed);
        Ok(loader)
    }

    fn reorder(&mut self, seed: u64) {
        self.indices = (0..self.examples.len()).collect();
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        if self.config.shuffle {
            self.indices.shuffle(&mut rng);
        }
        if self.config.group_by_length {
            // Sort each mega-batch longest first; padded examples are
            // compared by their loss-bearing token count.
            let megabatch = self.config.batch_size * MEGABATCH_MULT;
            let examples = &self.examples;
            for chunk in self.indices.chunks_mut(megabatch) {
                chunk.sort_by_key(|&i| std::cmp::Reverse(examples[i].num_label_tokens()));
            }
        }
    }

    /// Reset the DataLoader for a new epoch.
    pub fn reset(&mut self, new_seed: Option<u64>) {
        self.position = 0;
        self.reorder(new_seed.unwrap_or(self.config.seed));
    }

    /// Get the number of batches.
    pub fn num_batches(&self) -> usize {
        let n = self.examples.len();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    /// Get the total number of examples.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Check if the loader is empty.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Get the next batch.
    pub fn next_batch(&mut self) -> Option<TrainingBatch> {
        if self.position >= self.indices.len() {
            return None;
        }

        let batch_end = (self.position + self.config.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.position..batch_end];

        if self.config.drop_last && batch_indices.len() < self.config.batch_size {
            return None;
        }

        let batch = TrainingBatch {
            input_ids: batch_indices
                .iter()
                .map(|&i| self.examples[i].input_ids.clone())
                .collect(),
            labels: batch_indices
                .iter()
                .map(|&i| self.examples[i].labels.clone())
                .collect(),
            indices: batch_indices.to_vec(),
        };
        self.position = batch_end;
        Some(batch)
    }
}

impl Iterator for DataLoader {
    type Item = TrainingBatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}
