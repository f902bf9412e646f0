//! The capability set a trainer backend exposes to [`TrainingLoop`].
//!
//! [`TrainingLoop`]: crate::TrainingLoop

use foamtune_core::{EvalMetrics, FoamTuneError, Result};
use foamtune_data::{TokenizedExample, TrainingBatch, IGNORE_INDEX};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A trainer backend driven by [`crate::TrainingLoop`].
///
/// The loop owns scheduling (epochs, accumulation, learning rate,
/// checkpoint cadence); the strategy owns the model.
pub trait TrainingStrategy {
    /// Run one optimizer step over `micro_batches`, accumulating their
    /// gradients, at `learning_rate`. Returns the mean loss.
    fn step(&mut self, micro_batches: &[TrainingBatch], learning_rate: f64) -> Result<f64>;

    /// Evaluate on held-out examples.
    fn evaluate(&mut self, examples: &[TokenizedExample]) -> Result<EvalMetrics>;

    /// Save trainable weights into `dir`, which already exists.
    fn checkpoint(&mut self, dir: &Path) -> Result<()>;
}

/// Counters written by [`DryRunStrategy::checkpoint`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunState {
    /// Optimizer steps taken.
    pub steps: usize,
    /// Rows consumed across all micro-batches.
    pub examples_seen: usize,
    /// Loss-bearing tokens consumed.
    pub label_tokens_seen: usize,
}

/// Strategy that checks batch shapes and reports the loss of a uniform
/// predictor, for rehearsing a job without a model.
#[derive(Debug, Clone)]
pub struct DryRunStrategy {
    vocab_size: usize,
    state: DryRunState,
}

/// File written into each checkpoint directory by [`DryRunStrategy`].
pub const DRY_RUN_STATE_FILE: &str = "dry_run_state.json";

impl DryRunStrategy {
    /// Create a dry-run strategy for a vocabulary of `vocab_size` tokens.
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size: vocab_size.max(1),
            state: DryRunState::default(),
        }
    }

    /// Counters so far.
    pub fn state(&self) -> &DryRunState {
        &self.state
    }

    fn uniform_loss(&self) -> f64 {
        (self.vocab_size as f64).ln()
    }

    fn check_row(input_ids: &[u32], labels: &[i64]) -> Result<usize> {
        if input_ids.len() != labels.len() {
            return Err(FoamTuneError::Training(format!(
                "input_ids has {} positions but labels has {}",
                input_ids.len(),
                labels.len()
            )));
        }
        Ok(labels.iter().filter(|&&l| l != IGNORE_INDEX).count())
    }
}

impl TrainingStrategy for DryRunStrategy {
    fn step(&mut self, micro_batches: &[TrainingBatch], _learning_rate: f64) -> Result<f64> {
        if micro_batches.is_empty() {
            return Err(FoamTuneError::Training("optimizer step with no batches".into()));
        }
        for batch in micro_batches {
            for (ids, labels) in batch.input_ids.iter().zip(&batch.labels) {
                self.state.label_tokens_seen += Self::check_row(ids, labels)?;
            }
            self.state.examples_seen += batch.batch_size();
        }
        self.state.steps += 1;
        Ok(self.uniform_loss())
    }

    fn evaluate(&mut self, examples: &[TokenizedExample]) -> Result<EvalMetrics> {
        for example in examples {
            Self::check_row(&example.input_ids, &example.labels)?;
        }
        Ok(EvalMetrics::from_loss(self.uniform_loss(), examples.len()))
    }

    fn checkpoint(&mut self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(dir.join(DRY_RUN_STATE_FILE), json)?;
        Ok(())
    }
}
