//! Common type definitions.

use serde::{Deserialize, Serialize};

/// Compute dtype requested from the external model loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// 32-bit floating point.
    Float32,
    /// 16-bit floating point.
    Float16,
    /// Brain floating point (16-bit).
    #[default]
    BFloat16,
}

/// Weight quantization scheme used when loading the base model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// Full precision weights.
    None,
    /// 4-bit NormalFloat.
    #[default]
    NF4,
    /// 4-bit floating point.
    FP4,
    /// 8-bit integer.
    Int8,
}

/// Evaluation metrics reported by a training strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Mean loss over the evaluation set.
    pub loss: f64,
    /// Perplexity (`exp(loss)`).
    pub perplexity: f64,
    /// Number of evaluation examples seen.
    pub num_examples: usize,
}

impl EvalMetrics {
    /// Build metrics from a mean loss.
    pub fn from_loss(loss: f64, num_examples: usize) -> Self {
        Self {
            loss,
            perplexity: loss.exp(),
            num_examples,
        }
    }
}
