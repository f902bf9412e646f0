//! Trainer hand-off and training orchestration for FoamTune.
//!
//! This crate provides:
//! - [`SftJob`], the bundle handed to an external fine-tuning trainer
//! - [`TrainingStrategy`], the capability set a trainer backend implements
//! - [`TrainingLoop`], which drives a strategy over epochs and batches
//! - Training callbacks and checkpoint metadata
//!
//! The numeric work (forward pass, gradients, optimizer, LoRA weights) is
//! done by the strategy; nothing here depends on a tensor library.

#![warn(missing_docs)]

pub mod callbacks;
pub mod checkpoint;
pub mod sft;
pub mod strategy;
pub mod training_loop;

pub use callbacks::*;
pub use checkpoint::*;
pub use sft::*;
pub use strategy::*;
pub use training_loop::*;
