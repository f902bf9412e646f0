//! Core types, traits, and configuration for FoamTune.
//!
//! This crate holds what every other FoamTune crate shares:
//!
//! - The error enum and `Result` alias
//! - Run configuration (model, LoRA, training, dataset, tokenization)
//! - Learning rate schedules
//! - The training callback trait
//! - Redacted secret storage for hub tokens

#![warn(missing_docs)]

mod config;
mod error;
pub mod scheduler;
mod secrets;
mod traits;
mod types;

pub use config::*;
pub use error::*;
pub use scheduler::{LearningRateScheduler, SchedulerBuilder};
pub use secrets::SecretString;
pub use traits::*;
pub use types::*;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::{FoamTuneError, Result};
    pub use crate::scheduler::{LearningRateScheduler, SchedulerBuilder};
    pub use crate::secrets::SecretString;
    pub use crate::traits::*;
    pub use crate::types::*;
}
