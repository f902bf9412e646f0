//! Dataset handling and preprocessing for FoamTune.
//!
//! This crate provides:
//! - Record loading from JSONL, JSON and Parquet
//! - Instruction and chat prompt templates
//! - Tokenizer integration and fixed-length label masking
//! - Column projection and the parallel prepare pipeline
//! - DataLoader for creating training batches

#![warn(missing_docs)]

pub mod chat_templates;
pub mod dataloader;
pub mod dataset;
pub mod masking;
pub mod pipeline;
pub mod projection;
pub mod template;
pub mod tokenizer;

pub use chat_templates::{ChatDialect, Message};
pub use dataloader::*;
pub use dataset::*;
pub use masking::*;
pub use pipeline::*;
pub use projection::Projection;
pub use template::*;
pub use tokenizer::*;
