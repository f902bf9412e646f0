//! HuggingFace Hub integration for FoamTune.
//!
//! This crate provides:
//! - Dataset Parquet shard downloads for a split
//! - `tokenizer.json` downloads for the base model
//! - Local cache location

#![warn(missing_docs)]

mod cache;
mod download;

pub use cache::*;
pub use download::*;
