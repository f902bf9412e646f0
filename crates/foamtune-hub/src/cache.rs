//! Local cache location.

use std::path::{Path, PathBuf};

/// Directory Hub downloads land in.
///
/// An explicit override wins; otherwise the Hub default applies
/// (`$HF_HOME/hub`, falling back to `~/.cache/huggingface/hub`).
pub fn resolve_cache_dir(override_dir: Option<&Path>) -> PathBuf {
    match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => hf_hub::Cache::default().path().clone(),
    }
}
