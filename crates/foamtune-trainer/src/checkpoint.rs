//! Checkpoint directories and trainer-state metadata.
//!
//! The strategy writes its own weights into the directory this module
//! prepares; only `trainer_state.json` is written here.

use foamtune_core::{FoamTuneError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File holding [`CheckpointMetadata`] inside a checkpoint directory.
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";

const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Training state metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Optimizer step.
    pub step: usize,
    /// Epoch the step belongs to.
    pub epoch: usize,
    /// Loss of the step.
    pub loss: f64,
    /// Learning rate at the step.
    pub learning_rate: f64,
    /// Random seed used.
    pub seed: u64,
    /// RFC 3339 timestamp.
    pub timestamp: String,
}

impl CheckpointMetadata {
    /// Create new metadata for the current training state.
    pub fn new(step: usize, epoch: usize, loss: f64, learning_rate: f64) -> Self {
        Self {
            step,
            epoch,
            loss,
            learning_rate,
            seed: 42,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Manages `checkpoint-{step}` directories under an output directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    output_dir: PathBuf,
    max_checkpoints: Option<usize>,
}

impl CheckpointManager {
    /// Create a manager, creating the output directory if needed.
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).map_err(|e| {
            FoamTuneError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create output directory '{}': {e}", output_dir.display()),
            ))
        })?;

        Ok(Self {
            output_dir,
            max_checkpoints: None,
        })
    }

    /// Keep at most `max` checkpoints, deleting the oldest.
    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = Some(max.max(1));
        self
    }

    /// Base output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Directory for the checkpoint at `step`.
    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.output_dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Create the directory for `step` and return it.
    pub fn prepare(&self, step: usize) -> Result<PathBuf> {
        let dir = self.checkpoint_path(step);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write metadata into a prepared checkpoint directory and rotate.
    pub fn finalize(&self, dir: &Path, metadata: &CheckpointMetadata) -> Result<()> {
        let json = serde_json::to_string_pretty(metadata)?;
        fs::write(dir.join(TRAINER_STATE_FILE), json)?;
        tracing::info!(step = metadata.step, path = %dir.display(), "Saved checkpoint");
        self.cleanup_old_checkpoints()
    }

    /// Read the metadata of a checkpoint directory.
    pub fn load_metadata(dir: &Path) -> Result<CheckpointMetadata> {
        let json = fs::read_to_string(dir.join(TRAINER_STATE_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// All checkpoints, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let mut checkpoints: Vec<(usize, PathBuf)> = fs::read_dir(&self.output_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let step = name.strip_prefix(CHECKPOINT_PREFIX)?.parse::<usize>().ok()?;
                Some((step, entry.path()))
            })
            .collect();
        checkpoints.sort_by_key(|(step, _)| *step);
        Ok(checkpoints)
    }

    /// Most recent checkpoint, if any.
    pub fn latest(&self) -> Result<Option<(usize, PathBuf)>> {
        Ok(self.list_checkpoints()?.pop())
    }

    fn cleanup_old_checkpoints(&self) -> Result<()> {
        let Some(max) = self.max_checkpoints else {
            return Ok(());
        };

        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(max);
        for (step, path) in checkpoints.into_iter().take(excess) {
            match fs::remove_dir_all(&path) {
                Ok(()) => tracing::debug!(step, "Removed old checkpoint"),
                Err(e) => tracing::warn!(step, error = %e, "Failed to remove old checkpoint"),
            }
        }
        Ok(())
    }
}
