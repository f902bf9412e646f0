//! Supervised fine-tuning job hand-off.
//!
//! An [`SftJob`] bundles everything an external trainer needs: the model
//! handle, the LoRA adapter settings, the trainer hyperparameters and the
//! tokenized train/eval sets. [`SftJob::write_manifest`] serializes it to a
//! directory the trainer process reads.

use foamtune_core::{FoamTuneError, LoraConfig, ModelConfig, Result, TrainingArguments};
use foamtune_data::{read_jsonl, write_jsonl, TokenizedExample};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Manifest file name inside a job directory.
pub const JOB_MANIFEST_FILE: &str = "job.json";
const TRAIN_FILE: &str = "train.jsonl";
const EVAL_FILE: &str = "eval.jsonl";

/// On-disk description of an [`SftJob`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    /// Model handle.
    pub model: ModelConfig,
    /// LoRA adapter settings.
    pub lora: LoraConfig,
    /// Trainer hyperparameters.
    pub training: TrainingArguments,
    /// Length of every tokenized example.
    pub max_length: usize,
    /// Training set, relative to the manifest.
    pub train_file: PathBuf,
    /// Number of training examples.
    pub num_train: usize,
    /// Eval set, relative to the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_file: Option<PathBuf>,
    /// Number of eval examples.
    #[serde(default)]
    pub num_eval: usize,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Supervised fine-tuning job.
#[derive(Debug, Clone)]
pub struct SftJob {
    /// Model handle.
    pub model: ModelConfig,
    /// LoRA adapter settings.
    pub lora: LoraConfig,
    /// Trainer hyperparameters, passed through uninterpreted.
    pub training: TrainingArguments,
    /// Tokenized training set.
    pub train: Vec<TokenizedExample>,
    /// Tokenized eval set.
    pub eval: Option<Vec<TokenizedExample>>,
    /// Configured sequence length.
    pub max_length: usize,
}

impl SftJob {
    /// Check the job before hand-off.
    ///
    /// Both sets must be non-empty and every example must be exactly
    /// `max_length` long.
    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        if self.model.model_id.trim().is_empty() {
            return Err(FoamTuneError::config("model_id must not be empty"));
        }
        check_examples("train", &self.train, self.max_length)?;
        if let Some(eval) = &self.eval {
            check_examples("eval", eval, self.max_length)?;
        }
        Ok(())
    }

    /// Validate and write the job into `dir`, returning the manifest path.
    pub fn write_manifest(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        self.validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        write_jsonl(dir.join(TRAIN_FILE), &self.train)?;
        let eval_file = match &self.eval {
            Some(eval) => {
                write_jsonl(dir.join(EVAL_FILE), eval)?;
                Some(PathBuf::from(EVAL_FILE))
            }
            None => None,
        };

        let manifest = JobManifest {
            model: self.model.clone(),
            lora: self.lora.clone(),
            training: self.training.clone(),
            max_length: self.max_length,
            train_file: PathBuf::from(TRAIN_FILE),
            num_train: self.train.len(),
            eval_file,
            num_eval: self.eval.as_ref().map_or(0, Vec::len),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let path = dir.join(JOB_MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;

        tracing::info!(
            path = %path.display(),
            model_id = %self.model.model_id,
            train = manifest.num_train,
            eval = manifest.num_eval,
            "Wrote job manifest"
        );
        Ok(path)
    }

    /// Load a job back from a manifest written by [`Self::write_manifest`].
    pub fn from_manifest(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest: JobManifest = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let eval = match &manifest.eval_file {
            Some(file) => Some(read_jsonl(base.join(file))?),
            None => None,
        };
        let job = Self {
            train: read_jsonl(base.join(&manifest.train_file))?,
            eval,
            model: manifest.model,
            lora: manifest.lora,
            training: manifest.training,
            max_length: manifest.max_length,
        };
        job.validate()?;
        Ok(job)
    }
}

fn check_examples(name: &str, examples: &[TokenizedExample], max_length: usize) -> Result<()> {
    if examples.is_empty() {
        return Err(FoamTuneError::config(format!("{name} dataset is empty")));
    }
    for (index, example) in examples.iter().enumerate() {
        if example.input_ids.len() != max_length || example.labels.len() != max_length {
            return Err(FoamTuneError::config(format!(
                "{name} example has {} input ids and {} labels, expected {max_length}",
                example.input_ids.len(),
                example.labels.len()
            ))
            .at_record(index));
        }
    }
    Ok(())
}
