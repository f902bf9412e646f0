//! Training callbacks for monitoring and logging.
//!
//! - [`ProgressCallback`] - Progress bar over optimizer steps
//! - [`LoggingCallback`] - Structured `tracing` events every N steps
//! - [`MetricsJsonCallback`] - JSONL metrics file, one event per line
//! - [`CompositeCallback`] - Fans events out to several callbacks

use foamtune_core::{EvalMetrics, TrainingCallback};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Progress bar callback for training visualization.
pub struct ProgressCallback {
    progress: indicatif::ProgressBar,
}

impl ProgressCallback {
    /// Create a new progress callback.
    pub fn new(total_steps: usize) -> Self {
        let progress = indicatif::ProgressBar::new(total_steps as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        {
            progress.set_style(style.progress_chars("#>-"));
        }
        Self { progress }
    }
}

impl TrainingCallback for ProgressCallback {
    fn on_train_start(&mut self) {
        self.progress.reset();
    }

    fn on_train_end(&mut self) {
        self.progress.finish_with_message("done");
    }

    fn on_step_end(&mut self, step: usize, loss: f64, lr: f64) {
        self.progress.set_position(step as u64);
        self.progress.set_message(format!("loss: {loss:.4} lr: {lr:.2e}"));
    }
}

/// Logs the mean loss over every `log_every` steps.
pub struct LoggingCallback {
    log_every: usize,
    loss_sum: f64,
    steps_in_window: usize,
}

impl LoggingCallback {
    /// Create a new logging callback.
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every: log_every.max(1),
            loss_sum: 0.0,
            steps_in_window: 0,
        }
    }
}

impl TrainingCallback for LoggingCallback {
    fn on_step_end(&mut self, step: usize, loss: f64, lr: f64) {
        self.loss_sum += loss;
        self.steps_in_window += 1;
        if step % self.log_every == 0 {
            let mean = self.loss_sum / self.steps_in_window as f64;
            tracing::info!(step, loss = mean, learning_rate = lr, "Training step");
            self.loss_sum = 0.0;
            self.steps_in_window = 0;
        }
    }

    fn on_epoch_end(&mut self, epoch: usize, metrics: &EvalMetrics) {
        tracing::info!(
            epoch,
            loss = metrics.loss,
            perplexity = metrics.perplexity,
            "Epoch complete"
        );
    }

    fn on_evaluate(&mut self, step: usize, metrics: &EvalMetrics) {
        tracing::info!(
            step,
            eval_loss = metrics.loss,
            perplexity = metrics.perplexity,
            examples = metrics.num_examples,
            "Evaluation"
        );
    }

    fn on_save(&mut self, path: &Path) {
        tracing::info!(path = %path.display(), "Checkpoint saved");
    }
}

/// JSONL metrics callback.
///
/// ```json
/// {"step": 25, "epoch": 0, "loss": 1.93, "learning_rate": 0.0002, "timestamp": "2026-01-01T12:00:00+00:00"}
/// ```
pub struct MetricsJsonCallback {
    writer: BufWriter<File>,
    path: PathBuf,
    current_epoch: usize,
    run_name: Option<String>,
    config: Option<serde_json::Value>,
}

impl MetricsJsonCallback {
    /// Create a new JSONL metrics callback, truncating any existing file.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            current_epoch: 0,
            run_name: None,
            config: None,
        })
    }

    /// Set a run name recorded with the start event.
    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = Some(name.into());
        self
    }

    /// Set training configuration to log at start.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Get the path to the metrics file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entry(&mut self, mut entry: serde_json::Value) {
        entry["timestamp"] = serde_json::json!(chrono::Utc::now().to_rfc3339());
        if let Ok(line) = serde_json::to_string(&entry) {
            if let Err(e) = writeln!(self.writer, "{line}") {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to write metrics");
            }
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush metrics");
        }
    }
}

impl TrainingCallback for MetricsJsonCallback {
    fn on_train_start(&mut self) {
        let mut entry = serde_json::json!({ "event": "train_start" });
        if let Some(ref name) = self.run_name {
            entry["run_name"] = serde_json::json!(name);
        }
        if let Some(ref config) = self.config {
            entry["config"] = config.clone();
        }
        self.write_entry(entry);
        self.flush();
    }

    fn on_train_end(&mut self) {
        self.write_entry(serde_json::json!({ "event": "train_end" }));
        self.flush();
    }

    fn on_epoch_start(&mut self, epoch: usize) {
        self.current_epoch = epoch;
    }

    fn on_epoch_end(&mut self, epoch: usize, metrics: &EvalMetrics) {
        self.write_entry(serde_json::json!({
            "event": "epoch_end",
            "epoch": epoch,
            "loss": metrics.loss,
            "perplexity": metrics.perplexity,
        }));
        self.flush();
    }

    fn on_step_end(&mut self, step: usize, loss: f64, lr: f64) {
        self.write_entry(serde_json::json!({
            "step": step,
            "epoch": self.current_epoch,
            "loss": loss,
            "learning_rate": lr,
        }));
        if step % 10 == 0 {
            self.flush();
        }
    }

    fn on_evaluate(&mut self, step: usize, metrics: &EvalMetrics) {
        self.write_entry(serde_json::json!({
            "event": "evaluate",
            "step": step,
            "eval_loss": metrics.loss,
            "perplexity": metrics.perplexity,
        }));
        self.flush();
    }

    fn on_save(&mut self, path: &Path) {
        self.write_entry(serde_json::json!({
            "event": "checkpoint_saved",
            "path": path.display().to_string(),
        }));
        self.flush();
    }
}

/// Forwards every event to each wrapped callback in order.
#[derive(Default)]
pub struct CompositeCallback {
    callbacks: Vec<Box<dyn TrainingCallback>>,
}

impl CompositeCallback {
    /// Create an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback.
    pub fn push(&mut self, callback: Box<dyn TrainingCallback>) {
        self.callbacks.push(callback);
    }

    /// Get the number of callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Check if there are no callbacks.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl TrainingCallback for CompositeCallback {
    fn on_train_start(&mut self) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_train_start());
    }

    fn on_train_end(&mut self) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_train_end());
    }

    fn on_epoch_start(&mut self, epoch: usize) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_epoch_start(epoch));
    }

    fn on_epoch_end(&mut self, epoch: usize, metrics: &EvalMetrics) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_epoch_end(epoch, metrics));
    }

    fn on_step_start(&mut self, step: usize) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_step_start(step));
    }

    fn on_step_end(&mut self, step: usize, loss: f64, lr: f64) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_step_end(step, loss, lr));
    }

    fn on_evaluate(&mut self, step: usize, metrics: &EvalMetrics) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_evaluate(step, metrics));
    }

    fn on_save(&mut self, path: &Path) {
        self.callbacks.iter_mut().for_each(|cb| cb.on_save(path));
    }
}
