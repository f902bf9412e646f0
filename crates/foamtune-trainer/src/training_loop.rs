//! Training loop that drives a [`TrainingStrategy`].
//!
//! The loop connects DataLoader → strategy and owns everything that is
//! not numeric:
//! - epochs and per-epoch reshuffling
//! - gradient accumulation (micro-batches per optimizer step)
//! - the learning rate schedule
//! - checkpoint cadence and the `max_steps` cap
//! - callbacks, including a [`LoggingCallback`] every `logging_steps`

use crate::{
    CheckpointManager, CheckpointMetadata, CompositeCallback, LoggingCallback, TrainingStrategy,
};
use foamtune_core::{
    EvalMetrics, FoamTuneError, LearningRateScheduler, Result, TrainingArguments, TrainingCallback,
};
use foamtune_data::{DataLoader, DataLoaderConfig, TokenizedExample, TrainingBatch};
use serde::Serialize;
use std::path::PathBuf;

/// Optimizer steps in one pass over `num_batches` micro-batches.
pub fn steps_per_epoch(num_batches: usize, gradient_accumulation_steps: usize) -> usize {
    num_batches.div_ceil(gradient_accumulation_steps.max(1))
}

/// Outcome of [`TrainingLoop::run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingSummary {
    /// Optimizer steps taken.
    pub steps: usize,
    /// Epochs started.
    pub epochs: usize,
    /// Loss of the last step.
    pub final_loss: f64,
    /// Learning rate of the last step.
    pub final_learning_rate: f64,
    /// Final evaluation, when an eval set was given.
    pub eval: Option<EvalMetrics>,
    /// Checkpoint directories written, oldest first.
    pub checkpoints: Vec<PathBuf>,
}

/// Training loop over tokenized examples.
pub struct TrainingLoop {
    args: TrainingArguments,
    callbacks: CompositeCallback,
    checkpoint_manager: Option<CheckpointManager>,
}

impl TrainingLoop {
    /// Create a training loop, validating the arguments.
    ///
    /// Step logging is installed here when `logging_steps` is non-zero.
    pub fn new(args: TrainingArguments) -> Result<Self> {
        args.validate()?;
        let mut callbacks = CompositeCallback::new();
        if args.logging_steps > 0 {
            callbacks.push(Box::new(LoggingCallback::new(args.logging_steps)));
        }
        Ok(Self {
            args,
            callbacks,
            checkpoint_manager: None,
        })
    }

    /// Add a callback.
    pub fn with_callback(mut self, callback: Box<dyn TrainingCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Save checkpoints through `manager` every `save_steps`.
    pub fn with_checkpoint_manager(mut self, manager: CheckpointManager) -> Self {
        self.checkpoint_manager = Some(manager);
        self
    }

    /// Training arguments in use.
    pub fn args(&self) -> &TrainingArguments {
        &self.args
    }

    /// Number of optimizer steps a run over `num_examples` will take.
    pub fn planned_steps(&self, num_examples: usize) -> usize {
        let batches = num_examples.div_ceil(self.args.per_device_train_batch_size.max(1));
        let per_epoch = steps_per_epoch(batches, self.args.gradient_accumulation_steps);
        self.args
            .max_steps
            .unwrap_or(per_epoch * self.args.num_train_epochs)
    }

    /// Run training.
    ///
    /// With `max_steps` set, epochs repeat until that many steps are taken;
    /// otherwise `num_train_epochs` full passes are made. The eval set, if
    /// any, is evaluated once at the end.
    pub fn run<S: TrainingStrategy + ?Sized>(
        &mut self,
        strategy: &mut S,
        train: Vec<TokenizedExample>,
        eval: Option<&[TokenizedExample]>,
    ) -> Result<TrainingSummary> {
        if train.is_empty() {
            return Err(FoamTuneError::Training("training set is empty".into()));
        }

        let accumulation = self.args.gradient_accumulation_steps;
        let mut loader = DataLoader::new(train, DataLoaderConfig::from_args(&self.args))?;
        let per_epoch = steps_per_epoch(loader.num_batches(), accumulation);
        if per_epoch == 0 {
            return Err(FoamTuneError::Training(
                "not enough examples for one batch".into(),
            ));
        }
        let total_steps = self.planned_steps(loader.len());
        let num_epochs = match self.args.max_steps {
            Some(max) => max.div_ceil(per_epoch),
            None => self.args.num_train_epochs,
        };
        let mut scheduler = LearningRateScheduler::from_args(&self.args, total_steps)?;

        tracing::info!(
            examples = loader.len(),
            batch_size = self.args.per_device_train_batch_size,
            gradient_accumulation_steps = accumulation,
            total_steps,
            warmup_steps = scheduler.warmup_steps(),
            "Starting training"
        );

        let mut summary = TrainingSummary::default();
        self.callbacks.on_train_start();

        'epochs: for epoch in 0..num_epochs {
            summary.epochs = epoch + 1;
            self.callbacks.on_epoch_start(epoch);
            loader.reset(Some(self.args.seed + epoch as u64));

            let mut epoch_loss = 0.0;
            let mut epoch_steps = 0usize;
            let mut epoch_examples = 0usize;
            let mut micro_batches: Vec<TrainingBatch> = Vec::with_capacity(accumulation);

            loop {
                let next = loader.next_batch();
                let exhausted = next.is_none();
                if let Some(batch) = next {
                    micro_batches.push(batch);
                }
                if micro_batches.is_empty() {
                    break;
                }
                if micro_batches.len() < accumulation && !exhausted {
                    continue;
                }

                let step = summary.steps + 1;
                let lr = scheduler.current_lr();
                self.callbacks.on_step_start(step);
                let loss = strategy.step(&micro_batches, lr)?;
                scheduler.step();
                summary.steps = step;
                summary.final_loss = loss;
                summary.final_learning_rate = lr;
                epoch_loss += loss;
                epoch_steps += 1;
                epoch_examples += micro_batches.iter().map(TrainingBatch::batch_size).sum::<usize>();
                micro_batches.clear();
                self.callbacks.on_step_end(step, loss, lr);

                if self.args.save_steps > 0 && step % self.args.save_steps == 0 {
                    if let Some(dir) = self.save_checkpoint(strategy, step, epoch, loss, lr)? {
                        summary.checkpoints.push(dir);
                    }
                }

                if step >= total_steps {
                    tracing::info!(max_steps = total_steps, "Reached final step, stopping");
                    self.end_epoch(epoch, epoch_loss, epoch_steps, epoch_examples);
                    break 'epochs;
                }
                if exhausted {
                    break;
                }
            }

            self.end_epoch(epoch, epoch_loss, epoch_steps, epoch_examples);
        }

        if let Some(examples) = eval.filter(|e| !e.is_empty()) {
            let metrics = strategy.evaluate(examples)?;
            self.callbacks.on_evaluate(summary.steps, &metrics);
            summary.eval = Some(metrics);
        }

        self.callbacks.on_train_end();
        tracing::info!(
            steps = summary.steps,
            final_loss = summary.final_loss,
            "Training complete"
        );
        Ok(summary)
    }

    fn end_epoch(&mut self, epoch: usize, loss_sum: f64, steps: usize, examples: usize) {
        let mean = if steps == 0 { 0.0 } else { loss_sum / steps as f64 };
        self.callbacks
            .on_epoch_end(epoch, &EvalMetrics::from_loss(mean, examples));
    }

    fn save_checkpoint<S: TrainingStrategy + ?Sized>(
        &mut self,
        strategy: &mut S,
        step: usize,
        epoch: usize,
        loss: f64,
        lr: f64,
    ) -> Result<Option<PathBuf>> {
        let Some(manager) = &self.checkpoint_manager else {
            return Ok(None);
        };
        let dir = manager.prepare(step)?;
        strategy.checkpoint(&dir)?;
        let metadata = CheckpointMetadata::new(step, epoch, loss, lr).with_seed(self.args.seed);
        manager.finalize(&dir, &metadata)?;
        self.callbacks.on_save(&dir);
        Ok(Some(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_per_epoch_rounds_up() {
        assert_eq!(steps_per_epoch(10, 2), 5);
        assert_eq!(steps_per_epoch(11, 2), 6);
        assert_eq!(steps_per_epoch(1, 4), 1);
        assert_eq!(steps_per_epoch(0, 4), 0);
    }

    #[test]
    fn test_planned_steps() {
        let args = TrainingArguments {
            num_train_epochs: 3,
            per_device_train_batch_size: 2,
            gradient_accumulation_steps: 2,
            ..Default::default()
        };
        let training = TrainingLoop::new(args.clone()).unwrap();
        // 9 examples → 5 batches → 3 steps per epoch.
        assert_eq!(training.planned_steps(9), 9);

        let capped = TrainingLoop::new(TrainingArguments {
            max_steps: Some(4),
            ..args
        })
        .unwrap();
        assert_eq!(capped.planned_steps(9), 4);
    }

    #[test]
    fn test_step_logging_installed_once() {
        let logged = TrainingLoop::new(TrainingArguments {
            logging_steps: 10,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(logged.callbacks.len(), 1);

        let silent = TrainingLoop::new(TrainingArguments {
            logging_steps: 0,
            ..Default::default()
        })
        .unwrap();
        assert!(silent.callbacks.is_empty());
    }

    #[test]
    fn test_invalid_args_rejected() {
        let args = TrainingArguments {
            gradient_accumulation_steps: 0,
            ..Default::default()
        };
        assert!(TrainingLoop::new(args).is_err());
    }
}
