//! Learning rate schedules for the training loop.

use crate::{FoamTuneError, LrSchedulerType, Result, TrainingArguments};
use std::f64::consts::PI;

/// Computes the learning rate from training progress.
#[derive(Debug, Clone)]
pub struct LearningRateScheduler {
    base_lr: f64,
    total_steps: usize,
    warmup_steps: usize,
    scheduler_type: LrSchedulerType,
    current_step: usize,
}

impl LearningRateScheduler {
    /// Create a new learning rate scheduler.
    pub fn new(
        base_lr: f64,
        total_steps: usize,
        warmup_steps: usize,
        scheduler_type: LrSchedulerType,
    ) -> Self {
        Self {
            base_lr,
            total_steps,
            warmup_steps,
            scheduler_type,
            current_step: 0,
        }
    }

    /// Build a scheduler from training arguments and the planned step count.
    pub fn from_args(args: &TrainingArguments, total_steps: usize) -> Result<Self> {
        SchedulerBuilder::new()
            .base_lr(args.learning_rate)
            .total_steps(total_steps)
            .warmup_ratio(args.warmup_ratio)
            .scheduler_type(args.lr_scheduler_type)
            .build()
    }

    /// Number of warmup steps.
    #[must_use]
    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    /// Learning rate at `step`.
    #[must_use]
    pub fn get_lr(&self, step: usize) -> f64 {
        // Plain constant never warms up.
        if self.scheduler_type == LrSchedulerType::Constant {
            return self.base_lr;
        }

        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps as f64;
        }

        let decay_steps = self.total_steps.saturating_sub(self.warmup_steps);
        if decay_steps == 0 {
            return self.base_lr;
        }
        let progress = ((step - self.warmup_steps) as f64 / decay_steps as f64).min(1.0);

        match self.scheduler_type {
            LrSchedulerType::Constant | LrSchedulerType::ConstantWithWarmup => self.base_lr,
            LrSchedulerType::Linear => self.base_lr * (1.0 - progress),
            LrSchedulerType::Cosine => self.base_lr * 0.5 * (1.0 + (PI * progress).cos()),
        }
    }

    /// Learning rate at the current step.
    #[must_use]
    pub fn current_lr(&self) -> f64 {
        self.get_lr(self.current_step)
    }

    /// Advance the scheduler by one step.
    pub fn step(&mut self) {
        self.current_step += 1;
    }

    /// Get the current step.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Whether the planned number of steps has been taken.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_step >= self.total_steps
    }
}

/// Builder for [`LearningRateScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerBuilder {
    base_lr: f64,
    total_steps: usize,
    warmup_steps: usize,
    warmup_ratio: Option<f64>,
    scheduler_type: LrSchedulerType,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerBuilder {
    /// Create a builder with the training argument defaults.
    pub fn new() -> Self {
        let args = TrainingArguments::default();
        Self {
            base_lr: args.learning_rate,
            total_steps: 0,
            warmup_steps: 0,
            warmup_ratio: None,
            scheduler_type: args.lr_scheduler_type,
        }
    }

    /// Set base learning rate.
    pub fn base_lr(mut self, lr: f64) -> Self {
        self.base_lr = lr;
        self
    }

    /// Set total training steps.
    pub fn total_steps(mut self, steps: usize) -> Self {
        self.total_steps = steps;
        self
    }

    /// Set warmup steps.
    pub fn warmup_steps(mut self, steps: usize) -> Self {
        self.warmup_steps = steps;
        self.warmup_ratio = None;
        self
    }

    /// Set warmup as a fraction of total steps (rounded up).
    pub fn warmup_ratio(mut self, ratio: f64) -> Self {
        self.warmup_ratio = Some(ratio);
        self
    }

    /// Set scheduler type.
    pub fn scheduler_type(mut self, scheduler: LrSchedulerType) -> Self {
        self.scheduler_type = scheduler;
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> Result<LearningRateScheduler> {
        if !self.base_lr.is_finite() || self.base_lr < 0.0 {
            return Err(FoamTuneError::config(format!(
                "learning rate must be a non-negative number, got {}",
                self.base_lr
            )));
        }
        let warmup_steps = match self.warmup_ratio {
            Some(ratio) if !(0.0..1.0).contains(&ratio) => {
                return Err(FoamTuneError::config(format!(
                    "warmup_ratio must be in [0, 1), got {ratio}"
                )))
            }
            Some(ratio) => (self.total_steps as f64 * ratio).ceil() as usize,
            None => self.warmup_steps,
        };

        Ok(LearningRateScheduler::new(
            self.base_lr,
            self.total_steps,
            warmup_steps,
            self.scheduler_type,
        ))
    }
}
