//! Training loop scheduling against a recording strategy.

use foamtune_core::{
    EvalMetrics, LrSchedulerType, Result, TrainingArguments, TrainingCallback,
};
use foamtune_data::{TokenizedExample, TrainingBatch};
use foamtune_trainer::{
    CheckpointManager, MetricsJsonCallback, TrainingLoop, TrainingStrategy, TRAINER_STATE_FILE,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingStrategy {
    steps: Vec<(usize, f64)>,
    checkpoints: Vec<PathBuf>,
    evaluations: usize,
}

impl TrainingStrategy for RecordingStrategy {
    fn step(&mut self, micro_batches: &[TrainingBatch], learning_rate: f64) -> Result<f64> {
        self.steps.push((micro_batches.len(), learning_rate));
        Ok(1.0 / self.steps.len() as f64)
    }

    fn evaluate(&mut self, examples: &[TokenizedExample]) -> Result<EvalMetrics> {
        self.evaluations += 1;
        Ok(EvalMetrics::from_loss(0.5, examples.len()))
    }

    fn checkpoint(&mut self, dir: &Path) -> Result<()> {
        std::fs::write(dir.join("adapter.bin"), b"weights")?;
        self.checkpoints.push(dir.to_path_buf());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct StepLog(Arc<Mutex<Vec<usize>>>);

impl TrainingCallback for StepLog {
    fn on_step_end(&mut self, step: usize, _loss: f64, _lr: f64) {
        self.0.lock().unwrap().push(step);
    }
}

fn examples(n: usize) -> Vec<TokenizedExample> {
    (0..n)
        .map(|i| TokenizedExample {
            input_ids: vec![i as u32 + 1, 0],
            labels: vec![i as i64 + 1, -100],
            attention_mask: Vec::new(),
        })
        .collect()
}

fn args() -> TrainingArguments {
    TrainingArguments {
        num_train_epochs: 2,
        per_device_train_batch_size: 2,
        gradient_accumulation_steps: 2,
        save_steps: 0,
        logging_steps: 1,
        warmup_ratio: 0.0,
        ..Default::default()
    }
}

#[test]
fn test_step_count_follows_accumulation() {
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(args()).unwrap();
    let summary = training.run(&mut strategy, examples(10), None).unwrap();

    // 10 examples → 5 batches → steps of 2, 2 and 1 micro-batches per epoch.
    let micro: Vec<usize> = strategy.steps.iter().map(|(n, _)| *n).collect();
    assert_eq!(micro, vec![2, 2, 1, 2, 2, 1]);
    assert_eq!(summary.steps, 6);
    assert_eq!(summary.epochs, 2);
    assert_eq!(training.planned_steps(10), 6);
}

#[test]
fn test_checkpoints_on_save_steps() {
    let dir = tempfile::tempdir().unwrap();
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(TrainingArguments {
        save_steps: 2,
        ..args()
    })
    .unwrap()
    .with_checkpoint_manager(CheckpointManager::new(dir.path()).unwrap());

    let summary = training.run(&mut strategy, examples(10), None).unwrap();

    let expected: Vec<PathBuf> = [2, 4, 6]
        .iter()
        .map(|s| dir.path().join(format!("checkpoint-{s}")))
        .collect();
    assert_eq!(summary.checkpoints, expected);
    assert_eq!(strategy.checkpoints, expected);
    for path in &expected {
        assert!(path.join(TRAINER_STATE_FILE).exists());
        assert!(path.join("adapter.bin").exists());
    }

    let state = CheckpointManager::load_metadata(&expected[1]).unwrap();
    assert_eq!(state.step, 4);
    assert_eq!(state.epoch, 1);
    assert_eq!(state.seed, 42);
}

#[test]
fn test_max_steps_caps_across_epochs() {
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(TrainingArguments {
        num_train_epochs: 1,
        max_steps: Some(4),
        ..args()
    })
    .unwrap();
    let summary = training.run(&mut strategy, examples(10), None).unwrap();

    assert_eq!(strategy.steps.len(), 4);
    assert_eq!(summary.steps, 4);
    assert_eq!(summary.epochs, 2);
    assert!((summary.final_loss - 0.25).abs() < 1e-12);
}

#[test]
fn test_linear_schedule_decays() {
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(TrainingArguments {
        lr_scheduler_type: LrSchedulerType::Linear,
        learning_rate: 1e-3,
        ..args()
    })
    .unwrap();
    training.run(&mut strategy, examples(10), None).unwrap();

    let lrs: Vec<f64> = strategy.steps.iter().map(|(_, lr)| *lr).collect();
    assert!((lrs[0] - 1e-3).abs() < 1e-15);
    assert!(lrs.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn test_constant_schedule_is_flat() {
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(args()).unwrap();
    training.run(&mut strategy, examples(4), None).unwrap();
    assert!(strategy.steps.iter().all(|(_, lr)| (*lr - 2e-4).abs() < 1e-15));
}

#[test]
fn test_eval_runs_once_at_end() {
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(args()).unwrap();
    let eval = examples(3);
    let summary = training.run(&mut strategy, examples(6), Some(&eval)).unwrap();

    assert_eq!(strategy.evaluations, 1);
    let metrics = summary.eval.unwrap();
    assert_eq!(metrics.num_examples, 3);
    assert!((metrics.perplexity - 0.5f64.exp()).abs() < 1e-12);
}

#[test]
fn test_callbacks_observe_every_step() {
    let log = StepLog::default();
    let dir = tempfile::tempdir().unwrap();
    let metrics_path = dir.path().join("metrics.jsonl");

    let mut training = TrainingLoop::new(args())
        .unwrap()
        .with_callback(Box::new(log.clone()))
        .with_callback(Box::new(MetricsJsonCallback::new(&metrics_path).unwrap()));
    let mut strategy = RecordingStrategy::default();
    training.run(&mut strategy, examples(8), None).unwrap();

    assert_eq!(*log.0.lock().unwrap(), vec![1, 2, 3, 4]);
    let lines = std::fs::read_to_string(&metrics_path).unwrap();
    let step_lines = lines
        .lines()
        .filter(|l| l.contains("\"learning_rate\""))
        .count();
    assert_eq!(step_lines, 4);
}

#[test]
fn test_empty_training_set_is_an_error() {
    let mut strategy = RecordingStrategy::default();
    let mut training = TrainingLoop::new(args()).unwrap();
    assert!(training.run(&mut strategy, Vec::new(), None).is_err());
    assert!(strategy.steps.is_empty());
}
