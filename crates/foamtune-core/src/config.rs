//! Configuration types for FoamTune.
//!
//! Model, LoRA and training sections are carried through to the external
//! trainer untouched. Only [`TokenizationConfig`] and [`DatasetConfig`] are
//! interpreted by the data pipeline.

use crate::{Dtype, FoamTuneError, Quantization, Result};
use serde::{Deserialize, Serialize};

/// Quantized loading of the base model (bitsandbytes-style settings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationConfig {
    /// Quantization scheme; `none` loads full precision weights.
    #[serde(default)]
    pub scheme: Quantization,

    /// Dtype used for matmuls on dequantized weights.
    #[serde(default)]
    pub compute_dtype: Dtype,

    /// Quantize the quantization constants as well.
    #[serde(default = "default_true")]
    pub double_quant: bool,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            scheme: Quantization::NF4,
            compute_dtype: Dtype::BFloat16,
            double_quant: true,
        }
    }
}

/// Model handle passed to the external trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier (HuggingFace repo ID or local path).
    pub model_id: String,

    /// Name under which the adapted model is saved.
    #[serde(default = "default_new_model")]
    pub new_model: String,

    /// Quantized loading settings.
    #[serde(default)]
    pub quantization: QuantizationConfig,

    /// Trust remote code (for custom model implementations).
    #[serde(default)]
    pub trust_remote_code: bool,

    /// Revision/branch to use.
    #[serde(default)]
    pub revision: Option<String>,

    /// Disable the KV cache while training.
    #[serde(default = "default_true")]
    pub disable_cache: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            new_model: default_new_model(),
            quantization: QuantizationConfig::default(),
            trust_remote_code: false,
            revision: None,
            disable_cache: true,
        }
    }
}

/// Bias handling mode for LoRA layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoraBias {
    /// Do not train any bias parameters.
    #[default]
    None,
    /// Train all bias parameters.
    All,
    /// Train only bias parameters associated with LoRA layers.
    LoraOnly,
}

/// LoRA configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraConfig {
    /// LoRA rank (r).
    #[serde(default = "default_lora_r")]
    pub r: usize,

    /// LoRA alpha (scaling factor).
    #[serde(default = "default_lora_alpha")]
    pub alpha: f32,

    /// Dropout probability.
    #[serde(default = "default_lora_dropout")]
    pub dropout: f32,

    /// Target modules; `["all-linear"]` targets every linear layer.
    #[serde(default)]
    pub target_modules: Vec<String>,

    /// Bias handling mode.
    #[serde(default)]
    pub bias: LoraBias,

    /// PEFT task type.
    #[serde(default = "default_task_type")]
    pub task_type: String,
}

impl Default for LoraConfig {
    fn default() -> Self {
        Self {
            r: default_lora_r(),
            alpha: default_lora_alpha(),
            dropout: default_lora_dropout(),
            target_modules: Vec::new(),
            bias: LoraBias::default(),
            task_type: default_task_type(),
        }
    }
}

impl LoraConfig {
    /// Compute the LoRA scaling factor.
    #[must_use]
    pub fn scaling(&self) -> f32 {
        self.alpha / self.r as f32
    }
}

/// Learning rate scheduler type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LrSchedulerType {
    /// Constant learning rate; warmup is ignored.
    #[default]
    Constant,
    /// Linear warmup, then constant.
    ConstantWithWarmup,
    /// Linear warmup, then linear decay to zero.
    Linear,
    /// Linear warmup, then cosine decay to zero.
    Cosine,
}

/// Optimizer requested from the external trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OptimizerType {
    /// Plain AdamW.
    #[serde(rename = "adamw_torch")]
    AdamW,
    /// Paged AdamW with 32-bit state.
    #[default]
    #[serde(rename = "paged_adamw_32bit")]
    PagedAdamW32Bit,
    /// Paged AdamW with 8-bit state.
    #[serde(rename = "paged_adamw_8bit")]
    PagedAdamW8Bit,
    /// Adafactor.
    #[serde(rename = "adafactor")]
    Adafactor,
}

/// Hyperparameters handed to the supervised fine-tuning trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArguments {
    /// Output directory for checkpoints and logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Number of training epochs.
    #[serde(default = "default_one")]
    pub num_train_epochs: usize,

    /// Batch size per device for training.
    #[serde(default = "default_batch_size")]
    pub per_device_train_batch_size: usize,

    /// Batch size per device for evaluation.
    #[serde(default = "default_batch_size")]
    pub per_device_eval_batch_size: usize,

    /// Gradient accumulation steps.
    #[serde(default = "default_batch_size")]
    pub gradient_accumulation_steps: usize,

    /// Optimizer name.
    #[serde(default)]
    pub optim: OptimizerType,

    /// Save a checkpoint every N optimizer steps.
    #[serde(default = "default_save_steps")]
    pub save_steps: usize,

    /// Log every N optimizer steps.
    #[serde(default = "default_logging_steps")]
    pub logging_steps: usize,

    /// Learning rate.
    #[serde(default = "default_lr")]
    pub learning_rate: f64,

    /// Weight decay.
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,

    /// Mixed precision in fp16.
    #[serde(default)]
    pub fp16: bool,

    /// Mixed precision in bf16.
    #[serde(default)]
    pub bf16: bool,

    /// Maximum gradient norm for clipping.
    #[serde(default = "default_grad_clip")]
    pub max_grad_norm: f64,

    /// Maximum optimizer steps; `None` derives the count from epochs.
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// Fraction of total steps spent warming up.
    #[serde(default = "default_warmup_ratio")]
    pub warmup_ratio: f64,

    /// Batch examples of similar length together.
    #[serde(default)]
    pub group_by_length: bool,

    /// Learning rate scheduler type.
    #[serde(default)]
    pub lr_scheduler_type: LrSchedulerType,

    /// Metric sinks, e.g. `tensorboard`.
    #[serde(default = "default_report_to")]
    pub report_to: Vec<String>,

    /// Pack several examples into one sequence.
    #[serde(default)]
    pub packing: bool,

    /// Maximum sequence length seen by the trainer.
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Random seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingArguments {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            num_train_epochs: default_one(),
            per_device_train_batch_size: default_batch_size(),
            per_device_eval_batch_size: default_batch_size(),
            gradient_accumulation_steps: default_batch_size(),
            optim: OptimizerType::default(),
            save_steps: default_save_steps(),
            logging_steps: default_logging_steps(),
            learning_rate: default_lr(),
            weight_decay: default_weight_decay(),
            fp16: false,
            bf16: false,
            max_grad_norm: default_grad_clip(),
            max_steps: None,
            warmup_ratio: default_warmup_ratio(),
            group_by_length: false,
            lr_scheduler_type: LrSchedulerType::default(),
            report_to: default_report_to(),
            packing: false,
            max_length: None,
            seed: default_seed(),
        }
    }
}

impl TrainingArguments {
    /// Check the values the training loop relies on.
    pub fn validate(&self) -> Result<()> {
        if self.per_device_train_batch_size == 0 {
            return Err(FoamTuneError::config(
                "per_device_train_batch_size must be at least 1",
            ));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(FoamTuneError::config(
                "gradient_accumulation_steps must be at least 1",
            ));
        }
        if self.fp16 && self.bf16 {
            return Err(FoamTuneError::config("fp16 and bf16 are mutually exclusive"));
        }
        if !(0.0..1.0).contains(&self.warmup_ratio) {
            return Err(FoamTuneError::config(format!(
                "warmup_ratio must be in [0, 1), got {}",
                self.warmup_ratio
            )));
        }
        Ok(())
    }
}

/// Where the pad token id comes from.
///
/// Decoder-only vocabularies usually ship without a pad token, so the
/// choice of alias has to be spelled out in the run configuration.
///
/// Written as `eos`, `{ id: 0 }` or `{ token: "<|endoftext|>" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PadTokenRepr", into = "PadTokenRepr")]
pub enum PadTokenSource {
    /// A literal token id.
    Id(u32),
    /// A token string looked up in the vocabulary.
    Token(String),
    /// Alias the pad token to the end-of-sequence token.
    Eos,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PadTokenRepr {
    Keyword(PadKeyword),
    Id { id: u32 },
    Token { token: String },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PadKeyword {
    Eos,
}

impl From<PadTokenRepr> for PadTokenSource {
    fn from(repr: PadTokenRepr) -> Self {
        match repr {
            PadTokenRepr::Keyword(PadKeyword::Eos) => Self::Eos,
            PadTokenRepr::Id { id } => Self::Id(id),
            PadTokenRepr::Token { token } => Self::Token(token),
        }
    }
}

impl From<PadTokenSource> for PadTokenRepr {
    fn from(source: PadTokenSource) -> Self {
        match source {
            PadTokenSource::Eos => Self::Keyword(PadKeyword::Eos),
            PadTokenSource::Id(id) => Self::Id { id },
            PadTokenSource::Token(token) => Self::Token { token },
        }
    }
}

/// Which end of an over-long sequence is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TruncationSide {
    /// Drop tokens from the end, keeping the head of the text.
    #[default]
    Right,
    /// Drop tokens from the start, keeping the tail of the text.
    Left,
}

/// Which end of a short sequence receives padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaddingSide {
    /// Pad after the tokens.
    #[default]
    Right,
    /// Pad before the tokens.
    Left,
}

/// Tokenization and label masking settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizationConfig {
    /// Every example is padded or truncated to exactly this many tokens.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Pad token id source.
    pub pad_token: PadTokenSource,

    /// Truncation side.
    #[serde(default)]
    pub truncation_side: TruncationSide,

    /// Padding side.
    #[serde(default)]
    pub padding_side: PaddingSide,

    /// Run the tokenizer's post-processor (BOS/EOS insertion).
    #[serde(default = "default_true")]
    pub add_special_tokens: bool,
}

impl Default for TokenizationConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            pad_token: PadTokenSource::Eos,
            truncation_side: TruncationSide::default(),
            padding_side: PaddingSide::default(),
            add_special_tokens: true,
        }
    }
}

impl TokenizationConfig {
    /// Reject settings the masker cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(FoamTuneError::config("max_length must be greater than 0"));
        }
        Ok(())
    }
}

/// Dataset source and shaping configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Local file (`.jsonl`, `.json`, `.parquet`) or hub id (`owner/name`).
    pub source: String,

    /// Split to load from the hub.
    #[serde(default = "default_split")]
    pub split: String,

    /// Separate evaluation split on the hub, if the dataset ships one.
    #[serde(default)]
    pub eval_split: Option<String>,

    /// Fraction of records held out for evaluation when no eval split exists.
    #[serde(default)]
    pub test_ratio: Option<f64>,

    /// Shuffle records before splitting.
    #[serde(default)]
    pub shuffle: bool,

    /// Seed for shuffling and splitting.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Keep only the first N records.
    #[serde(default)]
    pub max_records: Option<usize>,

    /// Columns expected upstream of the projection and removed by it.
    #[serde(default)]
    pub remove_columns: Vec<String>,

    /// Keep the attention mask alongside `input_ids` and `labels`.
    #[serde(default)]
    pub keep_attention_mask: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            split: default_split(),
            eval_split: None,
            test_ratio: None,
            shuffle: false,
            seed: default_seed(),
            max_records: None,
            remove_columns: Vec::new(),
            keep_attention_mask: false,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_new_model() -> String {
    "foam-lora".into()
}
fn default_lora_r() -> usize {
    32
}
fn default_lora_alpha() -> f32 {
    16.0
}
fn default_lora_dropout() -> f32 {
    0.1
}
fn default_task_type() -> String {
    "CAUSAL_LM".into()
}
fn default_output_dir() -> String {
    "./results".into()
}
fn default_one() -> usize {
    1
}
fn default_batch_size() -> usize {
    2
}
fn default_save_steps() -> usize {
    250
}
fn default_logging_steps() -> usize {
    50
}
fn default_lr() -> f64 {
    2e-4
}
fn default_weight_decay() -> f64 {
    0.001
}
fn default_grad_clip() -> f64 {
    0.3
}
fn default_warmup_ratio() -> f64 {
    0.03
}
fn default_report_to() -> Vec<String> {
    vec!["tensorboard".into()]
}
fn default_seed() -> u64 {
    42
}
fn default_max_length() -> usize {
    1024
}
fn default_split() -> String {
    "train".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_arguments_defaults_from_empty_yaml() {
        let args: TrainingArguments = serde_yaml::from_str("{}").unwrap();
        assert_eq!(args, TrainingArguments::default());
        assert_eq!(args.optim, OptimizerType::PagedAdamW32Bit);
        assert_eq!(args.lr_scheduler_type, LrSchedulerType::Constant);
        assert!(args.max_steps.is_none());
    }

    #[test]
    fn test_pad_token_source_yaml_forms() {
        let eos: PadTokenSource = serde_yaml::from_str("eos").unwrap();
        assert_eq!(eos, PadTokenSource::Eos);

        let token: PadTokenSource = serde_yaml::from_str("token: <|endoftext|>").unwrap();
        assert_eq!(token, PadTokenSource::Token("<|endoftext|>".into()));

        let id: PadTokenSource = serde_yaml::from_str("id: 0").unwrap();
        assert_eq!(id, PadTokenSource::Id(0));

        let nested: TokenizationConfig =
            serde_yaml::from_str("pad_token: { token: \"<|endoftext|>\" }").unwrap();
        assert_eq!(nested.pad_token, PadTokenSource::Token("<|endoftext|>".into()));
    }

    #[test]
    fn test_pad_token_source_yaml_round_trip() {
        for source in [
            PadTokenSource::Eos,
            PadTokenSource::Id(151643),
            PadTokenSource::Token("<|endoftext|>".into()),
        ] {
            let config = TokenizationConfig {
                pad_token: source.clone(),
                ..Default::default()
            };
            let yaml = serde_yaml::to_string(&config).unwrap();
            assert!(!yaml.contains('!'), "tagged output: {yaml}");
            let back: TokenizationConfig = serde_yaml::from_str(&yaml).unwrap();
            assert_eq!(back.pad_token, source);
        }
        assert!(serde_yaml::from_str::<PadTokenSource>("bos").is_err());
    }

    #[test]
    fn test_tokenization_rejects_zero_max_length() {
        let config = TokenizationConfig {
            max_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FoamTuneError::Configuration(_))
        ));
    }

    #[test]
    fn test_training_arguments_validation() {
        let mut args = TrainingArguments::default();
        assert!(args.validate().is_ok());

        args.fp16 = true;
        args.bf16 = true;
        assert!(args.validate().is_err());

        args.bf16 = false;
        args.gradient_accumulation_steps = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_optimizer_names_match_trainer_strings() {
        let optim: OptimizerType = serde_yaml::from_str("paged_adamw_32bit").unwrap();
        assert_eq!(optim, OptimizerType::PagedAdamW32Bit);
        assert_eq!(
            serde_json::to_string(&OptimizerType::AdamW).unwrap(),
            "\"adamw_torch\""
        );
    }

    #[test]
    fn test_lora_scaling() {
        let lora = LoraConfig {
            r: 64,
            alpha: 16.0,
            ..Default::default()
        };
        assert!((lora.scaling() - 0.25).abs() < f32::EPSILON);
    }
}
