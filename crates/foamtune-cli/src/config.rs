//! Run configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use foamtune_core::{
    DatasetConfig, LoraConfig, ModelConfig, TokenizationConfig, TrainingArguments,
};
use foamtune_data::PromptTemplate;
use serde::{Deserialize, Serialize};

/// Combined configuration for a fine-tuning run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Model configuration.
    #[serde(default)]
    pub model: ModelConfig,

    /// LoRA configuration.
    #[serde(default)]
    pub lora: LoraConfig,

    /// Trainer hyperparameters.
    #[serde(default)]
    pub training: TrainingArguments,

    /// Dataset configuration.
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Prompt template.
    #[serde(default)]
    pub template: TemplateChoice,

    /// Tokenization and label masking.
    #[serde(default)]
    pub tokenization: TokenizationConfig,

    /// Hub access.
    #[serde(default)]
    pub hub: HubSettings,
}

/// A preset name or an inline template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateChoice {
    /// One of [`foamtune_data::PRESET_NAMES`].
    Preset(String),
    /// A full template definition.
    Inline(PromptTemplate),
}

impl Default for TemplateChoice {
    fn default() -> Self {
        Self::Preset("nl2foam".into())
    }
}

impl TemplateChoice {
    /// Resolve to a concrete template.
    pub fn resolve(&self) -> anyhow::Result<PromptTemplate> {
        match self {
            Self::Preset(name) => Ok(PromptTemplate::preset(name)?),
            Self::Inline(template) => Ok(template.clone()),
        }
    }
}

/// Hub token and cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSettings {
    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Cache directory override.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            cache_dir: None,
        }
    }
}

fn default_token_env() -> String {
    "HF_TOKEN".into()
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub dataset: Option<String>,
    pub template: Option<String>,
    pub max_length: Option<usize>,
    pub max_records: Option<usize>,
    pub output_dir: Option<String>,
}

impl RunConfig {
    /// Parse a YAML configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Load `path` if given, otherwise start from defaults, then apply
    /// command-line overrides.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(model) = &overrides.model {
            self.model.model_id = model.clone();
        }
        if let Some(dataset) = &overrides.dataset {
            self.dataset.source = dataset.clone();
        }
        if let Some(template) = &overrides.template {
            self.template = TemplateChoice::Preset(template.clone());
        }
        if let Some(max_length) = overrides.max_length {
            self.tokenization.max_length = max_length;
            self.training.max_length = Some(max_length);
        }
        if let Some(max_records) = overrides.max_records {
            self.dataset.max_records = Some(max_records);
        }
        if let Some(output_dir) = &overrides.output_dir {
            self.training.output_dir = output_dir.clone();
        }
    }

    /// Starting point written by `foamtune init`.
    pub fn sample() -> Self {
        Self {
            model: ModelConfig {
                model_id: "codellama/CodeLlama-7b-Instruct-hf".to_string(),
                ..Default::default()
            },
            dataset: DatasetConfig {
                source: "./data/train.jsonl".to_string(),
                test_ratio: Some(0.05),
                shuffle: true,
                ..Default::default()
            },
            template: TemplateChoice::Preset("nl2foam".to_string()),
            ..Default::default()
        }
    }

    /// Check the fields every command needs.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dataset.source.trim().is_empty() {
            anyhow::bail!("Dataset source is required. Use --dataset or set dataset.source.");
        }
        self.tokenization.validate()?;
        self.training.validate()?;
        if let Some(ratio) = self.dataset.test_ratio {
            if self.dataset.eval_split.is_some() {
                anyhow::bail!("dataset.test_ratio ({ratio}) and dataset.eval_split are exclusive");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foamtune_core::{OptimizerType, PadTokenSource, Quantization};

    const PRESETS: &[(&str, &str)] = &[
        ("nl2foam.yaml", include_str!("../../../configs/nl2foam.yaml")),
        ("llama_real.yaml", include_str!("../../../configs/llama_real.yaml")),
        ("llama_nutilda.yaml", include_str!("../../../configs/llama_nutilda.yaml")),
        ("qwen.yaml", include_str!("../../../configs/qwen.yaml")),
    ];

    #[test]
    fn test_presets_parse_and_validate() {
        for (name, yaml) in PRESETS {
            let config: RunConfig =
                serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("{name}: {e}"));
            config.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
            config.template.resolve().unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[test]
    fn test_llama_real_values() {
        let config: RunConfig = serde_yaml::from_str(PRESETS[1].1).unwrap();
        assert_eq!(config.model.model_id, "codellama/CodeLlama-7b-Instruct-hf");
        assert_eq!(config.model.quantization.scheme, Quantization::NF4);
        assert_eq!(config.tokenization.max_length, 4096);
        assert_eq!(config.tokenization.pad_token, PadTokenSource::Eos);
        assert_eq!(config.dataset.test_ratio, Some(0.05));
        assert_eq!(config.training.optim, OptimizerType::PagedAdamW32Bit);
        assert!(config.training.bf16);
        assert!(config.training.group_by_length);
        assert_eq!(config.template, TemplateChoice::Preset("formatted-foam".into()));
    }

    #[test]
    fn test_inline_template() {
        let yaml = r#"
dataset:
  source: data/train.jsonl
template:
  style: instruction
  description_field: prompt
  output_fields: [answer]
tokenization:
  pad_token: { id: 0 }
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.template.resolve().unwrap(),
            PromptTemplate::Instruction(_)
        ));
        assert_eq!(config.hub.token_env, "HF_TOKEN");
    }

    #[test]
    fn test_overrides_win() {
        let mut config = RunConfig::default();
        config.apply(&Overrides {
            model: Some("Qwen/Qwen-7B".into()),
            dataset: Some("YYgroup/NL2FOAM".into()),
            template: Some("qwen-foam".into()),
            max_length: Some(1028),
            ..Default::default()
        });
        assert_eq!(config.model.model_id, "Qwen/Qwen-7B");
        assert_eq!(config.dataset.source, "YYgroup/NL2FOAM");
        assert_eq!(config.tokenization.max_length, 1028);
        assert_eq!(config.training.max_length, Some(1028));
        config.validate().unwrap();
    }

    #[test]
    fn test_sample_config_round_trips() {
        let mut sample = RunConfig::sample();
        sample.tokenization.pad_token = PadTokenSource::Token("<|endoftext|>".into());

        let yaml = serde_yaml::to_string(&sample).unwrap();
        let parsed: RunConfig = serde_yaml::from_str(&yaml).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.tokenization, sample.tokenization);
        assert_eq!(parsed.template, sample.template);
        assert_eq!(parsed.dataset.test_ratio, Some(0.05));
    }

    #[test]
    fn test_qwen_pad_token() {
        let config: RunConfig = serde_yaml::from_str(PRESETS[3].1).unwrap();
        assert_eq!(
            config.tokenization.pad_token,
            PadTokenSource::Token("<|endoftext|>".into())
        );
        assert_eq!(config.dataset.eval_split.as_deref(), Some("test"));
    }

    #[test]
    fn test_missing_dataset_rejected() {
        assert!(RunConfig::default().validate().is_err());
    }
}
