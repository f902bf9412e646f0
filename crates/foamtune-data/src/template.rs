//! Prompt templates that turn a [`Record`] into one training string.
//!
//! Each template is a fixed contract; formatting is pure and fails with
//! [`FoamTuneError::MissingField`] rather than substituting empty text.

use crate::chat_templates::{ChatDialect, Message, QWEN_DEFAULT_SYSTEM};
use crate::Record;
use foamtune_core::{FoamTuneError, Result};
use serde::{Deserialize, Serialize};

/// A formatted prompt + response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedExample {
    /// Fully rendered text.
    pub text: String,
}

/// How output fields follow the instruction block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStyle {
    /// `"{name}:\n{value}\n"` per field, separated by a blank line.
    #[default]
    Labelled,
    /// Values only, joined by a blank line.
    Bare,
}

/// `[INST]`-tag template: a description plus output sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionTemplate {
    /// Field holding the natural-language description.
    pub description_field: String,
    /// Fields rendered after the instruction, in order.
    pub output_fields: Vec<String>,
    /// Section layout.
    #[serde(default)]
    pub sections: SectionStyle,
}

impl InstructionTemplate {
    /// Render a record.
    pub fn format(&self, record: &Record) -> Result<String> {
        let description = record.require(&self.description_field)?;
        let values = self
            .output_fields
            .iter()
            .map(|field| record.require(field).map(|value| (field.as_str(), value)))
            .collect::<Result<Vec<_>>>()?;

        let mut text = format!("<s>[INST] {description}\n\n[/INST] ");
        match self.sections {
            SectionStyle::Labelled => {
                text.push('\n');
                for (i, (name, value)) in values.iter().enumerate() {
                    if i > 0 {
                        text.push('\n');
                    }
                    text.push_str(name);
                    text.push_str(":\n");
                    text.push_str(value);
                    text.push('\n');
                }
            }
            SectionStyle::Bare => {
                let bodies: Vec<&str> = values.iter().map(|(_, value)| *value).collect();
                text.push_str(&bodies.join("\n\n"));
            }
        }
        Ok(text)
    }
}

/// One turn of a role-turn template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSpec {
    /// Role name (`system`, `user`, `assistant`).
    pub role: String,
    /// Record field providing the turn content.
    pub field: String,
}

impl TurnSpec {
    /// Create a turn spec.
    pub fn new(role: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            field: field.into(),
        }
    }
}

/// Chat template built from record fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTurnTemplate {
    /// Turns in order.
    pub turns: Vec<TurnSpec>,
    /// Turn wrapper dialect.
    pub dialect: ChatDialect,
    /// System turn inserted when the first turn is not `system`.
    #[serde(default)]
    pub default_system: Option<String>,
    /// Append the dialect's generation prompt after the last turn.
    #[serde(default)]
    pub add_generation_prompt: bool,
}

impl RoleTurnTemplate {
    /// Render a record.
    pub fn format(&self, record: &Record) -> Result<String> {
        let messages = self
            .turns
            .iter()
            .map(|turn| record.require(&turn.field).map(|content| Message::new(&turn.role, content)))
            .collect::<Result<Vec<_>>>()?;
        self.dialect.render(
            &messages,
            self.default_system.as_deref(),
            self.add_generation_prompt,
        )
    }
}

/// Any supported prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum PromptTemplate {
    /// `[INST]`-tag instruction template.
    Instruction(InstructionTemplate),
    /// Role-turn chat template.
    RoleTurn(RoleTurnTemplate),
}

/// Names accepted by [`PromptTemplate::preset`].
pub const PRESET_NAMES: &[&str] = &[
    "nl2foam",
    "nl2foam-bare",
    "nutilda",
    "formatted-foam",
    "qwen-foam",
];

impl PromptTemplate {
    /// Look up a built-in template by name.
    pub fn preset(name: &str) -> Result<Self> {
        let template = match name {
            "nl2foam" => Self::Instruction(InstructionTemplate {
                description_field: "description".into(),
                output_fields: vec!["foamfiles".into(), "allrun".into()],
                sections: SectionStyle::Labelled,
            }),
            "nl2foam-bare" => Self::Instruction(InstructionTemplate {
                description_field: "description".into(),
                output_fields: vec!["foamfiles".into(), "allrun".into()],
                sections: SectionStyle::Bare,
            }),
            "nutilda" => Self::RoleTurn(RoleTurnTemplate {
                turns: vec![TurnSpec::new("user", "text"), TurnSpec::new("assistant", "0/nuTilda")],
                dialect: ChatDialect::Llama2,
                default_system: None,
                add_generation_prompt: true,
            }),
            "formatted-foam" => Self::RoleTurn(RoleTurnTemplate {
                turns: structured_turns(),
                dialect: ChatDialect::Llama2,
                default_system: None,
                add_generation_prompt: true,
            }),
            "qwen-foam" => Self::RoleTurn(RoleTurnTemplate {
                turns: structured_turns(),
                dialect: ChatDialect::ChatMl,
                default_system: Some(QWEN_DEFAULT_SYSTEM.into()),
                add_generation_prompt: true,
            }),
            other => {
                return Err(FoamTuneError::config(format!(
                    "unknown template preset '{other}'; available: {}",
                    PRESET_NAMES.join(", ")
                )))
            }
        };
        Ok(template)
    }

    /// Every field the template reads, in render order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        match self {
            Self::Instruction(t) => std::iter::once(t.description_field.as_str())
                .chain(t.output_fields.iter().map(String::as_str))
                .collect(),
            Self::RoleTurn(t) => t.turns.iter().map(|turn| turn.field.as_str()).collect(),
        }
    }

    /// Render one record.
    pub fn format(&self, record: &Record) -> Result<FormattedExample> {
        let text = match self {
            Self::Instruction(t) => t.format(record)?,
            Self::RoleTurn(t) => t.format(record)?,
        };
        Ok(FormattedExample { text })
    }
}

fn structured_turns() -> Vec<TurnSpec> {
    vec![
        TurnSpec::new("system", "system_prompt"),
        TurnSpec::new("user", "usr_prompt"),
        TurnSpec::new("assistant", "code_content"),
    ]
}
