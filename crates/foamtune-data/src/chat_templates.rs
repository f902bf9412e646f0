//! Role-turn chat rendering.
//!
//! Two dialects are supported, matching the models the fine-tuning runs
//! target:
//! - ChatML (Qwen): `<|im_start|>role\ncontent<|im_end|>\n`
//! - Llama-2 / CodeLlama-Instruct: `<s>[INST] <<SYS>>\n..\n<</SYS>>\n\n.. [/INST] .. </s>`

use foamtune_core::{FoamTuneError, Result};
use serde::{Deserialize, Serialize};

/// Default system message inserted by the Qwen chat template.
pub const QWEN_DEFAULT_SYSTEM: &str = "You are a helpful assistant.";

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Role: "system", "user", or "assistant"
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new message.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Turn wrapper dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatDialect {
    /// ChatML: `<|im_start|>role\ncontent<|im_end|>\n`
    #[serde(alias = "qwen")]
    ChatMl,
    /// Llama-2: `<s>[INST] <<SYS>>...<</SYS>>\n\nuser [/INST] assistant </s>`
    #[serde(alias = "codellama")]
    Llama2,
}

impl ChatDialect {
    /// Marker appended when a generation prompt is requested.
    ///
    /// Llama-2 has none; its template ignores the flag.
    pub fn generation_prompt(&self) -> Option<&'static str> {
        match self {
            Self::ChatMl => Some("<|im_start|>assistant\n"),
            Self::Llama2 => None,
        }
    }

    /// Render a conversation.
    ///
    /// `default_system` is inserted when the first message is not a system
    /// turn. The generation prompt is appended after the last message
    /// whatever its role.
    pub fn render(
        &self,
        messages: &[Message],
        default_system: Option<&str>,
        add_generation_prompt: bool,
    ) -> Result<String> {
        let needs_system = messages.first().map_or(true, |m| m.role != "system");
        let system = default_system
            .filter(|_| needs_system)
            .map(Message::system);
        let all: Vec<&Message> = system.iter().chain(messages.iter()).collect();

        let mut text = match self {
            Self::ChatMl => format_chatml(&all),
            Self::Llama2 => format_llama2(&all)?,
        };

        if add_generation_prompt {
            if let Some(marker) = self.generation_prompt() {
                text.push_str(marker);
            }
        }
        Ok(text)
    }
}

fn format_chatml(messages: &[&Message]) -> String {
    let mut text = String::new();
    for msg in messages {
        text.push_str("<|im_start|>");
        text.push_str(&msg.role);
        text.push('\n');
        text.push_str(&msg.content);
        text.push_str("<|im_end|>\n");
    }
    text
}

/// Only a leading system turn is honoured; it is folded into the first
/// user turn and that combined content is trimmed once. The remaining
/// turns must alternate user, assistant, user, ...
fn format_llama2(messages: &[&Message]) -> Result<String> {
    let (system, turns) = match messages.split_first() {
        Some((first, rest)) if first.role == "system" => (Some(first.content.as_str()), rest),
        _ => (None, messages),
    };

    let mut text = String::new();
    for (index, msg) in turns.iter().enumerate() {
        let expected = if index % 2 == 0 { "user" } else { "assistant" };
        if msg.role != expected {
            return Err(FoamTuneError::config(format!(
                "llama2 dialect needs alternating user/assistant turns, found '{}' at turn {index}",
                msg.role
            )));
        }

        let content = match system.filter(|_| index == 0) {
            Some(sys) => format!("<<SYS>>\n{sys}\n<</SYS>>\n\n{}", msg.content),
            None => msg.content.clone(),
        };
        if expected == "user" {
            text.push_str("<s>[INST] ");
            text.push_str(content.trim());
            text.push_str(" [/INST]");
        } else {
            text.push(' ');
            text.push_str(content.trim());
            text.push_str(" </s>");
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chatml_inserts_default_system() {
        let messages = vec![Message::user("Hi"), Message::assistant("Hello")];
        let text = ChatDialect::ChatMl
            .render(&messages, Some(QWEN_DEFAULT_SYSTEM), false)
            .unwrap();
        assert_eq!(
            text,
            "<|im_start|>system\nYou are a helpful assistant.<|im_end|>\n\
             <|im_start|>user\nHi<|im_end|>\n\
             <|im_start|>assistant\nHello<|im_end|>\n"
        );
    }

    #[test]
    fn test_chatml_keeps_explicit_system() {
        let messages = vec![Message::system("Write OpenFOAM files."), Message::user("Cavity")];
        let text = ChatDialect::ChatMl
            .render(&messages, Some(QWEN_DEFAULT_SYSTEM), true)
            .unwrap();
        assert!(!text.contains(QWEN_DEFAULT_SYSTEM));
        assert!(text.starts_with("<|im_start|>system\nWrite OpenFOAM files.<|im_end|>\n"));
        assert!(text.ends_with("<|im_end|>\n<|im_start|>assistant\n"));
    }

    #[test]
    fn test_generation_prompt_follows_assistant_turn() {
        let messages = vec![Message::user("q"), Message::assistant("a")];
        let text = ChatDialect::ChatMl.render(&messages, None, true).unwrap();
        assert!(text.ends_with("<|im_start|>assistant\na<|im_end|>\n<|im_start|>assistant\n"));
    }

    #[test]
    fn test_llama2_with_system() {
        let messages = vec![
            Message::system("You write OpenFOAM cases."),
            Message::user("Lid-driven cavity"),
            Message::assistant("FoamFile { }"),
        ];
        let text = ChatDialect::Llama2.render(&messages, None, true).unwrap();
        assert_eq!(
            text,
            "<s>[INST] <<SYS>>\nYou write OpenFOAM cases.\n<</SYS>>\n\nLid-driven cavity [/INST] FoamFile { } </s>"
        );
    }

    #[test]
    fn test_llama2_without_system() {
        let messages = vec![Message::user(" nuTilda for a flat plate "), Message::assistant("0.1")];
        let text = ChatDialect::Llama2.render(&messages, None, false).unwrap();
        assert_eq!(text, "<s>[INST] nuTilda for a flat plate [/INST] 0.1 </s>");
    }

    #[test]
    fn test_llama2_rejects_unknown_role() {
        let messages = vec![Message::new("tool", "x")];
        assert!(ChatDialect::Llama2.render(&messages, None, false).is_err());
    }

    #[test]
    fn test_llama2_trims_combined_first_turn_once() {
        let messages = vec![
            Message::system("You write OpenFOAM cases.\n"),
            Message::user("  Cavity"),
            Message::assistant("x"),
        ];
        let text = ChatDialect::Llama2.render(&messages, None, false).unwrap();
        assert_eq!(
            text,
            "<s>[INST] <<SYS>>\nYou write OpenFOAM cases.\n\n<</SYS>>\n\n  Cavity [/INST] x </s>"
        );
    }

    #[test]
    fn test_llama2_rejects_non_alternating_turns() {
        let out_of_order = vec![Message::assistant("a"), Message::user("u")];
        assert!(matches!(
            ChatDialect::Llama2.render(&out_of_order, None, false),
            Err(FoamTuneError::Configuration(_))
        ));

        let repeated = vec![Message::user("u1"), Message::user("u2")];
        assert!(ChatDialect::Llama2.render(&repeated, None, false).is_err());

        let late_system = vec![
            Message::user("u"),
            Message::assistant("a"),
            Message::system("s"),
        ];
        assert!(ChatDialect::Llama2.render(&late_system, None, false).is_err());
    }

    #[test]
    fn test_llama2_multi_turn() {
        let messages = vec![
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
            Message::assistant("a2"),
        ];
        let text = ChatDialect::Llama2.render(&messages, None, false).unwrap();
        assert_eq!(text, "<s>[INST] q1 [/INST] a1 </s><s>[INST] q2 [/INST] a2 </s>");
    }
}
