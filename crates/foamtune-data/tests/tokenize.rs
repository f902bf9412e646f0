//! End-to-end tokenization with a real `tokenizers` vocabulary.

use foamtune_core::{PadTokenSource, TokenizationConfig, TruncationSide};
use foamtune_data::{
    ExampleTokenizer, PreparePipeline, Projection, PromptTemplate, Record, TextEncoder, Tokenizer,
    IGNORE_INDEX,
};

const WORDS: &[&str] = &[
    "set", "up", "a", "pipe", "flow", "case", "with", "laminar", "inlet", "velocity",
];

fn word_level_tokenizer() -> Tokenizer {
    let mut vocab = serde_json::Map::new();
    vocab.insert("<pad>".into(), 0.into());
    vocab.insert("</s>".into(), 1.into());
    vocab.insert("<unk>".into(), 2.into());
    for (i, word) in WORDS.iter().enumerate() {
        vocab.insert((*word).into(), (i + 3).into());
    }
    let special = |id: u32, content: &str| {
        serde_json::json!({
            "id": id,
            "content": content,
            "single_word": false,
            "lstrip": false,
            "rstrip": false,
            "normalized": false,
            "special": true
        })
    };
    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [special(0, "<pad>"), special(1, "</s>")],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "<unk>" }
    });
    Tokenizer::from_bytes(json.to_string().as_bytes()).unwrap()
}

fn config(max_length: usize) -> TokenizationConfig {
    TokenizationConfig {
        max_length,
        pad_token: PadTokenSource::Token("<pad>".into()),
        ..Default::default()
    }
}

#[test]
fn test_every_length_is_padded_or_truncated_to_max_length() {
    let tokenizer = ExampleTokenizer::new(word_level_tokenizer(), config(6)).unwrap();
    for n in 0..=WORDS.len() {
        let text = WORDS[..n].join(" ");
        let example = tokenizer.tokenize(&text).unwrap();
        assert_eq!(example.input_ids.len(), 6, "text: {text:?}");
        assert_eq!(example.labels.len(), 6);
        for (id, label) in example.input_ids.iter().zip(&example.labels) {
            assert_eq!(*label == IGNORE_INDEX, *id == tokenizer.pad_token_id());
        }
    }
}

#[test]
fn test_decoding_recovers_a_prefix() {
    let tokenizer = ExampleTokenizer::new(word_level_tokenizer(), config(4)).unwrap();
    let text = "set up a pipe flow case";
    let example = tokenizer.tokenize(text).unwrap();

    let real: Vec<u32> = example
        .input_ids
        .iter()
        .copied()
        .filter(|&id| id != tokenizer.pad_token_id())
        .collect();
    let decoded = tokenizer.encoder().decode(&real).unwrap();
    assert_eq!(decoded, "set up a pipe");
    assert!(text.starts_with(&decoded));

    let short = tokenizer.tokenize("laminar inlet").unwrap();
    let real: Vec<u32> = short.input_ids.into_iter().filter(|&id| id != 0).collect();
    assert_eq!(tokenizer.encoder().decode(&real).unwrap(), "laminar inlet");
}

#[test]
fn test_left_truncation_keeps_tail() {
    let tokenizer = ExampleTokenizer::new(
        word_level_tokenizer(),
        TokenizationConfig {
            truncation_side: TruncationSide::Left,
            ..config(2)
        },
    )
    .unwrap();
    let example = tokenizer.tokenize("pipe flow case").unwrap();
    assert_eq!(
        tokenizer.encoder().decode(&example.input_ids).unwrap(),
        "flow case"
    );
}

#[test]
fn test_eos_alias_and_unknown_pad() {
    let tokenizer = word_level_tokenizer();
    assert_eq!(tokenizer.eos_token_id(), Some(1));

    let err = ExampleTokenizer::new(
        word_level_tokenizer(),
        TokenizationConfig {
            pad_token: PadTokenSource::Token("<|endoftext|>".into()),
            ..config(8)
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("<|endoftext|>"));
}

#[test]
fn test_pipeline_with_role_turn_template() {
    let yaml = r#"
style: role_turn
dialect: chat_ml
turns:
  - { role: user, field: question }
  - { role: assistant, field: answer }
"#;
    let template: PromptTemplate = serde_yaml::from_str(yaml).unwrap();
    let tokenizer = ExampleTokenizer::new(word_level_tokenizer(), config(12)).unwrap();
    let pipeline = PreparePipeline::new(
        template,
        tokenizer,
        Projection::new(vec!["question".into(), "answer".into()], true),
    );

    let records = vec![
        Record::from_pairs([("question", "pipe flow"), ("answer", "laminar")]),
        Record::from_pairs([("question", "case"), ("answer", "set up")]),
    ];
    let examples = pipeline.run(&records).unwrap();
    assert_eq!(examples.len(), 2);
    for example in &examples {
        assert_eq!(example.len(), 12);
        assert_eq!(example.attention_mask.len(), 12);
    }
}
