//! Fixed-length tokenization and padding label masks.

use crate::TextEncoder;
use foamtune_core::{
    FoamTuneError, PadTokenSource, PaddingSide, Result, TokenizationConfig, TruncationSide,
};
use serde::{Deserialize, Serialize};

/// Label value excluded from the loss.
pub const IGNORE_INDEX: i64 = -100;

/// A model-ready training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedExample {
    /// Token ids, exactly `max_length` long.
    pub input_ids: Vec<u32>,
    /// `input_ids` with pad positions replaced by [`IGNORE_INDEX`].
    pub labels: Vec<i64>,
    /// 1 for tokenizer output, 0 for padding. Empty once projected away.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attention_mask: Vec<u32>,
}

impl TokenizedExample {
    /// Sequence length.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    /// Whether the example holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of positions that contribute to the loss.
    pub fn num_label_tokens(&self) -> usize {
        self.labels.iter().filter(|&&label| label != IGNORE_INDEX).count()
    }
}

/// Resolve the configured pad token to an id.
pub fn resolve_pad_token_id<E: TextEncoder + ?Sized>(
    encoder: &E,
    source: &PadTokenSource,
) -> Result<u32> {
    match source {
        PadTokenSource::Id(id) => Ok(*id),
        PadTokenSource::Token(token) => encoder.token_to_id(token).ok_or_else(|| {
            FoamTuneError::config(format!("pad token '{token}' is not in the vocabulary"))
        }),
        PadTokenSource::Eos => encoder.eos_token_id().ok_or_else(|| {
            FoamTuneError::config("pad token aliased to EOS, but the vocabulary has no EOS token")
        }),
    }
}

/// Pad or truncate `ids` to exactly `max_length`.
///
/// Returns the fixed-length ids and the matching attention mask.
pub fn pad_or_truncate(
    mut ids: Vec<u32>,
    max_length: usize,
    pad_token_id: u32,
    truncation: TruncationSide,
    padding: PaddingSide,
) -> (Vec<u32>, Vec<u32>) {
    if ids.len() > max_length {
        match truncation {
            TruncationSide::Right => ids.truncate(max_length),
            TruncationSide::Left => {
                ids.drain(..ids.len() - max_length);
            }
        }
    }

    let real = ids.len();
    let pad = max_length - real;
    let mut mask = Vec::with_capacity(max_length);
    match padding {
        PaddingSide::Right => {
            ids.resize(max_length, pad_token_id);
            mask.resize(real, 1);
            mask.resize(max_length, 0);
        }
        PaddingSide::Left => {
            ids.splice(0..0, std::iter::repeat(pad_token_id).take(pad));
            mask.resize(pad, 0);
            mask.resize(max_length, 1);
        }
    }
    (ids, mask)
}

/// Copy `input_ids` into labels, masking every pad position.
///
/// Tokens equal to the pad id are masked wherever they occur, including
/// genuine EOS tokens when pad is aliased to EOS.
pub fn mask_padding(input_ids: &[u32], pad_token_id: u32) -> Vec<i64> {
    input_ids
        .iter()
        .map(|&id| {
            if id == pad_token_id {
                IGNORE_INDEX
            } else {
                i64::from(id)
            }
        })
        .collect()
}

/// Tokenizer bound to a resolved pad id and length policy.
#[derive(Debug)]
pub struct ExampleTokenizer<E> {
    encoder: E,
    pad_token_id: u32,
    config: TokenizationConfig,
}

impl<E: TextEncoder> ExampleTokenizer<E> {
    /// Validate the configuration and resolve the pad token.
    pub fn new(encoder: E, config: TokenizationConfig) -> Result<Self> {
        config.validate()?;
        let pad_token_id = resolve_pad_token_id(&encoder, &config.pad_token)?;
        tracing::debug!(
            pad_token_id,
            max_length = config.max_length,
            "Resolved example tokenizer"
        );
        Ok(Self {
            encoder,
            pad_token_id,
            config,
        })
    }

    /// Resolved pad token id.
    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    /// Fixed output length.
    pub fn max_length(&self) -> usize {
        self.config.max_length
    }

    /// The wrapped encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Tokenize one formatted text into a fixed-length example.
    pub fn tokenize(&self, text: &str) -> Result<TokenizedExample> {
        let ids = self.encoder.encode(text, self.config.add_special_tokens)?;
        let (input_ids, attention_mask) = pad_or_truncate(
            ids,
            self.config.max_length,
            self.pad_token_id,
            self.config.truncation_side,
            self.config.padding_side,
        );
        let labels = mask_padding(&input_ids, self.pad_token_id);
        Ok(TokenizedExample {
            input_ids,
            labels,
            attention_mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encoder that returns a fixed id sequence.
    #[derive(Debug)]
    struct FixedEncoder {
        ids: Vec<u32>,
        eos: Option<u32>,
    }

    impl TextEncoder for FixedEncoder {
        fn encode(&self, _text: &str, _add_special_tokens: bool) -> Result<Vec<u32>> {
            Ok(self.ids.clone())
        }

        fn token_to_id(&self, token: &str) -> Option<u32> {
            (token == "<pad>").then_some(0)
        }

        fn eos_token_id(&self) -> Option<u32> {
            self.eos
        }
    }

    fn config(max_length: usize, pad_token: PadTokenSource) -> TokenizationConfig {
        TokenizationConfig {
            max_length,
            pad_token,
            ..Default::default()
        }
    }

    #[test]
    fn test_padding_positions_masked() {
        let encoder = FixedEncoder {
            ids: vec![5, 9, 2],
            eos: Some(2),
        };
        let tokenizer = ExampleTokenizer::new(encoder, config(8, PadTokenSource::Id(0))).unwrap();
        let example = tokenizer.tokenize("ignored").unwrap();

        assert_eq!(example.input_ids, vec![5, 9, 2, 0, 0, 0, 0, 0]);
        assert_eq!(example.labels, vec![5, 9, 2, -100, -100, -100, -100, -100]);
        assert_eq!(example.attention_mask, vec![1, 1, 1, 0, 0, 0, 0, 0]);
        assert_eq!(example.num_label_tokens(), 3);
    }

    #[test]
    fn test_eos_alias_masks_real_eos() {
        let encoder = FixedEncoder {
            ids: vec![5, 9, 2],
            eos: Some(2),
        };
        let tokenizer = ExampleTokenizer::new(encoder, config(5, PadTokenSource::Eos)).unwrap();
        let example = tokenizer.tokenize("ignored").unwrap();

        assert_eq!(example.input_ids, vec![5, 9, 2, 2, 2]);
        assert_eq!(example.labels, vec![5, 9, -100, -100, -100]);
    }

    #[test]
    fn test_truncation_sides() {
        let ids: Vec<u32> = (1..=10).collect();
        let (right, mask) =
            pad_or_truncate(ids.clone(), 4, 0, TruncationSide::Right, PaddingSide::Right);
        assert_eq!(right, vec![1, 2, 3, 4]);
        assert_eq!(mask, vec![1; 4]);

        let (left, _) = pad_or_truncate(ids, 4, 0, TruncationSide::Left, PaddingSide::Right);
        assert_eq!(left, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_left_padding() {
        let (ids, mask) =
            pad_or_truncate(vec![7, 8], 4, 0, TruncationSide::Right, PaddingSide::Left);
        assert_eq!(ids, vec![0, 0, 7, 8]);
        assert_eq!(mask, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_length_and_mask_properties() {
        for len in [0usize, 1, 7, 8, 9, 40] {
            let ids: Vec<u32> = (0..len as u32).map(|i| i % 5).collect();
            let (input_ids, _) =
                pad_or_truncate(ids, 8, 0, TruncationSide::Right, PaddingSide::Right);
            let labels = mask_padding(&input_ids, 0);

            assert_eq!(input_ids.len(), 8);
            for (id, label) in input_ids.iter().zip(&labels) {
                assert_eq!(*label == IGNORE_INDEX, *id == 0);
                if *id != 0 {
                    assert_eq!(*label, i64::from(*id));
                }
            }
        }
    }

    #[test]
    fn test_zero_max_length_rejected() {
        let encoder = FixedEncoder {
            ids: vec![],
            eos: Some(2),
        };
        let err = ExampleTokenizer::new(encoder, config(0, PadTokenSource::Eos)).unwrap_err();
        assert!(matches!(err, FoamTuneError::Configuration(_)));
    }

    #[test]
    fn test_unresolvable_pad_token() {
        let no_eos = FixedEncoder {
            ids: vec![],
            eos: None,
        };
        assert!(matches!(
            resolve_pad_token_id(&no_eos, &PadTokenSource::Eos),
            Err(FoamTuneError::Configuration(_))
        ));
        assert!(resolve_pad_token_id(&no_eos, &PadTokenSource::Token("<|endoftext|>".into())).is_err());
        assert_eq!(
            resolve_pad_token_id(&no_eos, &PadTokenSource::Token("<pad>".into())).unwrap(),
            0
        );
    }

    #[test]
    fn test_projected_example_omits_mask_in_json() {
        let example = TokenizedExample {
            input_ids: vec![1, 0],
            labels: vec![1, IGNORE_INDEX],
            attention_mask: Vec::new(),
        };
        assert_eq!(
            serde_json::to_string(&example).unwrap(),
            r#"{"input_ids":[1,0],"labels":[1,-100]}"#
        );
    }
}
