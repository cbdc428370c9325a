//! Decode-and-normalize comparison harness
//!
//! Turns model output tokens and a reference transcript into a
//! [`NormalizedPair`] that tests assert on. Everything here is a pure,
//! single-shot transformation; nothing is cached between calls.

use tracing::debug;

use crate::error::{EvalError, Result};
use crate::normalizer::{BasicTextNormalizer, TextNormalizer};
use crate::tokens::Tokenizer;

/// Normalized reference and hypothesis, ready for scoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPair {
    reference_normalized: String,
    hypothesis_normalized: String,
}

impl NormalizedPair {
    pub fn new(reference_normalized: String, hypothesis_normalized: String) -> Self {
        Self {
            reference_normalized,
            hypothesis_normalized,
        }
    }

    pub fn reference(&self) -> &str {
        &self.reference_normalized
    }

    pub fn hypothesis(&self) -> &str {
        &self.hypothesis_normalized
    }

    /// `(reference, hypothesis)`
    pub fn into_parts(self) -> (String, String) {
        (self.reference_normalized, self.hypothesis_normalized)
    }
}

/// Decode model output to text, dropping control tokens.
///
/// Fails if `token_sequence` is empty, holds an id the tokenizer does not
/// know, or holds nothing but control tokens. The returned text is trimmed
/// and never empty.
pub fn decode<T: Tokenizer + ?Sized>(tokenizer: &T, token_sequence: &[u32]) -> Result<String> {
    if token_sequence.is_empty() {
        return Err(EvalError::decode("token sequence is empty"));
    }

    let mut text_ids = Vec::with_capacity(token_sequence.len());
    for (pos, &id) in token_sequence.iter().enumerate() {
        if !tokenizer.contains(id) {
            return Err(EvalError::decode(format!(
                "token {id} at position {pos} is out of vocabulary (vocab size {})",
                tokenizer.vocab_size()
            )));
        }
        if !tokenizer.is_special(id) {
            text_ids.push(id);
        }
    }

    if text_ids.is_empty() {
        return Err(EvalError::decode(format!(
            "token sequence of length {} contains only control tokens",
            token_sequence.len()
        )));
    }

    let rendered = tokenizer.render(&text_ids)?;
    let text = rendered.trim();
    if text.is_empty() {
        return Err(EvalError::decode("decoded text is blank"));
    }
    Ok(text.to_string())
}

/// Decode `token_sequence` and normalize both sides with
/// [`BasicTextNormalizer`].
pub fn compare<T: Tokenizer + ?Sized>(
    reference_text: &str,
    token_sequence: &[u32],
    tokenizer: &T,
    remove_diacritics: bool,
) -> Result<NormalizedPair> {
    Evaluator::new(remove_diacritics).compare(reference_text, token_sequence, tokenizer)
}

/// Comparison with a fixed normalizer
#[derive(Debug, Clone)]
pub struct Evaluator<N = BasicTextNormalizer> {
    normalizer: N,
}

impl Evaluator<BasicTextNormalizer> {
    pub fn new(remove_diacritics: bool) -> Self {
        Self {
            normalizer: BasicTextNormalizer::new(remove_diacritics),
        }
    }
}

impl<N: TextNormalizer> Evaluator<N> {
    pub fn with_normalizer(normalizer: N) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &N {
        &self.normalizer
    }

    /// Normalize an already-decoded hypothesis against the reference.
    pub fn compare_text(&self, reference_text: &str, hypothesis_text: &str) -> NormalizedPair {
        let pair = NormalizedPair::new(
            self.normalizer.normalize(reference_text),
            self.normalizer.normalize(hypothesis_text),
        );
        debug!(
            normalizer = self.normalizer.name(),
            reference = pair.reference(),
            hypothesis = pair.hypothesis(),
            "normalized pair"
        );
        pair
    }

    pub fn compare<T: Tokenizer + ?Sized>(
        &self,
        reference_text: &str,
        token_sequence: &[u32],
        tokenizer: &T,
    ) -> Result<NormalizedPair> {
        let hypothesis = decode(tokenizer, token_sequence)?;
        Ok(self.compare_text(reference_text, &hypothesis))
    }

    /// Compare against the first sequence of a generation batch.
    pub fn compare_generated<T: Tokenizer + ?Sized>(
        &self,
        reference_text: &str,
        generated: &[Vec<u32>],
        tokenizer: &T,
    ) -> Result<NormalizedPair> {
        let first = generated
            .first()
            .ok_or_else(|| EvalError::decode("generation batch is empty"))?;
        self.compare(reference_text, first, tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use crate::tokens::{PieceEncoding, VocabTokenizer};

    fn whisper_like() -> VocabTokenizer {
        VocabTokenizer::from_tokens(
            [
                "<|startoftranscript|>", // 0
                "<|eu|>",                // 1
                "<|transcribe|>",        // 2
                "<|notimestamps|>",      // 3
                "ĠKaixo",                // 4
                ",",                     // 5
                "Ġmundua",               // 6
                "!",                     // 7
                "<|endoftext|>",         // 8
                "Ġ",                     // 9
            ],
            PieceEncoding::ByteLevel,
        )
    }

    #[test]
    fn test_decode_strips_control_tokens() {
        let tok = whisper_like();
        let text = decode(&tok, &[0, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(text, "Kaixo, mundua!");
    }

    #[test]
    fn test_empty_sequence_is_a_decode_error() {
        let tok = whisper_like();
        assert!(matches!(decode(&tok, &[]), Err(EvalError::Decode(_))));
    }

    #[test]
    fn test_out_of_vocabulary_is_a_decode_error() {
        let tok = whisper_like();
        let err = decode(&tok, &[0, 4, 99]).unwrap_err();
        assert!(matches!(err, EvalError::Decode(_)));
        assert!(err.to_string().contains("99"));
        assert!(err.to_string().contains("position 2"));
    }

    #[test]
    fn test_control_only_sequence_is_a_decode_error() {
        let tok = whisper_like();
        assert!(matches!(decode(&tok, &[0, 1, 8]), Err(EvalError::Decode(_))));
        assert!(matches!(decode(&tok, &[9]), Err(EvalError::Decode(_))));
    }

    #[test]
    fn test_in_vocabulary_text_tokens_decode_to_non_empty() {
        let tok = whisper_like();
        for id in [4u32, 5, 6, 7] {
            let text = decode(&tok, &[0, id, 8]).unwrap();
            assert!(!text.is_empty());
        }
    }

    #[test]
    fn test_compare_normalizes_both_sides() {
        let tok = whisper_like();
        let pair = compare("Kaixo mundua", &[0, 4, 5, 6, 7, 8], &tok, true).unwrap();
        assert_eq!(pair.reference(), "kaixo mundua");
        assert_eq!(pair.hypothesis(), "kaixo mundua");
    }

    #[test]
    fn test_compare_is_order_independent() {
        let tok = whisper_like();
        let reference = "KAIXO; Mündua?";
        let tokens = [4, 5, 6, 7];

        let pair = compare(reference, &tokens, &tok, true).unwrap();

        let hypothesis = normalize(&decode(&tok, &tokens).unwrap(), true);
        let reference_norm = normalize(reference, true);
        assert_eq!(pair, NormalizedPair::new(reference_norm, hypothesis));
    }

    #[test]
    fn test_compare_propagates_decode_errors() {
        let tok = whisper_like();
        assert!(compare("kaixo", &[], &tok, true).is_err());
    }

    #[test]
    fn test_generated_batch_uses_first_row() {
        let tok = whisper_like();
        let evaluator = Evaluator::new(true);
        let batch = vec![vec![4, 6], vec![99]];
        let pair = evaluator.compare_generated("kaixo mundua", &batch, &tok).unwrap();
        assert_eq!(pair.hypothesis(), "kaixo mundua");

        assert!(evaluator.compare_generated("x", &[], &tok).is_err());
    }

    #[test]
    fn test_pair_into_parts() {
        let (r, h) = NormalizedPair::new("a".into(), "b".into()).into_parts();
        assert_eq!((r.as_str(), h.as_str()), ("a", "b"));
    }
}
