//! Word and character error rates for normalized pairs.
//!
//! WER = (insertions + deletions + substitutions) / reference_word_count

use crate::harness::NormalizedPair;

impl NormalizedPair {
    pub fn is_exact_match(&self) -> bool {
        self.reference() == self.hypothesis()
    }

    pub fn word_error_rate(&self) -> f64 {
        calculate_wer(self.reference(), self.hypothesis())
    }

    pub fn char_error_rate(&self) -> f64 {
        calculate_cer(self.reference(), self.hypothesis())
    }
}

/// Levenshtein distance between two sequences.
pub fn edit_distance<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> usize {
    // Single rolling row of the DP table
    let mut prev: Vec<usize> = (0..=hypothesis.len()).collect();
    let mut curr = vec![0; hypothesis.len() + 1];

    for (i, r) in reference.iter().enumerate() {
        curr[0] = i + 1;
        for (j, h) in hypothesis.iter().enumerate() {
            let substitution_cost = usize::from(r != h);
            curr[j + 1] = (prev[j + 1] + 1) // deletion
                .min(curr[j] + 1) // insertion
                .min(prev[j] + substitution_cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[hypothesis.len()]
}

/// Word-level edit distance over whitespace-separated words.
pub fn word_edit_distance(reference: &str, hypothesis: &str) -> usize {
    let ref_words: Vec<&str> = reference.split_whitespace().collect();
    let hyp_words: Vec<&str> = hypothesis.split_whitespace().collect();
    edit_distance(&ref_words, &hyp_words)
}

/// Word Error Rate between reference and hypothesis.
///
/// An empty reference scores 0.0 against an empty hypothesis and 1.0
/// otherwise.
pub fn calculate_wer(reference: &str, hypothesis: &str) -> f64 {
    let ref_len = reference.split_whitespace().count();
    if ref_len == 0 {
        return if hypothesis.split_whitespace().next().is_none() {
            0.0
        } else {
            1.0
        };
    }
    word_edit_distance(reference, hypothesis) as f64 / ref_len as f64
}

/// Character Error Rate, counting Unicode scalar values.
pub fn calculate_cer(reference: &str, hypothesis: &str) -> f64 {
    let ref_chars: Vec<char> = reference.chars().collect();
    let hyp_chars: Vec<char> = hypothesis.chars().collect();

    if ref_chars.is_empty() {
        return if hyp_chars.is_empty() { 0.0 } else { 1.0 };
    }
    edit_distance(&ref_chars, &hyp_chars) as f64 / ref_chars.len() as f64
}

/// Format an error rate as a percentage string.
pub fn format_wer_percentage(wer: f64) -> String {
    format!("{:.1}%", wer * 100.0)
}
