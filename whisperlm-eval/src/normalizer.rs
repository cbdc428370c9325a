//! Transcript normalization
//!
//! Hypothesis and reference are compared only after both went through the
//! same normalizer. [`BasicTextNormalizer`] is language-agnostic: it
//! lowercases, drops bracketed and parenthesised annotations, replaces
//! punctuation and symbols with spaces, optionally strips diacritics, and
//! collapses whitespace. The output is a fixed point: normalizing it again
//! changes nothing.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// `[noise]`, `<unk>` style annotations
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[<\[][^>\]]*[>\]]").unwrap());

/// `(laughs)` style annotations
static PARENTHESIZED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]+?)\)").unwrap());

static NON_SPACING_MARK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{Mn}").unwrap());

static MARK_SYMBOL_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{M}\p{S}\p{P}]").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalizes transcripts before comparison.
pub trait TextNormalizer {
    fn normalize(&self, text: &str) -> String;

    /// Name used in logs
    fn name(&self) -> &'static str;
}

/// Language-agnostic normalizer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicTextNormalizer {
    remove_diacritics: bool,
}

impl BasicTextNormalizer {
    pub fn new(remove_diacritics: bool) -> Self {
        Self { remove_diacritics }
    }

    pub fn removes_diacritics(&self) -> bool {
        self.remove_diacritics
    }
}

impl TextNormalizer for BasicTextNormalizer {
    fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = BRACKETED.replace_all(&lowered, "");
        let stripped = PARENTHESIZED.replace_all(&stripped, "");

        let cleaned = if self.remove_diacritics {
            remove_symbols_and_diacritics(&stripped)
        } else {
            remove_symbols(&stripped)
        };

        let cleaned = cleaned.to_lowercase();
        WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
    }

    fn name(&self) -> &'static str {
        if self.remove_diacritics {
            "basic-no-diacritics"
        } else {
            "basic"
        }
    }
}

/// Normalize `text` with [`BasicTextNormalizer`].
pub fn normalize(text: &str, remove_diacritics: bool) -> String {
    BasicTextNormalizer::new(remove_diacritics).normalize(text)
}

/// Letters NFKD does not decompose into base + mark.
fn additional_diacritic(c: char) -> Option<&'static str> {
    let replacement = match c {
        'œ' => "oe",
        'Œ' => "OE",
        'ø' => "o",
        'Ø' => "O",
        'æ' => "ae",
        'Æ' => "AE",
        'ß' => "ss",
        'ẞ' => "SS",
        'đ' | 'ð' => "d",
        'Đ' | 'Ð' => "D",
        'þ' | 'Þ' => "th",
        'ł' => "l",
        'Ł' => "L",
        _ => return None,
    };
    Some(replacement)
}

/// NFKD, drop non-spacing marks, replace other marks, symbols and
/// punctuation with a space.
fn remove_symbols_and_diacritics(s: &str) -> String {
    let mut decomposed = String::with_capacity(s.len());
    for c in s.nfkd() {
        match additional_diacritic(c) {
            Some(replacement) => decomposed.push_str(replacement),
            None => decomposed.push(c),
        }
    }
    let without_marks = NON_SPACING_MARK.replace_all(&decomposed, "");
    MARK_SYMBOL_PUNCT.replace_all(&without_marks, " ").into_owned()
}

/// NFKC, replace marks, symbols and punctuation with a space.
fn remove_symbols(s: &str) -> String {
    let composed: String = s.nfkc().collect();
    MARK_SYMBOL_PUNCT.replace_all(&composed, " ").into_owned()
}
