//! Token vocabulary and rendering
//!
//! The harness only needs three things from a tokenizer: whether an id
//! exists, whether it is a control token, and how to turn a run of text
//! tokens into a string. [`Tokenizer`] captures exactly that;
//! [`VocabTokenizer`] implements it from plain vocabulary files.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{EvalError, Result};

/// SentencePiece word-boundary marker
const SP_SPACE: char = '\u{2581}';

/// Ids may exceed `4 * entries` by this much before a file counts as corrupt
const MAX_ID_SLACK: usize = 1024;

/// Non-`<|...|>` tokens that are always treated as control tokens
const CONTROL_TOKENS: &[&str] = &["<blk>", "<blank>", "<unk>", "<pad>", "<s>", "</s>"];

/// Vocabulary lookup used by [`crate::harness::decode`].
pub trait Tokenizer {
    fn vocab_size(&self) -> usize;

    /// True if `id` maps to a token.
    fn contains(&self, id: u32) -> bool;

    /// True for control tokens (start/end of transcript, language and task
    /// tags, timestamps, blanks).
    fn is_special(&self, id: u32) -> bool;

    /// Render known, non-special ids as text.
    fn render(&self, ids: &[u32]) -> Result<String>;
}

/// How vocabulary pieces map back to text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceEncoding {
    /// GPT-2 byte-level BPE (Whisper): each char stands for one byte
    ByteLevel,
    /// SentencePiece: `▁` marks a word boundary
    SentencePiece,
    /// Pieces are literal text
    Plain,
}

/// Tokenizer backed by an in-memory vocabulary
#[derive(Debug)]
pub struct VocabTokenizer {
    /// Token ID to string mapping (gaps allowed)
    tokens: Vec<Option<String>>,
    /// String to token ID mapping
    token_to_id: HashMap<String, u32>,
    special_ids: HashSet<u32>,
    encoding: PieceEncoding,
    byte_decoder: HashMap<char, u8>,
}

#[derive(Debug, Deserialize)]
struct AddedTokenEntry {
    content: String,
    #[serde(default)]
    special: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfig {
    #[serde(default)]
    added_tokens_decoder: HashMap<String, AddedTokenEntry>,
}

impl VocabTokenizer {
    /// Build from tokens listed in id order.
    pub fn from_tokens<I, S>(tokens: I, encoding: PieceEncoding) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = tokens
            .into_iter()
            .enumerate()
            .map(|(id, t)| (id as u32, t.into()));
        Self::build(entries, encoding)
    }

    /// Load tokens from a tokens.txt file
    ///
    /// Format: one token per line, the line number is the token ID. If the
    /// first line ends in an id (`"<blk> 0"`), every line must carry one.
    pub fn from_tokens_file<P: AsRef<Path>>(path: P, encoding: PieceEncoding) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            EvalError::decode(format!("Failed to open tokens file {}: {e}", path.display()))
        })?;

        let mut lines = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                EvalError::decode(format!("Failed to read token line {line_no}: {e}"))
            })?;
            lines.push(line);
        }

        if lines.is_empty() {
            return Err(EvalError::decode(format!(
                "Token file is empty: {}",
                path.display()
            )));
        }

        let explicit_ids = split_explicit_id(&lines[0]).is_some();
        let mut entries = Vec::with_capacity(lines.len());
        for (line_no, line) in lines.into_iter().enumerate() {
            if !explicit_ids {
                entries.push((line_no as u32, line));
                continue;
            }
            let (token, id) = split_explicit_id(&line).ok_or_else(|| {
                EvalError::decode(format!(
                    "Token line {line_no} has no id: {line:?} ({})",
                    path.display()
                ))
            })?;
            entries.push((id, token.to_string()));
        }

        let tokenizer = Self::from_entries(entries, encoding)?;
        info!(
            path = %path.display(),
            vocab_size = tokenizer.vocab_size(),
            special = tokenizer.special_ids.len(),
            explicit_ids,
            "loaded tokens file"
        );
        Ok(tokenizer)
    }

    /// Load a Hugging Face `vocab.json` (token -> id).
    ///
    /// Added tokens are merged from a sibling `tokenizer_config.json`
    /// (`added_tokens_decoder`, honouring its `special` flag) or, failing
    /// that, from `added_tokens.json`.
    pub fn from_vocab_json<P: AsRef<Path>>(path: P, encoding: PieceEncoding) -> Result<Self> {
        let path = path.as_ref();
        let vocab: HashMap<String, u32> = read_json(path)?;
        if vocab.is_empty() {
            return Err(EvalError::decode(format!("Vocabulary is empty: {}", path.display())));
        }

        let mut entries: Vec<(u32, String)> = vocab.into_iter().map(|(t, id)| (id, t)).collect();
        entries.sort_unstable();
        let mut explicit_special = HashSet::new();

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config_path = dir.join("tokenizer_config.json");
        let added_path = dir.join("added_tokens.json");

        if config_path.is_file() {
            let config: TokenizerConfig = read_json(&config_path)?;
            let mut added = Vec::with_capacity(config.added_tokens_decoder.len());
            for (key, entry) in config.added_tokens_decoder {
                let id: u32 = key.parse().map_err(|_| {
                    EvalError::decode(format!("Invalid id in added_tokens_decoder: {key}"))
                })?;
                if entry.special {
                    explicit_special.insert(id);
                }
                added.push((id, entry.content));
            }
            added.sort_unstable();
            entries.extend(added);
        } else if added_path.is_file() {
            let added: HashMap<String, u32> = read_json(&added_path)?;
            let mut added: Vec<(u32, String)> = added.into_iter().map(|(t, id)| (id, t)).collect();
            added.sort_unstable();
            entries.extend(added);
        }

        let mut tokenizer = Self::from_entries(entries, encoding)?;
        tokenizer.special_ids.extend(explicit_special);

        info!(
            path = %path.display(),
            vocab_size = tokenizer.vocab_size(),
            special = tokenizer.special_ids.len(),
            "loaded vocab.json"
        );
        Ok(tokenizer)
    }

    /// Build from `(id, token)` pairs, rejecting ids far past the entry
    /// count so a corrupt file cannot force a huge table.
    fn from_entries(entries: Vec<(u32, String)>, encoding: PieceEncoding) -> Result<Self> {
        let max_id = entries.len().saturating_mul(4).saturating_add(MAX_ID_SLACK);
        if let Some((id, token)) = entries.iter().find(|(id, _)| *id as usize > max_id) {
            return Err(EvalError::decode(format!(
                "token {token:?} has id {id}, too sparse for {} entries",
                entries.len()
            )));
        }
        Ok(Self::build(entries, encoding))
    }

    fn build<I>(entries: I, encoding: PieceEncoding) -> Self
    where
        I: IntoIterator<Item = (u32, String)>,
    {
        let mut tokens: Vec<Option<String>> = Vec::new();
        let mut token_to_id = HashMap::new();
        let mut special_ids = HashSet::new();

        for (id, token) in entries {
            let idx = id as usize;
            if idx >= tokens.len() {
                tokens.resize(idx + 1, None);
            }
            if is_control_token(&token) {
                special_ids.insert(id);
            } else {
                special_ids.remove(&id);
            }

            // Later entries (added tokens) win, for the id and the string
            if let Some(displaced) = tokens[idx].take() {
                if token_to_id.get(&displaced) == Some(&id) {
                    token_to_id.remove(&displaced);
                }
            }
            token_to_id.insert(token.clone(), id);
            tokens[idx] = Some(token);
        }

        let byte_decoder = match encoding {
            PieceEncoding::ByteLevel => gpt2_byte_decoder(),
            _ => HashMap::new(),
        };

        Self {
            tokens,
            token_to_id,
            special_ids,
            encoding,
            byte_decoder,
        }
    }

    /// Mark additional ids as control tokens.
    pub fn with_special_ids<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.special_ids.extend(ids);
        self
    }

    /// Get token ID for a string
    pub fn encode(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    /// Get token string by ID
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).and_then(|t| t.as_deref())
    }

    pub fn encoding(&self) -> PieceEncoding {
        self.encoding
    }
}

impl Tokenizer for VocabTokenizer {
    fn vocab_size(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_some()).count()
    }

    fn contains(&self, id: u32) -> bool {
        self.id_to_token(id).is_some()
    }

    fn is_special(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    fn render(&self, ids: &[u32]) -> Result<String> {
        let mut raw = String::new();
        for &id in ids {
            let token = self
                .id_to_token(id)
                .ok_or_else(|| EvalError::decode(format!("Invalid token ID: {id}")))?;
            raw.push_str(token);
        }

        let text = match self.encoding {
            PieceEncoding::ByteLevel => byte_level_decode(&raw, &self.byte_decoder),
            PieceEncoding::SentencePiece => raw.replace(SP_SPACE, " "),
            PieceEncoding::Plain => raw,
        };
        debug!(tokens = ids.len(), chars = text.len(), "rendered tokens");
        Ok(text)
    }
}

/// Adapter for `tokenizer.json` files via the `tokenizers` crate.
#[cfg(feature = "hf-tokenizers")]
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
    special_ids: HashSet<u32>,
}

#[cfg(feature = "hf-tokenizers")]
impl HfTokenizer {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            EvalError::decode(format!("Failed to load tokenizer {}: {e}", path.display()))
        })?;
        let special_ids = inner
            .get_added_tokens_decoder()
            .iter()
            .filter(|(_, token)| token.special)
            .map(|(id, _)| *id)
            .collect();
        Ok(Self { inner, special_ids })
    }
}

#[cfg(feature = "hf-tokenizers")]
impl Tokenizer for HfTokenizer {
    fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    fn contains(&self, id: u32) -> bool {
        self.inner.id_to_token(id).is_some()
    }

    fn is_special(&self, id: u32) -> bool {
        self.special_ids.contains(&id)
    }

    fn render(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| EvalError::decode(format!("tokenizer decode: {e}")))
    }
}

/// `"<token> <id>"` split at the last space, when the tail is an id.
fn split_explicit_id(line: &str) -> Option<(&str, u32)> {
    let (token, id) = line.rsplit_once(' ')?;
    if token.is_empty() {
        return None;
    }
    id.parse().ok().map(|id| (token, id))
}

fn is_control_token(token: &str) -> bool {
    (token.len() > 4 && token.starts_with("<|") && token.ends_with("|>"))
        || CONTROL_TOKENS.contains(&token)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| EvalError::decode(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| EvalError::decode(format!("Failed to parse {}: {e}", path.display())))
}

fn byte_level_decode(s: &str, byte_decoder: &HashMap<char, u8>) -> String {
    let mut bytes: Vec<u8> = Vec::with_capacity(s.len());
    for ch in s.chars() {
        if let Some(&b) = byte_decoder.get(&ch) {
            bytes.push(b);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Inverse of GPT-2's `bytes_to_unicode` table.
fn gpt2_byte_decoder() -> HashMap<char, u8> {
    let mut bs: Vec<u32> = Vec::new();
    bs.extend((b'!' as u32)..=(b'~' as u32));
    bs.extend(0x00A1_u32..=0x00AC_u32);
    bs.extend(0x00AE_u32..=0x00FF_u32);

    let mut cs = bs.clone();
    let mut n = 0u32;
    for b in 0u32..=255 {
        if !bs.contains(&b) {
            bs.push(b);
            cs.push(256 + n);
            n += 1;
        }
    }

    bs.iter()
        .zip(cs.iter())
        .filter_map(|(&b, &c)| char::from_u32(c).map(|ch| (ch, b as u8)))
        .collect()
}
