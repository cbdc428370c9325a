//! Whisper-LM evaluation harness
//!
//! Test-support layer for speech-to-text runs that pair a Whisper acoustic
//! model with an external language-model rescorer (KenLM n-gram or a large
//! LM). The acoustic model, the scorer and the fusion search live elsewhere;
//! this crate supplies what the tests around them need:
//!
//! - **Parameters**: typed, validated language profiles and fusion weights
//! - **Artifacts**: `(repo_id, filename)` resolution via the Hugging Face Hub
//!   or an offline mirror
//! - **Harness**: decode model tokens, normalize hypothesis and reference,
//!   hand back a comparable pair
//! - **Scoring**: exact match, WER and CER on that pair
//! - **Session fixtures**: reference transcripts and audio, decoded once
//!
//! ## Quick Start
//!
//! ```no_run
//! use whisperlm_eval::{compare, fetcher_from_settings, EvalSettings, ParameterProvider};
//! use whisperlm_eval::{PieceEncoding, VocabTokenizer};
//!
//! let settings = EvalSettings::load()?;
//! let fetcher = fetcher_from_settings(&settings.hub)?;
//! let provider = ParameterProvider::new(settings, fetcher)?;
//!
//! let profile = provider.get_language_profile("eu")?;
//! assert_eq!(profile.acoustic_model_ref(), "zuazo/whisper-tiny-eu");
//!
//! let tokenizer = VocabTokenizer::from_vocab_json("vocab.json", PieceEncoding::ByteLevel)?;
//! let generated: Vec<u32> = vec![50258, 50310, 50359, 50363, 42, 50257];
//! let pair = compare("Kaixo, mundua!", &generated, &tokenizer, true)?;
//! println!("WER: {:.3}", pair.word_error_rate());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod artifact;
pub mod audio;
pub mod error;
pub mod harness;
pub mod normalizer;
pub mod profile;
pub mod scoring;
pub mod session;
pub mod settings;
pub mod tokens;

pub use artifact::{fetcher_from_settings, ArtifactFetcher, HubFetcher, LocalArtifactStore};
pub use audio::{AudioLoader, FileAudioLoader, SAMPLE_RATE};
pub use error::{EvalError, Result};
pub use harness::{compare, decode, Evaluator, NormalizedPair};
pub use normalizer::{normalize, BasicTextNormalizer, TextNormalizer};
pub use profile::{
    FusionWeights, LanguageCode, LanguageProfile, LlmConfig, NgramConfig, ParameterProvider,
    WhisperConfig,
};
pub use scoring::{calculate_cer, calculate_wer, format_wer_percentage};
pub use session::{EvaluationExample, EvaluationSession};
pub use settings::EvalSettings;
pub use tokens::{PieceEncoding, Tokenizer, VocabTokenizer};

#[cfg(feature = "hf-tokenizers")]
pub use tokens::HfTokenizer;
