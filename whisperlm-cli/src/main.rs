//! whisperlm - inspect what the evaluation harness sees
//!
//! Prints resolved language profiles, normalized text, decoded token ids and
//! the normalized pair / WER for a hypothesis against a reference file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use whisperlm_eval::{
    decode, fetcher_from_settings, format_wer_percentage, normalize, EvalSettings, Evaluator,
    ParameterProvider, PieceEncoding, Tokenizer, VocabTokenizer,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EncodingArg {
    /// GPT-2 byte-level pieces (Whisper)
    ByteLevel,
    /// SentencePiece pieces, `▁` marks a space
    SentencePiece,
    /// Pieces are concatenated as-is
    Plain,
}

impl From<EncodingArg> for PieceEncoding {
    fn from(v: EncodingArg) -> Self {
        match v {
            EncodingArg::ByteLevel => PieceEncoding::ByteLevel,
            EncodingArg::SentencePiece => PieceEncoding::SentencePiece,
            EncodingArg::Plain => PieceEncoding::Plain,
        }
    }
}

#[derive(Parser)]
#[command(name = "whisperlm")]
#[command(author, version, about = "Whisper + LM evaluation harness tools", long_about = None)]
struct Cli {
    /// Settings file (default: <config_dir>/whisperlm/eval.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and print the language profile
    Profile {
        /// Language code (default: from settings)
        #[arg(long)]
        lang: Option<String>,

        /// Skip the LM download and print only model references
        #[arg(long, default_value_t = false)]
        offline: bool,
    },

    /// Print the normalized form of TEXT
    Normalize {
        text: String,

        #[arg(long, default_value_t = false)]
        keep_diacritics: bool,
    },

    /// Decode token ids with a vocabulary file
    Decode {
        /// vocab.json or tokens.txt
        #[arg(long)]
        vocab: PathBuf,

        #[arg(long, value_enum, default_value = "byte-level")]
        encoding: EncodingArg,

        #[arg(required = true)]
        tokens: Vec<u32>,
    },

    /// Normalize and score a hypothesis against a reference transcript file
    Score {
        #[arg(long)]
        reference: PathBuf,

        #[arg(long)]
        hypothesis: String,

        #[arg(long, default_value_t = false)]
        keep_diacritics: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    debug!("whisperlm v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Profile { lang, offline } => {
            let settings = load_settings(cli.config.as_deref())?;
            run_profile(settings, lang, offline)
        }
        Commands::Normalize {
            text,
            keep_diacritics,
        } => {
            println!("{}", normalize(&text, !keep_diacritics));
            Ok(())
        }
        Commands::Decode {
            vocab,
            encoding,
            tokens,
        } => run_decode(&vocab, encoding.into(), &tokens),
        Commands::Score {
            reference,
            hypothesis,
            keep_diacritics,
        } => run_score(&reference, &hypothesis, !keep_diacritics),
    }
}

fn load_settings(path: Option<&Path>) -> Result<EvalSettings> {
    match path {
        Some(path) => EvalSettings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => EvalSettings::load().context("Failed to load settings"),
    }
}

fn run_profile(mut settings: EvalSettings, lang: Option<String>, offline: bool) -> Result<()> {
    settings.apply_overrides(lang, None);
    let fetcher = fetcher_from_settings(&settings.hub).context("Failed to set up artifact fetcher")?;
    let provider = ParameterProvider::new(settings, fetcher)?;
    let language = provider.settings().language.clone();

    if offline {
        let whisper = provider.whisper_config(&language)?;
        println!("language:       {}", whisper.lang);
        println!("acoustic model: {}", whisper.model);
    } else {
        info!("Resolving language profile for {}", language);
        let profile = provider
            .get_language_profile(&language)
            .with_context(|| format!("Failed to build language profile for {language}"))?;
        println!("language:       {}", profile.code());
        println!("acoustic model: {}", profile.acoustic_model_ref());
        println!("ngram lm:       {}", profile.lm_path().display());
        println!("ngram alpha:    {}", profile.lm_alpha());
        println!("ngram beta:     {}", profile.lm_beta());
    }

    let llm = provider.llm_config()?;
    println!("llm:            {}", llm.model);
    println!("llm alpha:      {}", llm.weights.alpha());
    println!("llm beta:       {}", llm.weights.beta());
    Ok(())
}

fn run_decode(vocab: &Path, encoding: PieceEncoding, tokens: &[u32]) -> Result<()> {
    println!("{}", decode_ids(vocab, encoding, tokens)?);
    Ok(())
}

fn decode_ids(vocab: &Path, encoding: PieceEncoding, tokens: &[u32]) -> Result<String> {
    let is_json = vocab
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let tokenizer = if is_json {
        VocabTokenizer::from_vocab_json(vocab, encoding)
    } else {
        VocabTokenizer::from_tokens_file(vocab, encoding)
    }
    .with_context(|| format!("Failed to load vocabulary {}", vocab.display()))?;
    debug!("Vocabulary loaded: {} tokens", tokenizer.vocab_size());

    Ok(decode(&tokenizer, tokens)?)
}

fn run_score(reference: &Path, hypothesis: &str, remove_diacritics: bool) -> Result<()> {
    let reference_text = std::fs::read_to_string(reference)
        .with_context(|| format!("Failed to read reference {}", reference.display()))?;
    print!("{}", score_report(&reference_text, hypothesis, remove_diacritics));
    Ok(())
}

fn score_report(reference_text: &str, hypothesis: &str, remove_diacritics: bool) -> String {
    let pair = Evaluator::new(remove_diacritics).compare_text(reference_text.trim(), hypothesis);
    format!(
        "reference:  {}\nhypothesis: {}\nexact:      {}\nwer:        {}\ncer:        {}\n",
        pair.reference(),
        pair.hypothesis(),
        pair.is_exact_match(),
        format_wer_percentage(pair.word_error_rate()),
        format_wer_percentage(pair.char_error_rate()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_arg_mapping() {
        assert_eq!(PieceEncoding::from(EncodingArg::ByteLevel), PieceEncoding::ByteLevel);
        assert_eq!(
            PieceEncoding::from(EncodingArg::SentencePiece),
            PieceEncoding::SentencePiece
        );
        assert_eq!(PieceEncoding::from(EncodingArg::Plain), PieceEncoding::Plain);
    }

    #[test]
    fn test_cli_parses_decode() {
        let cli = Cli::try_parse_from([
            "whisperlm", "decode", "--vocab", "tokens.txt", "--encoding", "sentence-piece", "3",
            "7",
        ])
        .unwrap();
        match cli.command {
            Commands::Decode {
                vocab,
                encoding,
                tokens,
            } => {
                assert_eq!(vocab, PathBuf::from("tokens.txt"));
                assert_eq!(encoding, EncodingArg::SentencePiece);
                assert_eq!(tokens, vec![3, 7]);
            }
            _ => panic!("expected decode"),
        }
    }

    #[test]
    fn test_cli_decode_requires_tokens() {
        assert!(Cli::try_parse_from(["whisperlm", "decode", "--vocab", "v.json"]).is_err());
    }

    #[test]
    fn test_score_report_exact_match() {
        let report = score_report("  Kaixo, mundua!\n", "kaixo mundua", true);
        assert!(report.contains("reference:  kaixo mundua\n"));
        assert!(report.contains("exact:      true\n"));
        assert!(report.contains("wer:        0.0%\n"));
    }

    #[test]
    fn test_score_report_keeps_diacritics() {
        let report = score_report("Très bien", "tres bien", false);
        assert!(report.contains("exact:      false\n"));
        assert!(report.contains("wer:        50.0%\n"));
    }

    #[test]
    fn test_decode_ids_from_tokens_file() {
        let tmp = tempfile::tempdir().unwrap();
        let vocab = tmp.path().join("tokens.txt");
        std::fs::write(&vocab, "<blk>\n\u{2581}kaixo\n\u{2581}mundua\n").unwrap();

        let text = decode_ids(&vocab, PieceEncoding::SentencePiece, &[0, 1, 2]).unwrap();
        assert_eq!(text, "kaixo mundua");
    }

    #[test]
    fn test_decode_ids_missing_vocab() {
        let err = decode_ids(Path::new("/nonexistent/vocab.json"), PieceEncoding::Plain, &[1])
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load vocabulary"));
    }
}
