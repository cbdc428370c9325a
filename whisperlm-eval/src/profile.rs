//! Parameter provider: language profiles and model combinations
//!
//! A [`LanguageProfile`] bundles everything one parameterised test run
//! needs: the acoustic model reference, the local path of the n-gram LM
//! artifact and the weights used to fuse the two. Profiles are built by
//! [`ParameterProvider`] and are immutable afterwards.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::artifact::ArtifactFetcher;
use crate::error::{EvalError, Result};
use crate::settings::{render_template, EvalSettings};

/// Validated ISO 639 short code: 2 or 3 lowercase ASCII letters.
///
/// Only the shape is checked; there is no registry lookup, so "zz" is
/// accepted and simply resolves to artifacts that may not exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn parse(code: &str) -> Result<Self> {
        if code.is_empty() {
            return Err(EvalError::config("language code is empty"));
        }
        let well_formed =
            (2..=3).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_lowercase());
        if !well_formed {
            return Err(EvalError::config(format!(
                "unrecognized language code {code:?}: expected 2-3 lowercase letters"
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// LM fusion weights.
///
/// `alpha` scales the LM score, `beta` is the per-word insertion bonus.
/// No range is imposed here, only that both are finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    alpha: f64,
    beta: f64,
}

impl FusionWeights {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !alpha.is_finite() || !beta.is_finite() {
            return Err(EvalError::config(format!(
                "fusion weights must be finite (alpha={alpha}, beta={beta})"
            )));
        }
        Ok(Self { alpha, beta })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

/// Acoustic model selection for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperConfig {
    pub lang: LanguageCode,
    /// Hub model reference, e.g. "zuazo/whisper-tiny-eu"
    pub model: String,
}

/// KenLM n-gram rescorer: local binary plus weights
#[derive(Debug, Clone, PartialEq)]
pub struct NgramConfig {
    pub path: PathBuf,
    pub weights: FusionWeights,
}

/// Large-LM rescorer: hub model reference plus weights
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub weights: FusionWeights,
}

/// Immutable configuration bundle for one acoustic model + n-gram LM run
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageProfile {
    code: LanguageCode,
    acoustic_model_ref: String,
    lm_path: PathBuf,
    lm_weights: FusionWeights,
}

impl LanguageProfile {
    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    pub fn acoustic_model_ref(&self) -> &str {
        &self.acoustic_model_ref
    }

    pub fn lm_path(&self) -> &Path {
        &self.lm_path
    }

    pub fn lm_alpha(&self) -> f64 {
        self.lm_weights.alpha()
    }

    pub fn lm_beta(&self) -> f64 {
        self.lm_weights.beta()
    }

    pub fn whisper_config(&self) -> WhisperConfig {
        WhisperConfig {
            lang: self.code.clone(),
            model: self.acoustic_model_ref.clone(),
        }
    }

    pub fn ngram_config(&self) -> NgramConfig {
        NgramConfig {
            path: self.lm_path.clone(),
            weights: self.lm_weights,
        }
    }
}

/// Builds language profiles from settings, resolving artifacts through a
/// fetcher.
pub struct ParameterProvider {
    settings: EvalSettings,
    fetcher: Box<dyn ArtifactFetcher>,
}

impl ParameterProvider {
    /// Validates `settings` up front so every later profile uses sane
    /// templates and weights.
    pub fn new(settings: EvalSettings, fetcher: Box<dyn ArtifactFetcher>) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, fetcher })
    }

    pub fn settings(&self) -> &EvalSettings {
        &self.settings
    }

    /// Acoustic model reference for `lang_code`, without touching the
    /// network.
    pub fn whisper_config(&self, lang_code: &str) -> Result<WhisperConfig> {
        let lang = LanguageCode::parse(lang_code)?;
        let model = render_template(&self.settings.acoustic_model_template, &lang);
        Ok(WhisperConfig { lang, model })
    }

    /// Build the profile for `lang_code`, fetching its n-gram LM artifact.
    ///
    /// The code is validated before any download is attempted.
    pub fn get_language_profile(&self, lang_code: &str) -> Result<LanguageProfile> {
        let whisper = self.whisper_config(lang_code)?;
        let lm_filename = render_template(&self.settings.ngram.filename_template, &whisper.lang);
        let lm_weights = self.settings.ngram_weights()?;

        debug!(
            lang = %whisper.lang,
            model = %whisper.model,
            lm = %lm_filename,
            "building language profile"
        );
        let lm_path = self.resolve_artifact_path(&self.settings.ngram.repo_id, &lm_filename)?;

        info!(lang = %whisper.lang, lm_path = %lm_path.display(), "language profile ready");
        Ok(LanguageProfile {
            code: whisper.lang,
            acoustic_model_ref: whisper.model,
            lm_path,
            lm_weights,
        })
    }

    /// Profile for the language configured in settings.
    pub fn default_language_profile(&self) -> Result<LanguageProfile> {
        self.get_language_profile(&self.settings.language)
    }

    /// Large-LM rescorer configuration. The model is passed through as a
    /// hub reference; nothing is downloaded here.
    pub fn llm_config(&self) -> Result<LlmConfig> {
        Ok(LlmConfig {
            model: self.settings.llm.model.clone(),
            weights: self.settings.llm_weights()?,
        })
    }

    /// Local path of `filename` in `repo_id`. May block on network I/O.
    pub fn resolve_artifact_path(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        self.fetcher.fetch(repo_id, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Fetcher that hands back a fixed directory and counts calls
    struct FakeFetcher {
        root: PathBuf,
        calls: std::rc::Rc<Cell<usize>>,
    }

    impl ArtifactFetcher for FakeFetcher {
        fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.root.join(repo_id).join(filename))
        }
    }

    fn provider() -> (ParameterProvider, std::rc::Rc<Cell<usize>>) {
        let calls = std::rc::Rc::new(Cell::new(0));
        let fetcher = FakeFetcher {
            root: PathBuf::from("/cache"),
            calls: calls.clone(),
        };
        let provider = ParameterProvider::new(EvalSettings::default(), Box::new(fetcher)).unwrap();
        (provider, calls)
    }

    #[test]
    fn test_basque_profile() {
        let (provider, _) = provider();
        let profile = provider.get_language_profile("eu").unwrap();

        assert_eq!(profile.code(), "eu");
        assert_eq!(profile.acoustic_model_ref(), "zuazo/whisper-tiny-eu");
        assert_eq!(
            profile.lm_path(),
            Path::new("/cache/HiTZ/whisper-lm-ngrams/5gram-eu.bin")
        );
        assert_eq!(profile.lm_alpha(), 0.33582368603855817);
        assert_eq!(profile.lm_beta(), 0.6882556478819416);
    }

    #[test]
    fn test_invalid_codes_fail_before_fetching() {
        let (provider, calls) = provider();
        for code in ["", "e", "EU", "basque", "e1", "eu-ES"] {
            let err = provider.get_language_profile(code).unwrap_err();
            assert!(
                matches!(err, EvalError::Configuration(_)),
                "{code:?} gave {err}"
            );
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_three_letter_codes_are_accepted() {
        let (provider, _) = provider();
        let whisper = provider.whisper_config("eus").unwrap();
        assert_eq!(whisper.model, "zuazo/whisper-tiny-eus");
    }

    #[test]
    fn test_derived_configs_match_profile() {
        let (provider, _) = provider();
        let profile = provider.get_language_profile("es").unwrap();

        let whisper = profile.whisper_config();
        assert_eq!(whisper.lang.as_str(), "es");
        assert_eq!(whisper.model, "zuazo/whisper-tiny-es");

        let ngram = profile.ngram_config();
        assert_eq!(ngram.path, profile.lm_path());
        assert_eq!(ngram.weights.alpha(), profile.lm_alpha());
    }

    #[test]
    fn test_llm_config_defaults() {
        let (provider, calls) = provider();
        let llm = provider.llm_config().unwrap();
        assert_eq!(llm.model, "HiTZ/latxa-7b-v1.2");
        assert_eq!(llm.weights.alpha(), 2.733293955541733);
        assert_eq!(llm.weights.beta(), 0.0017859540619529915);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_weights_accept_negative_but_not_infinite() {
        assert!(FusionWeights::new(-1.5, 0.0).is_ok());
        assert!(FusionWeights::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_provider_rejects_invalid_settings() {
        let mut settings = EvalSettings::default();
        settings.ngram.filename_template = "5gram.bin".to_string();
        let fetcher = FakeFetcher {
            root: PathBuf::from("/cache"),
            calls: Default::default(),
        };
        assert!(ParameterProvider::new(settings, Box::new(fetcher)).is_err());
    }
}
