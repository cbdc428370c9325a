//! Harness settings
//!
//! Naming templates, fusion weights and fixture locations, loaded from
//! `<config_dir>/whisperlm/eval.toml` when present and defaulted otherwise.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{EvalError, Result};
use crate::profile::{FusionWeights, LanguageCode};

/// Placeholder replaced by the language code in every naming template.
pub const LANG_PLACEHOLDER: &str = "{lang}";

/// Environment variable overriding [`EvalSettings::language`].
pub const LANG_ENV: &str = "WHISPERLM_LANG";

/// Environment variable overriding [`HubSettings::endpoint`].
pub const ENDPOINT_ENV: &str = "HF_ENDPOINT";

/// N-gram language model artifact and its fusion weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NgramSettings {
    /// Hub repository holding one KenLM binary per language
    pub repo_id: String,

    /// File name inside `repo_id`, e.g. "5gram-{lang}.bin"
    pub filename_template: String,

    pub alpha: f64,
    pub beta: f64,
}

impl Default for NgramSettings {
    fn default() -> Self {
        Self {
            repo_id: "HiTZ/whisper-lm-ngrams".to_string(),
            filename_template: "5gram-{lang}.bin".to_string(),
            alpha: 0.33582368603855817,
            beta: 0.6882556478819416,
        }
    }
}

/// Large language model used as an alternative rescorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Hub model identifier, passed through to the scorer untouched
    pub model: String,
    pub alpha: f64,
    pub beta: f64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "HiTZ/latxa-7b-v1.2".to_string(),
            alpha: 2.733293955541733,
            beta: 0.0017859540619529915,
        }
    }
}

/// Where artifacts come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Hub endpoint (None = hf-hub default)
    pub endpoint: Option<String>,

    /// Download cache (None = `<cache_dir>/whisperlm/artifacts`)
    pub cache_dir: Option<PathBuf>,

    /// Offline mirror laid out as `<dir>/<repo_id>/<filename>`.
    /// When set, no network access happens at all.
    pub offline_dir: Option<PathBuf>,
}

/// Session fixture location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureSettings {
    /// Directory holding `<example>.mp3` and `<example>.txt`
    pub dir: PathBuf,

    /// Example used when a test does not ask for a specific one
    pub example_name: String,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("tests/fixtures"),
            example_name: "euf_07973_00797482883".to_string(),
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    /// File this configuration was loaded from, if any
    #[serde(skip)]
    pub settings_path: Option<PathBuf>,

    /// Language under test (ISO 639 short code)
    pub language: String,

    /// Acoustic model reference, e.g. "zuazo/whisper-tiny-{lang}"
    pub acoustic_model_template: String,

    /// Strip diacritics when normalizing transcripts
    pub remove_diacritics: bool,

    pub ngram: NgramSettings,
    pub llm: LlmSettings,
    pub hub: HubSettings,
    pub fixtures: FixtureSettings,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            settings_path: None,
            language: "eu".to_string(),
            acoustic_model_template: "zuazo/whisper-tiny-{lang}".to_string(),
            remove_diacritics: true,
            ngram: NgramSettings::default(),
            llm: LlmSettings::default(),
            hub: HubSettings::default(),
            fixtures: FixtureSettings::default(),
        }
    }
}

impl EvalSettings {
    /// Load settings from the default location, falling back to defaults.
    ///
    /// Environment overrides (`WHISPERLM_LANG`, `HF_ENDPOINT`) are applied
    /// after the file is read. The result is validated.
    pub fn load() -> Result<Self> {
        let path = whisperlm_paths::get_settings_path()
            .map_err(|e| EvalError::config(format!("Failed to locate settings file: {e:#}")))?;

        let mut settings = if path.exists() {
            Self::load_from(&path)?
        } else {
            debug!(path = %path.display(), "no settings file, using defaults");
            Self::default()
        };

        settings.apply_overrides(
            std::env::var(LANG_ENV).ok(),
            std::env::var(ENDPOINT_ENV).ok(),
        );
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from a specific TOML file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EvalError::config(format!("Failed to read settings {}: {e}", path.display()))
        })?;

        let mut settings: EvalSettings = toml::from_str(&contents).map_err(|e| {
            EvalError::config(format!("Failed to parse settings {}: {e}", path.display()))
        })?;
        settings.settings_path = Some(path.to_path_buf());
        settings.validate()?;

        info!(path = %path.display(), language = %settings.language, "settings loaded");
        Ok(settings)
    }

    /// Write settings as TOML to `path`, creating parent directories.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| EvalError::config(format!("Failed to serialize settings: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Replace language and hub endpoint when overrides are given.
    /// Empty overrides are ignored.
    pub fn apply_overrides(&mut self, language: Option<String>, endpoint: Option<String>) {
        if let Some(lang) = language.filter(|l| !l.trim().is_empty()) {
            self.language = lang.trim().to_string();
        }
        if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
            self.hub.endpoint = Some(endpoint.trim().to_string());
        }
    }

    /// Reject malformed settings before anything downstream uses them.
    pub fn validate(&self) -> Result<()> {
        LanguageCode::parse(&self.language)?;

        for (name, template) in [
            ("acoustic_model_template", &self.acoustic_model_template),
            ("ngram.filename_template", &self.ngram.filename_template),
        ] {
            if !template.contains(LANG_PLACEHOLDER) {
                return Err(EvalError::config(format!(
                    "{name} must contain the {LANG_PLACEHOLDER} placeholder: {template:?}"
                )));
            }
        }

        if self.ngram.repo_id.trim().is_empty() {
            return Err(EvalError::config("ngram.repo_id is empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(EvalError::config("llm.model is empty"));
        }
        if self.fixtures.example_name.trim().is_empty() {
            return Err(EvalError::config("fixtures.example_name is empty"));
        }

        self.ngram_weights()?;
        self.llm_weights()?;
        Ok(())
    }

    pub fn ngram_weights(&self) -> Result<FusionWeights> {
        FusionWeights::new(self.ngram.alpha, self.ngram.beta)
    }

    pub fn llm_weights(&self) -> Result<FusionWeights> {
        FusionWeights::new(self.llm.alpha, self.llm.beta)
    }
}

/// Interpolate a language code into a naming template.
pub fn render_template(template: &str, lang: &LanguageCode) -> String {
    template.replace(LANG_PLACEHOLDER, lang.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = EvalSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.language, "eu");
        assert_eq!(settings.fixtures.example_name, "euf_07973_00797482883");
        assert!(settings.hub.offline_dir.is_none());
    }

    #[test]
    fn test_template_rendering() {
        let lang = LanguageCode::parse("gl").unwrap();
        assert_eq!(
            render_template("zuazo/whisper-tiny-{lang}", &lang),
            "zuazo/whisper-tiny-gl"
        );
        assert_eq!(render_template("5gram-{lang}.bin", &lang), "5gram-gl.bin");
    }

    #[test]
    fn test_template_without_placeholder_is_rejected() {
        let mut settings = EvalSettings::default();
        settings.acoustic_model_template = "zuazo/whisper-tiny".to_string();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
        assert!(err.to_string().contains("acoustic_model_template"));
    }

    #[test]
    fn test_non_finite_weights_are_rejected() {
        let mut settings = EvalSettings::default();
        settings.llm.beta = f64::NAN;
        assert!(matches!(
            settings.validate(),
            Err(EvalError::Configuration(_))
        ));
    }

    #[test]
    fn test_overrides_replace_language_and_endpoint() {
        let mut settings = EvalSettings::default();
        settings.apply_overrides(Some(" es ".to_string()), Some("http://localhost:8080".into()));
        assert_eq!(settings.language, "es");
        assert_eq!(settings.hub.endpoint.as_deref(), Some("http://localhost:8080"));

        settings.apply_overrides(Some(String::new()), None);
        assert_eq!(settings.language, "es");
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("eval.toml");
        std::fs::write(
            &path,
            "language = \"ca\"\n\n[ngram]\nalpha = 0.5\n",
        )
        .unwrap();

        let settings = EvalSettings::load_from(&path).unwrap();
        assert_eq!(settings.language, "ca");
        assert_eq!(settings.ngram.alpha, 0.5);
        assert_eq!(settings.ngram.repo_id, "HiTZ/whisper-lm-ngrams");
        assert_eq!(settings.settings_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_save_then_load_preserves_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("eval.toml");

        let mut settings = EvalSettings::default();
        settings.hub.offline_dir = Some(PathBuf::from("/srv/mirror"));
        settings.save_to(&path).unwrap();

        let mut loaded = EvalSettings::load_from(&path).unwrap();
        loaded.settings_path = None;
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_invalid_language_in_file_fails_to_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("eval.toml");
        std::fs::write(&path, "language = \"Basque\"\n").unwrap();

        let err = EvalSettings::load_from(&path).unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
    }
}
