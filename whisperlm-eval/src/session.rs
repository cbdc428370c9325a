//! Session-scoped evaluation fixtures
//!
//! An [`EvaluationSession`] is built once per test session and handed to
//! tests by reference. Examples are loaded on first request and shared
//! afterwards; the expensive audio decode happens at most once per example.
//! The session is single-threaded (`Rc`/`RefCell`) and not meant to be
//! shared across test threads.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, info};

use crate::audio::{AudioLoader, FileAudioLoader};
use crate::error::{EvalError, Result};
use crate::settings::FixtureSettings;

/// Audio extensions probed for an example, in order of preference
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg"];

/// One audio clip with its reference transcript
#[derive(Debug)]
pub struct EvaluationExample {
    name: String,
    audio_path: PathBuf,
    reference_text: String,
    audio: OnceCell<Vec<f32>>,
}

impl EvaluationExample {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(
        name: S,
        audio_path: P,
        reference_text: &str,
    ) -> Self {
        Self {
            name: name.into(),
            audio_path: audio_path.into(),
            reference_text: reference_text.trim().to_string(),
            audio: OnceCell::new(),
        }
    }

    /// Load `<name>.txt` and locate `<name>.{mp3,wav,flac,ogg}` in
    /// `fixtures_dir`.
    ///
    /// The transcript is read eagerly; audio is decoded on first use.
    pub fn load(fixtures_dir: &Path, name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(EvalError::fixture("example name is empty"));
        }

        let txt_path = fixtures_dir.join(format!("{name}.txt"));
        let reference_text = std::fs::read_to_string(&txt_path).map_err(|e| {
            EvalError::fixture(format!(
                "Failed to read reference transcript {}: {e}",
                txt_path.display()
            ))
        })?;

        let audio_path = AUDIO_EXTENSIONS
            .iter()
            .map(|ext| fixtures_dir.join(format!("{name}.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                EvalError::fixture(format!(
                    "No audio file for example {name} in {}",
                    fixtures_dir.display()
                ))
            })?;

        debug!(name, audio = %audio_path.display(), "example located");
        Ok(Self::new(name, audio_path, &reference_text))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn audio_path(&self) -> &Path {
        &self.audio_path
    }

    /// Trimmed contents of the transcript file
    pub fn reference_text(&self) -> &str {
        &self.reference_text
    }

    /// Decoded samples, loaded with `loader` on the first call and cached.
    ///
    /// A failed load caches nothing, so a later call retries.
    pub fn audio(&self, loader: &dyn AudioLoader) -> Result<&[f32]> {
        if let Some(samples) = self.audio.get() {
            return Ok(samples.as_slice());
        }

        let samples = loader.load(&self.audio_path)?;
        info!(name = %self.name, samples = samples.len(), "example audio decoded");
        Ok(self.audio.get_or_init(|| samples).as_slice())
    }

    pub fn is_audio_loaded(&self) -> bool {
        self.audio.get().is_some()
    }
}

/// Session-wide example cache
pub struct EvaluationSession {
    fixtures_dir: PathBuf,
    default_example: String,
    loader: Box<dyn AudioLoader>,
    examples: RefCell<HashMap<String, Rc<EvaluationExample>>>,
}

impl EvaluationSession {
    pub fn new<P: Into<PathBuf>>(fixtures_dir: P, default_example: &str) -> Self {
        Self::with_loader(fixtures_dir, default_example, Box::new(FileAudioLoader))
    }

    pub fn with_loader<P: Into<PathBuf>>(
        fixtures_dir: P,
        default_example: &str,
        loader: Box<dyn AudioLoader>,
    ) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
            default_example: default_example.to_string(),
            loader,
            examples: RefCell::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &FixtureSettings) -> Self {
        Self::new(settings.dir.clone(), &settings.example_name)
    }

    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures_dir
    }

    /// Example `name`, loaded on first request and shared afterwards.
    pub fn example(&self, name: &str) -> Result<Rc<EvaluationExample>> {
        if let Some(example) = self.examples.borrow().get(name) {
            return Ok(Rc::clone(example));
        }

        let example = Rc::new(EvaluationExample::load(&self.fixtures_dir, name)?);
        self.examples
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&example));
        Ok(example)
    }

    pub fn default_example(&self) -> Result<Rc<EvaluationExample>> {
        self.example(&self.default_example)
    }

    /// Decoded audio of `example` using the session's loader.
    pub fn audio<'e>(&self, example: &'e EvaluationExample) -> Result<&'e [f32]> {
        example.audio(self.loader.as_ref())
    }

    /// Number of examples loaded so far
    pub fn cached_examples(&self) -> usize {
        self.examples.borrow().len()
    }
}
