//! Error types for evaluation operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Artifact unavailable: {repo_id}/{filename}: {reason}")]
    ArtifactUnavailable {
        repo_id: String,
        filename: String,
        reason: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Audio loading error: {0}")]
    AudioLoad(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn artifact<R, F, S>(repo_id: R, filename: F, reason: S) -> Self
    where
        R: Into<String>,
        F: Into<String>,
        S: Into<String>,
    {
        Self::ArtifactUnavailable {
            repo_id: repo_id.into(),
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn audio_load<S: Into<String>>(msg: S) -> Self {
        Self::AudioLoad(msg.into())
    }

    pub fn fixture<S: Into<String>>(msg: S) -> Self {
        Self::Fixture(msg.into())
    }
}
