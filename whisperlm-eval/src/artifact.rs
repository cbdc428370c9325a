//! Artifact resolution: `(repo_id, filename)` to a local file path.
//!
//! Two fetchers are provided. [`HubFetcher`] downloads from the Hugging Face
//! Hub into a local cache with `hf-hub`; [`LocalArtifactStore`] serves files
//! from an offline mirror and never touches the network.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{EvalError, Result};
use crate::settings::HubSettings;

/// Resolves remote artifacts to local files.
///
/// Implementations may block on network I/O and impose no timeout of
/// their own.
pub trait ArtifactFetcher {
    fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf>;
}

/// Build the fetcher described by `settings`: the offline mirror when one
/// is configured, the hub otherwise.
pub fn fetcher_from_settings(settings: &HubSettings) -> Result<Box<dyn ArtifactFetcher>> {
    if let Some(dir) = &settings.offline_dir {
        return Ok(Box::new(LocalArtifactStore::new(dir)?));
    }
    Ok(Box::new(HubFetcher::new(settings)?))
}

/// Downloads artifacts from the Hugging Face Hub (sync API).
pub struct HubFetcher {
    api: hf_hub::api::sync::Api,
    cache_dir: PathBuf,
}

impl HubFetcher {
    pub fn new(settings: &HubSettings) -> Result<Self> {
        let cache_dir = match &settings.cache_dir {
            Some(dir) => dir.clone(),
            None => whisperlm_paths::get_artifact_cache_dir().map_err(|e| {
                EvalError::config(format!("Failed to locate artifact cache: {e:#}"))
            })?,
        };

        let mut builder = hf_hub::api::sync::ApiBuilder::new()
            .with_cache_dir(cache_dir.clone())
            .with_progress(false);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint.clone());
        }

        let api = builder
            .build()
            .map_err(|e| EvalError::config(format!("hf-hub api: {e}")))?;

        debug!(cache_dir = %cache_dir.display(), endpoint = ?settings.endpoint, "hub fetcher ready");
        Ok(Self { api, cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

impl ArtifactFetcher for HubFetcher {
    fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        check_request(repo_id, filename)?;

        info!(repo_id, filename, "resolving artifact");
        let path = self
            .api
            .model(repo_id.to_string())
            .get(filename)
            .map_err(|e| {
                warn!(repo_id, filename, "artifact download failed: {e}");
                EvalError::artifact(repo_id, filename, e.to_string())
            })?;

        verify_cached_file(repo_id, filename, &path)?;
        debug!(path = %path.display(), "artifact ready");
        Ok(path)
    }
}

/// Serves artifacts from a directory laid out as `<root>/<repo_id>/<filename>`.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(EvalError::config(format!(
                "Offline artifact directory does not exist: {}",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactFetcher for LocalArtifactStore {
    fn fetch(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        check_request(repo_id, filename)?;

        let path = self.root.join(repo_id).join(filename);
        if !path.exists() {
            return Err(EvalError::artifact(
                repo_id,
                filename,
                format!("not present in offline mirror {}", self.root.display()),
            ));
        }
        verify_cached_file(repo_id, filename, &path)?;

        debug!(path = %path.display(), "artifact served from offline mirror");
        Ok(path)
    }
}

/// Both parts must be non-empty relative paths without `..`.
fn check_request(repo_id: &str, filename: &str) -> Result<()> {
    for (what, value) in [("repo_id", repo_id), ("filename", filename)] {
        if value.trim().is_empty() {
            return Err(EvalError::config(format!("artifact {what} is empty")));
        }
        let escapes = Path::new(value)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(EvalError::config(format!(
                "artifact {what} must be a plain relative path: {value:?}"
            )));
        }
    }
    Ok(())
}

/// A cache entry that is not a readable regular file (dangling symlink,
/// directory in its place) counts as corrupted.
fn verify_cached_file(repo_id: &str, filename: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(EvalError::artifact(
            repo_id,
            filename,
            format!("cached entry is not a regular file: {}", path.display()),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn mirror() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("HiTZ").join("whisper-lm-ngrams");
        fs::create_dir_all(&repo).unwrap();
        fs::write(repo.join("5gram-eu.bin"), b"kenlm").unwrap();
        tmp
    }

    #[test]
    fn test_local_store_serves_existing_file() {
        let tmp = mirror();
        let store = LocalArtifactStore::new(tmp.path()).unwrap();

        let path = store.fetch("HiTZ/whisper-lm-ngrams", "5gram-eu.bin").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"kenlm");
    }

    #[test]
    fn test_local_store_missing_file_is_unavailable() {
        let tmp = mirror();
        let store = LocalArtifactStore::new(tmp.path()).unwrap();

        let err = store
            .fetch("HiTZ/whisper-lm-ngrams", "5gram-zz.bin")
            .unwrap_err();
        match err {
            EvalError::ArtifactUnavailable { filename, .. } => assert_eq!(filename, "5gram-zz.bin"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_in_place_of_file_is_corrupt() {
        let tmp = mirror();
        fs::create_dir_all(tmp.path().join("HiTZ/whisper-lm-ngrams/5gram-es.bin")).unwrap();
        let store = LocalArtifactStore::new(tmp.path()).unwrap();

        let err = store
            .fetch("HiTZ/whisper-lm-ngrams", "5gram-es.bin")
            .unwrap_err();
        assert!(matches!(err, EvalError::ArtifactUnavailable { .. }));
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_traversal_is_rejected() {
        let tmp = mirror();
        let store = LocalArtifactStore::new(tmp.path()).unwrap();

        for (repo, file) in [("../etc", "passwd"), ("HiTZ/x", "../../y"), ("", "a"), ("a", " ")] {
            assert!(
                matches!(store.fetch(repo, file), Err(EvalError::Configuration(_))),
                "{repo:?}/{file:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_offline_root_is_a_config_error() {
        let err = LocalArtifactStore::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
    }

    #[test]
    fn test_settings_pick_offline_store() {
        let tmp = mirror();
        let settings = HubSettings {
            offline_dir: Some(tmp.path().to_path_buf()),
            ..HubSettings::default()
        };
        let fetcher = fetcher_from_settings(&settings).unwrap();
        assert!(fetcher.fetch("HiTZ/whisper-lm-ngrams", "5gram-eu.bin").is_ok());
    }
}
