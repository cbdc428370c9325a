//! Cross-platform path utilities for the Whisper-LM evaluation harness.
//!
//! Every directory the harness writes to is resolved here, so test sessions,
//! the CLI and the artifact cache agree on where things live.
//!
//! # Platform Behavior
//!
//! | Platform | Cache Directory | Config Directory |
//! |----------|-----------------|------------------|
//! | Linux    | `~/.cache/whisperlm` | `~/.config/whisperlm` |
//! | macOS    | `~/Library/Caches/whisperlm` | `~/Library/Application Support/whisperlm` |
//! | Windows  | `%LOCALAPPDATA%/whisperlm` | `%APPDATA%/whisperlm` |

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Errors specific to path operations.
#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not determine cache directory")]
    NoCacheDirectory,

    #[error("Could not determine config directory")]
    NoConfigDirectory,

    #[error("Path exists but is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Application identifier used in path construction.
const APP_NAME: &str = "whisperlm";

/// Name of the settings file inside the config directory.
const SETTINGS_FILE_NAME: &str = "eval.toml";

/// Create `dir` (and parents) if missing.
///
/// Fails if the path exists but is something other than a directory.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(PathError::NotADirectory(dir.to_path_buf()).into());
        }
        return Ok(());
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
    }

    Ok(())
}

/// Get the application cache directory, creating it if needed.
///
/// # Platform Behavior
/// - **Linux**: `$XDG_CACHE_HOME/whisperlm` or `~/.cache/whisperlm`
/// - **macOS**: `~/Library/Caches/whisperlm`
/// - **Windows**: `%LOCALAPPDATA%/whisperlm`
pub fn get_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir().ok_or(PathError::NoCacheDirectory)?;
    let cache_dir = base.join(APP_NAME);
    ensure_dir(&cache_dir)?;
    Ok(cache_dir)
}

/// Get the artifact cache directory (model weights, n-gram tables).
///
/// # Platform Behavior
/// - All platforms: `<cache_dir>/artifacts`
pub fn get_artifact_cache_dir() -> Result<PathBuf> {
    let artifacts = get_cache_dir()?.join("artifacts");
    ensure_dir(&artifacts)?;
    Ok(artifacts)
}

/// Get the configuration directory.
///
/// Unlike the cache directories this is not created eagerly: a missing
/// config directory simply means "use defaults".
pub fn get_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or(PathError::NoConfigDirectory)?;
    Ok(base.join(APP_NAME))
}

/// Get the path of the settings file (`<config_dir>/eval.toml`).
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(SETTINGS_FILE_NAME))
}
