//! Persistence for lightweight session preferences.
//!
//! A single JSON file, written whole on every change. Missing is not an
//! error; unreadable is, and the caller decides how to fall back.

use std::path::Path;

use byline_core::ThemeMode;
use serde::{Deserialize, Serialize};

/// On-disk shape of the preference file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPreferences {
    pub theme: ThemeMode,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Read preferences. `Ok(None)` when nothing has been written yet.
pub fn load(path: &Path) -> Result<Option<PersistedPreferences>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let preferences = serde_json::from_str::<PersistedPreferences>(&contents)?;
    Ok(Some(preferences))
}

pub fn save(path: &Path, preferences: &PersistedPreferences) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(preferences)?;
    std::fs::write(path, contents)?;
    Ok(())
}
