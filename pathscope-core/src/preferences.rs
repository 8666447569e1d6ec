//! Persisted user preferences
//!
//! The only preference today is the repository used for the last run, kept in
//! `$XDG_STATE_HOME/pathscope/preferences.toml`.

use crate::config::{Config, RunConfig};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Repository most recently passed to a successful start-run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_repo: Option<String>,
}

impl Preferences {
    /// Load from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Config::preferences_path())
    }

    /// Load from `path`. A missing file yields empty preferences.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No preferences file");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Preferences(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        toml::from_str(&content).map_err(|e| {
            Error::Preferences(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Config::preferences_path())
    }

    /// Write to `path` via a sibling temp file and rename.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string(self)
            .map_err(|e| Error::Preferences(format!("failed to serialize: {}", e)))?;

        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;

        tracing::debug!(path = %path.display(), "Saved preferences");
        Ok(())
    }

    /// Record `repo` as the last-used repository
    pub fn remember_repo(&mut self, repo: &str) {
        self.last_repo = Some(repo.to_string());
    }
}

/// Repository for a new run: explicit argument, then the saved preference,
/// then the configured default.
pub fn resolve_repo(explicit: Option<&str>, prefs: &Preferences, config: &RunConfig) -> String {
    explicit
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .or_else(|| prefs.last_repo.as_deref())
        .unwrap_or(config.default_repo.as_str())
        .to_string()
}
