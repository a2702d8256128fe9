use callscope_explain::{ExplainerOptions, ProviderConfig};
use callscope_graph::ClassvizOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_LLM_URL: &str = "CALLSCOPE_LLM_URL";
pub const ENV_LLM_MODEL: &str = "CALLSCOPE_LLM_MODEL";
pub const ENV_LLM_KEY: &str = "CALLSCOPE_LLM_KEY";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub autoplay_interval_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            autoplay_interval_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub classviz: ClassvizOptions,
    pub explainer: ExplainerOptions,
    pub playback: PlaybackSettings,
}

impl Settings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&content).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Defaults when `path` is `None`, with environment overrides applied in
    /// both cases.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(settings)
    }

    /// Override the provider from `CALLSCOPE_LLM_*` variables. Empty values
    /// are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let provider: &mut ProviderConfig = &mut self.explainer.provider;
        for (name, field) in [
            (ENV_LLM_URL, &mut provider.url),
            (ENV_LLM_MODEL, &mut provider.model),
            (ENV_LLM_KEY, &mut provider.key),
        ] {
            if let Some(value) = lookup(name).filter(|value| !value.trim().is_empty()) {
                *field = value;
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
