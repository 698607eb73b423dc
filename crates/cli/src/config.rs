//! Optional `datarec.toml` settings.
//!
//! Values are layered as CLI flag > environment > file > built-in default. Resolved values are
//! exported as `DATAREC_*` variables so the library crates read one source.

use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub(crate) const DEFAULT_CONFIG_FILE: &str = "datarec.toml";
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8000";

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct EmbeddingSection {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ServerSection {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub public: Option<bool>,
    #[serde(default)]
    pub log_queries: Option<bool>,
}

impl FileConfig {
    /// Reads `explicit` when given (it must exist), else `./datarec.toml` when present.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub(crate) fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// First present value among flag, environment and file.
pub(crate) fn layered(
    flag: Option<String>,
    env_value: Option<String>,
    file: Option<String>,
) -> Option<String> {
    flag.or(env_value.filter(|v| !v.trim().is_empty()))
        .or(file)
}

/// Resolves one setting and exports it to `var` when any layer provides it.
pub(crate) fn export_layered(var: &str, flag: Option<String>, file: Option<String>) {
    if let Some(value) = layered(flag, env::var(var).ok(), file) {
        env::set_var(var, value);
    }
}

pub(crate) fn path_string(path: Option<&PathBuf>) -> Option<String> {
    path.map(|p| p.to_string_lossy().into_owned())
}
