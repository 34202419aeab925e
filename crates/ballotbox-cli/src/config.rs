use std::{
    fs,
    path::{Path, PathBuf},
};

use ballotbox_core::{CandidateSet, EligibilityPolicy};
use color_eyre::Result;
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};

/// User-level configuration loaded from `~/.config/ballotbox/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory (collections, key file, photos).
    pub data_dir: Option<PathBuf>,
    /// Candidates a ballot may name.
    pub candidates: Option<Vec<String>>,
    /// Whether voting requires prior registration.
    pub eligibility: Option<EligibilityPolicy>,
    /// Where the ballot key lives.
    pub key: Option<KeyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct KeyConfig {
    #[serde(default)]
    pub backend: KeyBackend,
    /// Key file location for the `file` backend.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KeyBackend {
    #[default]
    File,
    Keyring,
}

impl Config {
    /// Config with every election setting spelled out, used by `config init`.
    pub fn with_defaults() -> Self {
        Self {
            data_dir: None,
            candidates: Some(CandidateSet::default().iter().map(String::from).collect()),
            eligibility: Some(EligibilityPolicy::default()),
            key: Some(KeyConfig::default()),
        }
    }

    /// Data directory: config value, then `BALLOTBOX_DATA_DIR`, then the platform default.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        if let Ok(dir) = std::env::var("BALLOTBOX_DATA_DIR") {
            return Ok(PathBuf::from(dir));
        }
        let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
        Ok(base.join("ballotbox"))
    }

    pub fn candidate_set(&self) -> Result<CandidateSet> {
        match &self.candidates {
            Some(labels) => Ok(CandidateSet::new(labels.clone())?),
            None => Ok(CandidateSet::default()),
        }
    }

    pub fn policy(&self) -> EligibilityPolicy {
        self.eligibility.unwrap_or_default()
    }

    pub fn key_backend(&self) -> KeyBackend {
        self.key.as_ref().map(|k| k.backend).unwrap_or_default()
    }

    pub fn key_path(&self, data_dir: &Path) -> PathBuf {
        self.key
            .as_ref()
            .and_then(|k| k.path.clone())
            .unwrap_or_else(|| data_dir.join("secret.key"))
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("ballotbox").join("config.toml"))
}

/// Write `config` to `path` unless a file is already there, creating parent
/// directories as needed. Never clobbers user edits.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
