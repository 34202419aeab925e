use std::path::PathBuf;

use async_trait::async_trait;
use ballotbox_service::{BallotStore, BallotStoreConfig};
use ballotbox_storage::{
    json_file_store::JsonFileRecordStore,
    key_provider::{FileKeyProvider, KeyError, KeyMaterial, KeyProvider, KeyringProvider},
};
use color_eyre::Result;
use tracing::debug;

use crate::config::{Config, KeyBackend};

const KEYRING_SERVICE: &str = "ballotbox";
const KEYRING_ACCOUNT: &str = "ballot-key";

/// Key source selected by configuration.
pub enum ConfiguredKeys {
    File(FileKeyProvider),
    Keyring(KeyringProvider),
}

#[async_trait]
impl KeyProvider for ConfiguredKeys {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        match self {
            ConfiguredKeys::File(provider) => provider.get_or_create().await,
            ConfiguredKeys::Keyring(provider) => provider.get_or_create().await,
        }
    }
}

pub type CliStore = BallotStore<JsonFileRecordStore, ConfiguredKeys>;

pub fn records_from_config(config: &Config) -> Result<JsonFileRecordStore> {
    let root = config.data_dir()?;
    debug!(?root, "initializing record store");
    Ok(JsonFileRecordStore::new(root))
}

pub fn keys_from_config(config: &Config) -> Result<ConfiguredKeys> {
    Ok(match config.key_backend() {
        KeyBackend::File => {
            let path = config.key_path(&config.data_dir()?);
            debug!(?path, "using file key provider");
            ConfiguredKeys::File(FileKeyProvider::new(path))
        }
        KeyBackend::Keyring => {
            debug!("using keyring key provider");
            ConfiguredKeys::Keyring(KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT))
        }
    })
}

/// Build the ballot store described by `config`.
pub fn store_from_config(config: &Config) -> Result<CliStore> {
    Ok(BallotStore::new(
        records_from_config(config)?,
        keys_from_config(config)?,
        BallotStoreConfig {
            candidates: config.candidate_set()?,
            policy: config.policy(),
        },
    ))
}

/// Directory holding voter photos.
pub fn photos_dir(config: &Config) -> Result<PathBuf> {
    Ok(config.data_dir()?.join("faces"))
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_store(
    root: impl Into<PathBuf>,
) -> BallotStore<JsonFileRecordStore, ballotbox_storage::key_provider::InMemoryKeyProvider> {
    BallotStore::new(
        JsonFileRecordStore::new(root),
        ballotbox_storage::key_provider::InMemoryKeyProvider::default(),
        BallotStoreConfig::default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backend_keeps_key_in_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };

        let keys = keys_from_config(&config).expect("keys");
        assert!(matches!(keys, ConfiguredKeys::File(_)));
        keys.get_or_create().await.expect("key");
        assert!(dir.path().join("secret.key").exists());
    }
}
