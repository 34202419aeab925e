use std::{
    fmt, fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

/// Key material used to seal ballots.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key io error: {0}")]
    Io(String),
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides the store key. Once a key exists it must be returned unchanged for
/// the lifetime of the store, or previously sealed ballots become unreadable.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Key persisted as base64 in a file, created exactly once.
///
/// The key is loaded on first use and cached for the life of the provider.
/// First-time creation goes through a temp file that is linked into place
/// only if no key file exists yet, so concurrent creators converge on one key.
pub struct FileKeyProvider {
    path: PathBuf,
    cached: OnceCell<KeyMaterial>,
}

impl FileKeyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KeyProvider for FileKeyProvider {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        self.cached
            .get_or_try_init(|| async { load_or_create_file(&self.path) })
            .await
            .cloned()
    }
}

fn load_or_create_file(path: &Path) -> Result<KeyMaterial, KeyError> {
    match fs::read_to_string(path) {
        Ok(secret) => {
            debug!("loaded existing key");
            return decode_key(secret.trim());
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(io_err(err)),
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_err)?;

    let material = generate_key();
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(encode_key(&material).as_bytes())
        .map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            info!("generated new ballot key");
            Ok(material)
        }
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            // Lost the creation race; adopt the key that won.
            debug!("key created concurrently, reloading");
            let secret = fs::read_to_string(path).map_err(io_err)?;
            decode_key(secret.trim())
        }
        Err(err) => Err(io_err(err.error)),
    }
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the key.
pub struct KeyringProvider {
    service: String,
    account: String,
    cached: OnceCell<KeyMaterial>,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            cached: OnceCell::new(),
        }
    }

    fn load_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;

        match entry.get_password() {
            Ok(secret) => decode_key(&secret),
            Err(keyring::Error::NoEntry) => {
                let material = generate_key();
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                info!(service = %self.service, "generated new ballot key in keyring");
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        self.cached
            .get_or_try_init(|| async { self.load_or_create() })
            .await
            .cloned()
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

impl InMemoryKeyProvider {
    /// Provider that always hands out `material`.
    pub fn with_material(material: KeyMaterial) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(material))),
        }
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

/// Fresh random key from the OS generator.
pub fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: "ballot-key".to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != 32 {
        return Err(KeyError::Decode(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        id: "ballot-key".to_string(),
        bytes: out,
    })
}

fn io_err(err: std::io::Error) -> KeyError {
    KeyError::Io(err.to_string())
}
