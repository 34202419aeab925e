use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ballotbox_core::EncryptedBallot;
use thiserror::Error;

use crate::key_provider::KeyMaterial;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("cipher init failed: {0}")]
    Init(String),
    #[error("encrypt failed: {0}")]
    Encrypt(String),
    #[error("{field} decode failed: {reason}")]
    Decode { field: &'static str, reason: String },
    #[error("decrypt failed: {0}")]
    Decrypt(String),
}

/// Seals and opens ballots with the store key. Every seal draws a fresh
/// random nonce, so equal plaintexts never produce equal ciphertexts.
pub struct BallotCipher {
    cipher: Aes256Gcm,
}

impl BallotCipher {
    pub fn new(material: &KeyMaterial) -> Result<Self, CipherError> {
        let cipher = Aes256Gcm::new_from_slice(&material.bytes)
            .map_err(|e| CipherError::Init(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<EncryptedBallot, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        Ok(EncryptedBallot {
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        })
    }

    pub fn open(&self, ballot: &EncryptedBallot) -> Result<Vec<u8>, CipherError> {
        let nonce_bytes =
            URL_SAFE_NO_PAD
                .decode(&ballot.nonce)
                .map_err(|e| CipherError::Decode {
                    field: "nonce",
                    reason: e.to_string(),
                })?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::Decode {
                field: "nonce",
                reason: format!("expected {NONCE_LEN} bytes, got {}", nonce_bytes.len()),
            });
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            URL_SAFE_NO_PAD
                .decode(&ballot.ciphertext)
                .map_err(|e| CipherError::Decode {
                    field: "ciphertext",
                    reason: e.to_string(),
                })?;

        self.cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}
