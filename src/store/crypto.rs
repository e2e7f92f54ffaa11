//! Authenticated encryption for the credential blob.
//!
//! AES-256-GCM with a key derived from the key-file master secret via
//! PBKDF2-HMAC-SHA256. Every encryption uses a fresh random nonce; nonce
//! and ciphertext are carried in the envelope as base64 strings. Any
//! tampering or corruption surfaces at decryption time as a
//! `StoreError::Decryption`, never as silently wrong plaintext.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{StoreError, StoreResult};
use crate::store::model::{EncryptedVault, VAULT_VERSION};

/// Key length in bytes (256 bits for AES-256)
pub const KEY_LENGTH: usize = 32;

/// Nonce length in bytes (96 bits for AES-GCM)
pub const NONCE_LENGTH: usize = 12;

/// Salt length in bytes for key derivation
pub const SALT_LENGTH: usize = 16;

/// AEAD key derived from the master secret; wiped on drop.
pub struct BlobKey {
    key: [u8; KEY_LENGTH],
    iterations: u32,
}

impl BlobKey {
    /// Derive the blob key with PBKDF2-HMAC-SHA256 over the master secret
    /// and the key-file salt.
    pub fn derive(master: &[u8; KEY_LENGTH], salt: &[u8; SALT_LENGTH], iterations: u32) -> Self {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(master, salt, iterations, &mut key);
        Self { key, iterations }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Drop for BlobKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobKey")
            .field("key", &"[REDACTED]")
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// Encrypt the serialized archive into an on-disk envelope.
pub fn encrypt_blob(key: &BlobKey, plaintext: &[u8]) -> StoreResult<EncryptedVault> {
    // Generate random nonce
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key.key)
        .map_err(|e| StoreError::Encryption(format!("failed to create cipher: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StoreError::Encryption(format!("encryption failed: {}", e)))?;

    Ok(EncryptedVault {
        version: VAULT_VERSION,
        kdf_iterations: key.iterations,
        nonce: BASE64.encode(nonce_bytes),
        ciphertext: BASE64.encode(&ciphertext),
    })
}

/// Decrypt and authenticate an envelope, returning the serialized archive.
/// The returned buffer is wiped when dropped.
pub fn decrypt_blob(key: &BlobKey, envelope: &EncryptedVault) -> StoreResult<Zeroizing<Vec<u8>>> {
    if envelope.version != VAULT_VERSION {
        return Err(StoreError::Decryption(format!(
            "unsupported envelope version: {} (expected {})",
            envelope.version, VAULT_VERSION
        )));
    }

    let nonce_bytes = BASE64
        .decode(&envelope.nonce)
        .map_err(|_| StoreError::Decryption("invalid nonce encoding".to_string()))?;
    if nonce_bytes.len() != NONCE_LENGTH {
        return Err(StoreError::Decryption(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LENGTH,
            nonce_bytes.len()
        )));
    }

    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .map_err(|_| StoreError::Decryption("invalid ciphertext encoding".to_string()))?;

    let cipher = Aes256Gcm::new_from_slice(&key.key)
        .map_err(|e| StoreError::Decryption(format!("failed to create cipher: {}", e)))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| StoreError::Decryption("invalid key or corrupted data".to_string()))?;

    Ok(Zeroizing::new(plaintext))
}

/// Generate a random key-derivation salt.
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
