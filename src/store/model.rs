//! Data model: credential records, the decrypted archive, and the
//! encrypted on-disk envelope.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Current envelope version. Bump only with a migration path.
pub const VAULT_VERSION: u32 = 1;

/// A single named credential.
///
/// The secret is wiped from memory when the record is dropped and never
/// appears in `Debug` output. Optional metadata travels inside the
/// encrypted envelope alongside the secret.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialRecord {
    #[zeroize(skip)]
    pub name: String,

    /// Plaintext secret bytes; stored base64-encoded inside the encrypted
    /// archive, never on disk in the clear.
    #[serde(with = "base64_bytes")]
    pub secret: Vec<u8>,

    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,

    #[zeroize(skip)]
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("name", &self.name)
            .field("secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("url", &self.url)
            .field("notes", &self.notes)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Optional metadata attached to a credential at `put` time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialMetadata {
    pub username: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

/// Partial update applied to an existing record. `None` fields are left
/// untouched; at least one field must be set.
#[derive(Clone, Default)]
pub struct RecordUpdate {
    pub secret: Option<Vec<u8>>,
    pub username: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.secret.is_none()
            && self.username.is_none()
            && self.url.is_none()
            && self.notes.is_none()
    }
}

impl fmt::Debug for RecordUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordUpdate")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("url", &self.url)
            .field("notes", &self.notes)
            .finish()
    }
}

/// Metadata-only view of a record, safe to return from listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CredentialRecord> for CredentialEntry {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            name: record.name.clone(),
            username: record.username.clone(),
            url: record.url.clone(),
            notes: record.notes.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// The decrypted record set. Lives in memory only, for the duration of a
/// single operation; the map is keyed by record name so listings come out
/// in deterministic lexicographic order.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VaultArchive {
    pub records: BTreeMap<String, CredentialRecord>,
}

impl VaultArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&CredentialRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Insert or overwrite, keyed by the record's own name.
    pub fn insert(&mut self, record: CredentialRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn remove(&mut self, name: &str) -> Option<CredentialRecord> {
        self.records.remove(name)
    }

    /// All credential names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    /// Metadata-only entries in lexicographic name order.
    pub fn entries(&self) -> Vec<CredentialEntry> {
        self.records.values().map(CredentialEntry::from).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Encrypted on-disk envelope. Everything inside `ciphertext` (records,
/// metadata, timestamps) is opaque until authenticated decryption
/// succeeds; the envelope itself carries only what decryption needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedVault {
    pub version: u32,
    /// PBKDF2 iteration count the blob key was derived with.
    pub kdf_iterations: u32,
    /// Base64-encoded 12-byte AES-GCM nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext plus authentication tag.
    pub ciphertext: String,
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
