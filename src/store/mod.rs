//! Encrypted credential storage.
//!
//! Provides an authenticated, at-rest-encrypted store for named
//! credentials (API keys, passwords, tokens) with an append-only audit
//! trail.
//!
//! ## On-disk layout
//!
//! ```text
//! ~/.passvault/
//! ├── vault.key       # Master key + KDF salt (0600, never leaves disk)
//! ├── vault.enc       # All records, one AES-256-GCM blob
//! ├── vault.enc.bak   # Previous blob generation
//! ├── vault.lock      # Advisory lock for mutations
//! └── audit.log       # Append-only operation trail (no secrets)
//! ```
//!
//! The blob is replaced atomically (temp write, fsync, rename), so any
//! file a reader manages to open is a complete, decryptable generation.
//!
//! ## Usage
//!
//! ```ignore
//! let mut store = CredentialStore::open(Config::from_env()?)?;
//!
//! // First put creates the key file and the blob.
//! store.put("github", b"S3cr3t!", CredentialMetadata::default())?;
//!
//! // Secrets come back decrypted; nothing else ever sees plaintext.
//! let record = store.get("github")?;
//!
//! // Names only; the blob stays sealed.
//! for name in store.list()? {
//!     println!("{}", name);
//! }
//! ```

mod audit;
mod crypto;
mod generate;
mod keyfile;
mod model;
mod store;

pub use audit::{AuditEntry, AuditLog, AuditOperation};
pub use generate::{generate_secret, CharsetOptions};
pub use model::{
    CredentialEntry, CredentialMetadata, CredentialRecord, EncryptedVault, RecordUpdate,
    VaultArchive,
};
pub use store::{CredentialStore, StoreState};
