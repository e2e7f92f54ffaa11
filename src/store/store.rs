//! The credential store: lifecycle, operations and atomic persistence.
//!
//! Every mutation runs a full read-modify-rewrite cycle under an
//! exclusive advisory lock: decrypt the whole record set, change one
//! record, re-encrypt, write a temp file, fsync, then rename over the
//! blob. A crash between temp write and rename leaves the previous valid
//! blob untouched. Readers skip the lock and instead re-read when the
//! blob's file identity changes underneath them.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use zeroize::Zeroize;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::store::audit::{AuditEntry, AuditLog, AuditOperation};
use crate::store::crypto::{self, BlobKey};
use crate::store::generate::{self, CharsetOptions};
use crate::store::keyfile::{self, MasterKey};
use crate::store::model::{
    CredentialEntry, CredentialMetadata, CredentialRecord, EncryptedVault, RecordUpdate,
    VaultArchive,
};

const VAULT_FILE: &str = "vault.enc";
const TEMP_FILE: &str = "vault.enc.tmp";
const BACKUP_FILE: &str = "vault.enc.bak";
const KEY_FILE: &str = "vault.key";
const LOCK_FILE: &str = "vault.lock";
const AUDIT_FILE: &str = "audit.log";

/// Poll interval while waiting for the mutation lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Re-read attempts when a reader races a concurrent rename.
const READ_RETRIES: usize = 3;

/// Externally visible store states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No key file exists; nothing has been persisted.
    Uninitialized,
    /// Key file present; the blob may or may not exist yet.
    Ready,
}

struct LoadedKey {
    master: MasterKey,
    /// Derived once per process for the configured iteration count.
    blob_key: BlobKey,
}

/// Handle to a credential store rooted at a directory.
///
/// The handle owns the only loaded copy of the key material; callers get
/// decrypted records back from [`get`](Self::get) and nothing else
/// retains plaintext beyond that call. Opening validates key file
/// permissions and fails fast, but creates nothing on disk; the
/// uninitialized-to-ready transition happens on the first
/// [`put`](Self::put) or an explicit [`initialize`](Self::initialize).
pub struct CredentialStore {
    config: Config,
    audit: AuditLog,
    actor: Option<String>,
    key: Option<LoadedKey>,
}

impl CredentialStore {
    /// Open a handle on the configured directory.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyPermission` if an existing key file is
    /// readable by other principals.
    pub fn open(config: Config) -> StoreResult<Self> {
        let audit = AuditLog::new(&config.dir.join(AUDIT_FILE));
        let mut store = Self {
            config,
            audit,
            actor: None,
            key: None,
        };
        if store.key_path().exists() {
            store.load_key()?;
        }
        Ok(store)
    }

    /// Record this actor in every audit entry written through the handle.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn state(&self) -> StoreState {
        if self.key.is_some() || self.key_path().exists() {
            StoreState::Ready
        } else {
            StoreState::Uninitialized
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Explicitly transition to the ready state: create the directory,
    /// the key file and an empty blob as needed. Idempotent; existing
    /// data is never touched.
    pub fn initialize(&mut self) -> StoreResult<()> {
        let was_uninitialized = self.state() == StoreState::Uninitialized;
        self.ensure_ready()?;
        self.with_lock(|store| {
            if !store.vault_path().exists() {
                store.save_archive(&VaultArchive::new())?;
            }
            if was_uninitialized {
                store
                    .audit
                    .append(AuditOperation::Initialize, None, store.actor.as_deref())?;
            }
            Ok(())
        })
    }

    /// Insert or overwrite the record for `name`.
    ///
    /// Overwriting preserves `created_at` and bumps `updated_at`. On the
    /// first ever `put` the store initializes itself (key file and
    /// directory are created).
    pub fn put(
        &mut self,
        name: &str,
        secret: &[u8],
        metadata: CredentialMetadata,
    ) -> StoreResult<()> {
        validate_name(name)?;
        self.ensure_ready()?;
        self.with_lock(|store| {
            let mut archive = store.load_archive()?.unwrap_or_default();
            let now = Utc::now();
            let created_at = match archive.remove(name) {
                Some(existing) => existing.created_at,
                None => now,
            };
            archive.insert(CredentialRecord {
                name: name.to_string(),
                secret: secret.to_vec(),
                username: metadata.username,
                url: metadata.url,
                notes: metadata.notes,
                created_at,
                updated_at: now,
            });
            store.save_archive(&archive)?;
            store
                .audit
                .append(AuditOperation::Put, Some(name), store.actor.as_deref())
        })
    }

    /// Return the decrypted record for `name`.
    pub fn get(&mut self, name: &str) -> StoreResult<CredentialRecord> {
        validate_name(name)?;
        if !self.key_for_read()? {
            return Err(StoreError::NotFound(name.to_string()));
        }
        match self.load_archive()? {
            Some(archive) => archive
                .get(name)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(name.to_string())),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    /// Remove the record for `name`. The existence check runs before any
    /// write, so deleting an absent name never rewrites the blob.
    pub fn delete(&mut self, name: &str) -> StoreResult<()> {
        validate_name(name)?;
        if !self.key_for_read()? {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.with_lock(|store| {
            let mut archive = match store.load_archive()? {
                Some(archive) => archive,
                None => return Err(StoreError::NotFound(name.to_string())),
            };
            if archive.remove(name).is_none() {
                return Err(StoreError::NotFound(name.to_string()));
            }
            store.save_archive(&archive)?;
            store
                .audit
                .append(AuditOperation::Delete, Some(name), store.actor.as_deref())
        })
    }

    /// All credential names in lexicographic order. Secrets stay sealed.
    pub fn list(&mut self) -> StoreResult<Vec<String>> {
        if !self.key_for_read()? {
            return Ok(Vec::new());
        }
        Ok(self
            .load_archive()?
            .map(|archive| archive.names())
            .unwrap_or_default())
    }

    /// Metadata-only entries in lexicographic name order.
    pub fn list_entries(&mut self) -> StoreResult<Vec<CredentialEntry>> {
        if !self.key_for_read()? {
            return Ok(Vec::new());
        }
        Ok(self
            .load_archive()?
            .map(|archive| archive.entries())
            .unwrap_or_default())
    }

    /// Apply a partial update to an existing record and bump
    /// `updated_at`.
    pub fn update(&mut self, name: &str, update: RecordUpdate) -> StoreResult<()> {
        validate_name(name)?;
        if update.is_empty() {
            return Err(StoreError::InvalidArgument(
                "update must change at least one field".to_string(),
            ));
        }
        if !self.key_for_read()? {
            return Err(StoreError::NotFound(name.to_string()));
        }
        self.with_lock(|store| {
            let mut archive = match store.load_archive()? {
                Some(archive) => archive,
                None => return Err(StoreError::NotFound(name.to_string())),
            };
            let mut record = match archive.remove(name) {
                Some(record) => record,
                None => return Err(StoreError::NotFound(name.to_string())),
            };
            if let Some(secret) = update.secret {
                record.secret = secret;
            }
            if let Some(username) = update.username {
                record.username = Some(username);
            }
            if let Some(url) = update.url {
                record.url = Some(url);
            }
            if let Some(notes) = update.notes {
                record.notes = Some(notes);
            }
            record.updated_at = Utc::now();
            archive.insert(record);
            store.save_archive(&archive)?;
            store
                .audit
                .append(AuditOperation::Update, Some(name), store.actor.as_deref())
        })
    }

    /// Generate a random secret, falling back to the configured defaults
    /// for length and character classes.
    pub fn generate_secret(
        &self,
        length: Option<usize>,
        charset: Option<CharsetOptions>,
    ) -> StoreResult<String> {
        generate::generate_secret(
            length.unwrap_or(self.config.default_length),
            charset.unwrap_or(self.config.default_charset),
        )
    }

    /// Destroy the store: remove the blob, its backup and the key file.
    /// This is the only ready-to-uninitialized transition and it is
    /// unrecoverable. The audit log survives with a recorded entry.
    ///
    /// Also clears an orphaned blob left behind by a lost key file.
    pub fn destroy(&mut self) -> StoreResult<()> {
        let artifacts = [
            self.vault_path(),
            self.temp_path(),
            self.backup_path(),
            self.key_path(),
        ];
        if artifacts.iter().all(|path| !path.exists()) {
            return Ok(());
        }
        self.with_lock(|store| {
            for path in &artifacts {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
            store
                .audit
                .append(AuditOperation::Destroy, None, store.actor.as_deref())
        })?;
        self.key = None;
        Ok(())
    }

    /// Recent audit entries, oldest first.
    pub fn read_audit(&self, limit: Option<usize>) -> StoreResult<Vec<AuditEntry>> {
        self.audit.read_entries(limit)
    }

    // ---- paths ----

    fn vault_path(&self) -> PathBuf {
        self.config.dir.join(VAULT_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.config.dir.join(TEMP_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.config.dir.join(BACKUP_FILE)
    }

    fn key_path(&self) -> PathBuf {
        self.config.dir.join(KEY_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.config.dir.join(LOCK_FILE)
    }

    // ---- key handling ----

    fn load_key(&mut self) -> StoreResult<()> {
        let master = keyfile::load(&self.key_path())?;
        let blob_key =
            BlobKey::derive(master.master(), master.salt(), self.config.pbkdf2_iterations);
        self.key = Some(LoadedKey { master, blob_key });
        Ok(())
    }

    fn ensure_ready(&mut self) -> StoreResult<()> {
        if self.key.is_some() {
            return Ok(());
        }
        // Never mint a fresh key next to an orphaned blob; destroy() is
        // the only way to start over.
        if !self.key_path().exists() && self.vault_path().exists() {
            return Err(self.orphaned_blob_error());
        }
        self.ensure_dir()?;
        let master = keyfile::load_or_create(&self.key_path())?;
        let blob_key =
            BlobKey::derive(master.master(), master.salt(), self.config.pbkdf2_iterations);
        self.key = Some(LoadedKey { master, blob_key });
        Ok(())
    }

    /// Make the key available for a read path without creating anything.
    /// Returns false when the store is uninitialized; errors when a blob
    /// exists with no key to open it.
    fn key_for_read(&mut self) -> StoreResult<bool> {
        if self.key.is_some() {
            return Ok(true);
        }
        if self.key_path().exists() {
            self.load_key()?;
            return Ok(true);
        }
        if self.vault_path().exists() {
            return Err(self.orphaned_blob_error());
        }
        Ok(false)
    }

    fn orphaned_blob_error(&self) -> StoreError {
        StoreError::Encryption(format!(
            "key file missing at {} but an encrypted blob exists; records are unrecoverable without the original key",
            self.key_path().display()
        ))
    }

    fn loaded(&self) -> StoreResult<&LoadedKey> {
        self.key
            .as_ref()
            .ok_or_else(|| StoreError::Encryption("key material not loaded".to_string()))
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        if !self.config.dir.exists() {
            std::fs::create_dir_all(&self.config.dir)?;
            std::fs::set_permissions(&self.config.dir, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    // ---- locked mutation cycle ----

    /// Hold the exclusive advisory lock for the duration of `f`, polling
    /// up to the configured timeout before giving up.
    fn with_lock<T>(
        &self,
        f: impl FnOnce(&Self) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.ensure_dir()?;
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o600)
            .open(self.lock_path())?;

        let timeout = self.config.lock_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout(timeout.as_millis() as u64));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let result = f(self);
        let _ = lock_file.unlock();
        result
    }

    // ---- blob persistence ----

    /// Read the current blob bytes, tolerating a concurrent rename. When
    /// the file identity (device, inode) changes between open and the
    /// post-read stat, the bytes belong to a superseded generation and
    /// the read is retried; each individual read is still a complete,
    /// valid blob because replacement happens by rename.
    fn read_blob_bytes(&self) -> StoreResult<Option<Vec<u8>>> {
        let path = self.vault_path();
        let mut last: Option<Vec<u8>> = None;
        for _ in 0..READ_RETRIES {
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let opened = file.metadata()?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            last = Some(data);

            match std::fs::metadata(&path) {
                Ok(current)
                    if current.dev() == opened.dev() && current.ino() == opened.ino() =>
                {
                    return Ok(last);
                }
                Ok(_) => {
                    tracing::debug!("Credential blob replaced during read; retrying");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Credential blob removed during read; retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(last)
    }

    /// Decrypt the on-disk blob into an archive. `None` when no blob
    /// exists yet; `Decryption` when the file cannot be parsed or fails
    /// authentication.
    fn load_archive(&self) -> StoreResult<Option<VaultArchive>> {
        let bytes = match self.read_blob_bytes()? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let envelope: EncryptedVault = serde_json::from_slice(&bytes)
            .map_err(|_| StoreError::Decryption("corrupted envelope".to_string()))?;

        let key = self.loaded()?;
        let rederived;
        let blob_key = if envelope.kdf_iterations == key.blob_key.iterations() {
            &key.blob_key
        } else {
            // Blob was written under a different configured cost; derive
            // the matching key for this read.
            rederived = BlobKey::derive(
                key.master.master(),
                key.master.salt(),
                envelope.kdf_iterations,
            );
            &rederived
        };

        let plaintext = crypto::decrypt_blob(blob_key, &envelope)?;
        let archive: VaultArchive = serde_json::from_slice(&plaintext)
            .map_err(|_| StoreError::Decryption("corrupted archive".to_string()))?;
        Ok(Some(archive))
    }

    /// Encrypt and commit the archive: temp write, fsync, backup of the
    /// previous generation, then rename into place.
    fn save_archive(&self, archive: &VaultArchive) -> StoreResult<()> {
        let key = self.loaded()?;
        let mut plaintext = serde_json::to_vec(archive)
            .map_err(|e| StoreError::Encryption(format!("failed to serialize archive: {}", e)))?;
        let envelope = crypto::encrypt_blob(&key.blob_key, &plaintext);
        plaintext.zeroize();
        let envelope = envelope?;
        let data = serde_json::to_vec(&envelope)
            .map_err(|e| StoreError::Encryption(format!("failed to serialize envelope: {}", e)))?;

        let temp_path = self.temp_path();
        let mut temp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)?;
        temp.write_all(&data)?;
        temp.sync_all()?;
        drop(temp);

        let vault_path = self.vault_path();
        if vault_path.exists() {
            std::fs::copy(&vault_path, self.backup_path())?;
        }
        std::fs::rename(&temp_path, &vault_path)?;
        Ok(())
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "credential name must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::new(dir.path().join("store"));
        // Keep tests quick; the production default is much higher.
        config.pbkdf2_iterations = 1000;
        config
    }

    fn open_store(dir: &TempDir) -> CredentialStore {
        CredentialStore::open(test_config(dir)).unwrap()
    }

    fn meta_with_username(username: &str) -> CredentialMetadata {
        CredentialMetadata {
            username: Some(username.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store
            .put("github", b"S3cr3t!", meta_with_username("dev@example.com"))
            .unwrap();

        let record = store.get("github").unwrap();
        assert_eq!(record.secret, b"S3cr3t!");
        assert_eq!(record.username.as_deref(), Some("dev@example.com"));
        assert_eq!(record.updated_at, record.created_at);
    }

    #[test]
    fn test_durability_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(&dir);
            store
                .put("aws", b"AKIA-token", CredentialMetadata::default())
                .unwrap();
        }

        // Fresh handle loads key and blob from disk.
        let mut store = open_store(&dir);
        let record = store.get("aws").unwrap();
        assert_eq!(record.secret, b"AKIA-token");
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("exists", b"x", CredentialMetadata::default()).unwrap();

        let err = store.get("absent").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "absent"));
    }

    #[test]
    fn test_get_on_uninitialized_store() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert_eq!(store.state(), StoreState::Uninitialized);
        assert!(matches!(store.get("any"), Err(StoreError::NotFound(_))));
        assert!(store.list().unwrap().is_empty());
        // Reads never initialize the store.
        assert_eq!(store.state(), StoreState::Uninitialized);
    }

    #[test]
    fn test_first_put_initializes() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        assert_eq!(store.state(), StoreState::Uninitialized);

        store.put("first", b"s", CredentialMetadata::default()).unwrap();
        assert_eq!(store.state(), StoreState::Ready);

        let key_mode = std::fs::metadata(store.key_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(key_mode & 0o777, 0o600);
        let blob_mode = std::fs::metadata(store.vault_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(blob_mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(&store.config.dir)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn test_explicit_initialize() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store.initialize().unwrap();
        assert_eq!(store.state(), StoreState::Ready);
        assert!(store.vault_path().exists());
        assert!(store.list().unwrap().is_empty());

        // Idempotent: a second call leaves existing data alone.
        store.put("kept", b"v", CredentialMetadata::default()).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.list().unwrap(), vec!["kept"]);
    }

    #[test]
    fn test_overwrite_preserves_created_at() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store.put("svc", b"one", CredentialMetadata::default()).unwrap();
        let first = store.get("svc").unwrap();

        std::thread::sleep(Duration::from_millis(10));
        store.put("svc", b"two", meta_with_username("admin")).unwrap();
        let second = store.get("svc").unwrap();

        assert_eq!(second.secret, b"two");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_then_get_and_list() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store.put("a", b"1", CredentialMetadata::default()).unwrap();
        store.put("b", b"2", CredentialMetadata::default()).unwrap();

        store.delete("a").unwrap();
        assert!(matches!(store.get("a"), Err(StoreError::NotFound(_))));
        assert_eq!(store.list().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("kept", b"v", CredentialMetadata::default()).unwrap();

        let before = std::fs::read(store.vault_path()).unwrap();
        assert!(matches!(
            store.delete("absent"),
            Err(StoreError::NotFound(_))
        ));
        // Read-check failed before mutation, so the blob is untouched.
        let after = std::fs::read(store.vault_path()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_delete_on_uninitialized_never_creates_key() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert!(matches!(store.delete("x"), Err(StoreError::NotFound(_))));
        assert_eq!(store.state(), StoreState::Uninitialized);
        assert!(!store.key_path().exists());
    }

    #[test]
    fn test_list_ordered_by_name() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        for name in ["zeta", "alpha", "Mixed", "beta"] {
            store.put(name, b"s", CredentialMetadata::default()).unwrap();
        }

        // Case-sensitive lexicographic order, uppercase first.
        assert_eq!(store.list().unwrap(), vec!["Mixed", "alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_list_entries_carry_metadata_not_secrets() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .put("gh", b"hunter2", meta_with_username("dev"))
            .unwrap();

        let entries = store.list_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username.as_deref(), Some("dev"));

        let json = serde_json::to_string(&entries).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_update_partial_fields() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .put("svc", b"old-secret", meta_with_username("old-user"))
            .unwrap();
        let before = store.get("svc").unwrap();

        std::thread::sleep(Duration::from_millis(10));
        store
            .update(
                "svc",
                RecordUpdate {
                    username: Some("new-user".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let after = store.get("svc").unwrap();
        assert_eq!(after.secret, b"old-secret");
        assert_eq!(after.username.as_deref(), Some("new-user"));
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
    }

    #[test]
    fn test_update_requires_a_field() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("svc", b"v", CredentialMetadata::default()).unwrap();

        let err = store.update("svc", RecordUpdate::default()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("svc", b"v", CredentialMetadata::default()).unwrap();

        let update = RecordUpdate {
            secret: Some(b"new".to_vec()),
            ..Default::default()
        };
        assert!(matches!(
            store.update("absent", update),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        assert!(matches!(
            store.put("", b"s", CredentialMetadata::default()),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(store.get(""), Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_single_byte_corruption_detected() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .put("svc", b"the-real-secret", CredentialMetadata::default())
            .unwrap();

        // Flip one byte of the ciphertext inside the envelope.
        let raw = std::fs::read(store.vault_path()).unwrap();
        let mut envelope: EncryptedVault = serde_json::from_slice(&raw).unwrap();
        let mut ciphertext = BASE64.decode(&envelope.ciphertext).unwrap();
        let mid = ciphertext.len() / 2;
        ciphertext[mid] ^= 0x01;
        envelope.ciphertext = BASE64.encode(&ciphertext);
        std::fs::write(store.vault_path(), serde_json::to_vec(&envelope).unwrap()).unwrap();

        let err = store.get("svc").unwrap_err();
        assert!(matches!(err, StoreError::Decryption(_)));
    }

    #[test]
    fn test_garbage_blob_is_decryption_error() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("svc", b"v", CredentialMetadata::default()).unwrap();

        std::fs::write(store.vault_path(), b"not json at all").unwrap();

        assert!(matches!(
            store.get("svc"),
            Err(StoreError::Decryption(_))
        ));
        // Corruption is reported, never repaired: a further put must not
        // silently replace the damaged blob.
        assert!(matches!(
            store.put("svc", b"new", CredentialMetadata::default()),
            Err(StoreError::Decryption(_))
        ));
    }

    #[test]
    fn test_crash_between_temp_write_and_rename() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .put("svc", b"committed", CredentialMetadata::default())
            .unwrap();

        // Simulate a crash that wrote the temp file but never renamed it.
        std::fs::write(store.temp_path(), b"half-written garbage").unwrap();

        // The previous valid state is intact for a fresh process.
        let mut reopened = open_store(&dir);
        assert_eq!(reopened.get("svc").unwrap().secret, b"committed");

        // The next successful mutation replaces the leftover temp file.
        reopened
            .put("svc", b"recovered", CredentialMetadata::default())
            .unwrap();
        assert_eq!(reopened.get("svc").unwrap().secret, b"recovered");
        assert!(!reopened.temp_path().exists());
    }

    #[test]
    fn test_backup_holds_previous_generation() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store.put("svc", b"gen-1", CredentialMetadata::default()).unwrap();
        store.put("svc", b"gen-2", CredentialMetadata::default()).unwrap();

        // Restoring the backup over the blob yields the previous value.
        std::fs::copy(store.backup_path(), store.vault_path()).unwrap();
        assert_eq!(store.get("svc").unwrap().secret, b"gen-1");
    }

    #[test]
    fn test_concurrent_puts_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        // Initialize up front so both writers share one key file.
        CredentialStore::open(config.clone()).unwrap().initialize().unwrap();

        let mut handles = Vec::new();
        for writer in 0..2 {
            let config = config.clone();
            handles.push(std::thread::spawn(move || {
                let mut store = CredentialStore::open(config).unwrap();
                for i in 0..10 {
                    let secret = format!("writer-{}-round-{}", writer, i);
                    store
                        .put("shared", secret.as_bytes(), CredentialMetadata::default())
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Exactly one final value, and the blob parses cleanly.
        let mut store = CredentialStore::open(config).unwrap();
        let record = store.get("shared").unwrap();
        let value = String::from_utf8(record.secret.clone()).unwrap();
        assert!(value == "writer-0-round-9" || value == "writer-1-round-9");
        assert_eq!(store.list().unwrap(), vec!["shared"]);
    }

    #[test]
    fn test_lock_timeout_surfaces() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.lock_timeout = Duration::from_millis(100);
        let mut store = CredentialStore::open(config).unwrap();
        store.put("svc", b"v", CredentialMetadata::default()).unwrap();

        // Hold the lock from the outside while a mutation tries to run.
        let lock_file = OpenOptions::new()
            .write(true)
            .open(store.lock_path())
            .unwrap();
        lock_file.lock_exclusive().unwrap();

        let started = Instant::now();
        let err = store
            .put("svc", b"blocked", CredentialMetadata::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(100)));
        assert!(started.elapsed() >= Duration::from_millis(100));

        lock_file.unlock().unwrap();
    }

    #[test]
    fn test_readers_skip_the_lock() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("svc", b"readable", CredentialMetadata::default()).unwrap();

        let lock_file = OpenOptions::new()
            .write(true)
            .open(store.lock_path())
            .unwrap();
        lock_file.lock_exclusive().unwrap();

        // get and list complete while the mutation lock is held.
        assert_eq!(store.get("svc").unwrap().secret, b"readable");
        assert_eq!(store.list().unwrap(), vec!["svc"]);

        lock_file.unlock().unwrap();
    }

    #[test]
    fn test_loose_key_permissions_rejected_at_open() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        {
            let mut store = CredentialStore::open(config.clone()).unwrap();
            store.put("svc", b"v", CredentialMetadata::default()).unwrap();
        }

        let key_path = config.dir.join(KEY_FILE);
        let mut perms = std::fs::metadata(&key_path).unwrap().permissions();
        perms.set_mode(0o644);
        std::fs::set_permissions(&key_path, perms).unwrap();

        let result = CredentialStore::open(config);
        assert!(matches!(result, Err(StoreError::KeyPermission(_))));
    }

    #[test]
    fn test_missing_key_with_blob_is_unrecoverable() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        {
            let mut store = CredentialStore::open(config.clone()).unwrap();
            store.put("svc", b"v", CredentialMetadata::default()).unwrap();
        }

        std::fs::remove_file(config.dir.join(KEY_FILE)).unwrap();

        let mut store = CredentialStore::open(config).unwrap();
        assert!(matches!(store.get("svc"), Err(StoreError::Encryption(_))));
        assert!(matches!(store.list(), Err(StoreError::Encryption(_))));

        // Writes refuse to mint a replacement key next to the orphaned
        // blob; the blob and the evidence of key loss both survive.
        assert!(matches!(
            store.put("svc", b"new", CredentialMetadata::default()),
            Err(StoreError::Encryption(_))
        ));
        assert!(!store.key_path().exists());
        assert!(store.vault_path().exists());

        // destroy() remains the way to start over.
        store.destroy().unwrap();
        store.put("svc", b"fresh", CredentialMetadata::default()).unwrap();
        assert_eq!(store.get("svc").unwrap().secret, b"fresh");
    }

    #[test]
    fn test_unwritable_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("svc", b"v", CredentialMetadata::default()).unwrap();

        let store_dir = store.config.dir.clone();
        std::fs::set_permissions(&store_dir, std::fs::Permissions::from_mode(0o500)).unwrap();

        let err = store
            .put("svc", b"blocked", CredentialMetadata::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));

        std::fs::set_permissions(&store_dir, std::fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[test]
    fn test_destroy_wipes_data_keeps_audit() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store.put("svc", b"v", CredentialMetadata::default()).unwrap();
        store.put("svc", b"v2", CredentialMetadata::default()).unwrap();

        store.destroy().unwrap();

        assert_eq!(store.state(), StoreState::Uninitialized);
        assert!(!store.vault_path().exists());
        assert!(!store.backup_path().exists());
        assert!(!store.key_path().exists());

        let entries = store.read_audit(None).unwrap();
        assert!(!entries.is_empty());
        assert_eq!(
            entries.last().unwrap().operation,
            AuditOperation::Destroy
        );

        // A destroyed store can start over from scratch.
        store.put("svc", b"fresh", CredentialMetadata::default()).unwrap();
        assert_eq!(store.get("svc").unwrap().secret, b"fresh");
    }

    #[test]
    fn test_audit_trail_records_mutations() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir).with_actor("test-suite");

        store.put("svc", b"v", CredentialMetadata::default()).unwrap();
        store
            .update(
                "svc",
                RecordUpdate {
                    secret: Some(b"v2".to_vec()),
                    ..Default::default()
                },
            )
            .unwrap();
        store.delete("svc").unwrap();

        let entries = store.read_audit(None).unwrap();
        let ops: Vec<AuditOperation> = entries.iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            vec![
                AuditOperation::Put,
                AuditOperation::Update,
                AuditOperation::Delete
            ]
        );
        assert!(entries.iter().all(|e| e.actor.as_deref() == Some("test-suite")));
        assert!(entries.iter().all(|e| e.name.as_deref() == Some("svc")));

        // History survives the deletion of the credential itself.
        assert!(matches!(store.get("svc"), Err(StoreError::NotFound(_))));
        assert_eq!(store.read_audit(None).unwrap().len(), 3);
    }

    #[test]
    fn test_audit_log_never_contains_secrets() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .put("svc", b"super-secret-value", CredentialMetadata::default())
            .unwrap();

        let audit_raw = std::fs::read_to_string(store.audit.path()).unwrap();
        assert!(!audit_raw.contains("super-secret-value"));
    }

    #[test]
    fn test_blob_bytes_never_contain_plaintext() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .put("name-marker", b"plaintext-marker", meta_with_username("user-marker"))
            .unwrap();

        let blob = std::fs::read(store.vault_path()).unwrap();
        let blob_str = String::from_utf8_lossy(&blob);
        assert!(!blob_str.contains("plaintext-marker"));
        assert!(!blob_str.contains("user-marker"));
        assert!(!blob_str.contains("name-marker"));
    }

    #[test]
    fn test_generate_secret_uses_config_defaults() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.default_length = 24;
        let store = CredentialStore::open(config).unwrap();

        assert_eq!(store.generate_secret(None, None).unwrap().len(), 24);
        assert_eq!(store.generate_secret(Some(12), None).unwrap().len(), 12);
    }

    #[test]
    fn test_blob_written_under_other_iteration_count_still_opens() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        {
            let mut store = CredentialStore::open(config.clone()).unwrap();
            store.put("svc", b"v", CredentialMetadata::default()).unwrap();
        }

        // Same key file, different configured cost: the envelope records
        // the iterations it was written with.
        config.pbkdf2_iterations = 2000;
        let mut store = CredentialStore::open(config).unwrap();
        assert_eq!(store.get("svc").unwrap().secret, b"v");

        store.put("other", b"w", CredentialMetadata::default()).unwrap();
        assert_eq!(store.get("svc").unwrap().secret, b"v");
        assert_eq!(store.get("other").unwrap().secret, b"w");
    }
}
