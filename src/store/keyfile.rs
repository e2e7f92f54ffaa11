//! Master key file lifecycle.
//!
//! The key file holds the 32-byte master secret and the 16-byte key
//! derivation salt, hex-encoded one per line. It is created with
//! owner-only permissions on first use and validated on every load: a key
//! file readable by group or other principals fails fast with
//! `StoreError::KeyPermission` instead of being silently trusted. Key
//! material is never logged and is wiped from memory on drop.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{StoreError, StoreResult};
use crate::store::crypto::{generate_salt, KEY_LENGTH, SALT_LENGTH};

/// Master secret plus derivation salt; wiped on drop.
pub struct MasterKey {
    master: [u8; KEY_LENGTH],
    salt: [u8; SALT_LENGTH],
}

impl MasterKey {
    pub fn master(&self) -> &[u8; KEY_LENGTH] {
        &self.master
    }

    pub fn salt(&self) -> &[u8; SALT_LENGTH] {
        &self.salt
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.master.zeroize();
        self.salt.zeroize();
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("master", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

/// Load an existing key file, validating its permissions first.
pub fn load(path: &Path) -> StoreResult<MasterKey> {
    check_permissions(path)?;

    let mut contents = std::fs::read_to_string(path)?;
    let parsed = parse(&contents);
    contents.zeroize();

    parsed.ok_or_else(|| {
        StoreError::Encryption(format!("malformed key file: {}", path.display()))
    })
}

/// Load the key file, generating a fresh one with owner-only permissions
/// if it does not exist yet.
pub fn load_or_create(path: &Path) -> StoreResult<MasterKey> {
    if path.exists() {
        return load(path);
    }
    match create(path) {
        Ok(key) => Ok(key),
        // Another process won the creation race; use its key.
        Err(StoreError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => load(path),
        Err(e) => Err(e),
    }
}

/// Fail fast if the key file is readable or writable by group/other.
pub fn check_permissions(path: &Path) -> StoreResult<()> {
    let metadata = std::fs::metadata(path)?;
    let mode = metadata.permissions().mode();
    if mode & 0o077 != 0 {
        return Err(StoreError::KeyPermission(format!(
            "{} has mode {:o}, expected owner-only access",
            path.display(),
            mode & 0o777
        )));
    }
    Ok(())
}

fn create(path: &Path) -> StoreResult<MasterKey> {
    let mut master = [0u8; KEY_LENGTH];
    rand::thread_rng().fill_bytes(&mut master);
    let salt = generate_salt();

    let mut contents = format!("{}\n{}\n", hex::encode(master), hex::encode(salt));

    // create_new keeps first-use semantics race-free; the mode applies at
    // creation so the file is never observable with open permissions.
    let result = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .and_then(|mut file| {
            file.write_all(contents.as_bytes())?;
            file.sync_all()
        });
    contents.zeroize();
    result?;

    tracing::info!("Generated new key file at {}", path.display());
    Ok(MasterKey { master, salt })
}

fn parse(contents: &str) -> Option<MasterKey> {
    let mut lines = contents.lines();
    let mut master_bytes = hex::decode(lines.next()?.trim()).ok()?;
    let mut salt_bytes = hex::decode(lines.next()?.trim()).ok()?;
    if master_bytes.len() != KEY_LENGTH || salt_bytes.len() != SALT_LENGTH {
        master_bytes.zeroize();
        salt_bytes.zeroize();
        return None;
    }

    let mut master = [0u8; KEY_LENGTH];
    let mut salt = [0u8; SALT_LENGTH];
    master.copy_from_slice(&master_bytes);
    salt.copy_from_slice(&salt_bytes);
    master_bytes.zeroize();
    salt_bytes.zeroize();

    Some(MasterKey { master, salt })
}
