//! Error types for credential store operations

use thiserror::Error;

/// Errors that can occur during credential store operations.
///
/// Every error is terminal for the call that raised it; the store never
/// retries internally except for lock acquisition, which polls until the
/// configured timeout and then surfaces [`StoreError::LockTimeout`].
/// A blob that fails to parse or to authenticate is reported as
/// [`StoreError::Decryption`] and left untouched, never patched up.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Credential not found: {0}")]
    NotFound(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Key file permissions too open: {0}")]
    KeyPermission(String),

    #[error("Timed out waiting for store lock after {0} ms")]
    LockTimeout(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
