//! Cryptographically random secret generation.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{StoreError, StoreResult};

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}|;:,.<>?";

/// Character classes allowed in a generated secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharsetOptions {
    pub uppercase: bool,
    pub lowercase: bool,
    pub digits: bool,
    pub symbols: bool,
}

impl Default for CharsetOptions {
    fn default() -> Self {
        Self {
            uppercase: true,
            lowercase: true,
            digits: true,
            symbols: true,
        }
    }
}

impl CharsetOptions {
    pub fn any_enabled(&self) -> bool {
        self.uppercase || self.lowercase || self.digits || self.symbols
    }

    fn enabled_classes(&self) -> Vec<&'static [u8]> {
        let mut classes = Vec::new();
        if self.lowercase {
            classes.push(LOWERCASE);
        }
        if self.uppercase {
            classes.push(UPPERCASE);
        }
        if self.digits {
            classes.push(DIGITS);
        }
        if self.symbols {
            classes.push(SYMBOLS);
        }
        classes
    }
}

/// Generate a random secret of exactly `length` characters drawn from the
/// enabled classes.
///
/// When `length` is at least the number of enabled classes the output
/// contains at least one character from each of them: the secret is seeded
/// with one pick per class, filled from the union, then shuffled so the
/// seeded characters sit at unpredictable positions.
///
/// # Errors
///
/// Returns `StoreError::InvalidArgument` if `length` is zero or no
/// character class is enabled.
pub fn generate_secret(length: usize, charset: CharsetOptions) -> StoreResult<String> {
    if length == 0 {
        return Err(StoreError::InvalidArgument(
            "secret length must be a positive integer".to_string(),
        ));
    }
    let classes = charset.enabled_classes();
    if classes.is_empty() {
        return Err(StoreError::InvalidArgument(
            "at least one character class must be included".to_string(),
        ));
    }

    let pool: Vec<u8> = classes.iter().flat_map(|c| c.iter().copied()).collect();
    let mut rng = rand::thread_rng();

    let mut secret: Vec<u8> = Vec::with_capacity(length.max(classes.len()));
    for class in &classes {
        secret.push(class[rng.gen_range(0..class.len())]);
    }
    while secret.len() < length {
        secret.push(pool[rng.gen_range(0..pool.len())]);
    }
    secret.shuffle(&mut rng);
    secret.truncate(length);

    // All class alphabets are ASCII, so the byte count equals the
    // character count.
    Ok(secret.iter().map(|&b| b as char).collect())
}
