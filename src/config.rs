//! Configuration for the credential store and its MCP server.
//!
//! All settings come from environment variables with sensible defaults:
//! - `PASSVAULT_DIR` - Optional. Directory for the blob, key file, audit log
//!   and lockfile. Defaults to `~/.passvault`.
//! - `PASSVAULT_PBKDF2_ITERATIONS` - Optional. PBKDF2-HMAC-SHA256 iteration
//!   count for deriving the blob key. Defaults to `600000`.
//! - `PASSVAULT_DEFAULT_LENGTH` - Optional. Default length for generated
//!   secrets. Defaults to `16`.
//! - `PASSVAULT_DEFAULT_CHARSET` - Optional. Comma-separated character
//!   classes for generated secrets (`upper`, `lower`, `digits`, `symbols`).
//!   Defaults to all four.
//! - `PASSVAULT_LOCK_TIMEOUT_MS` - Optional. Bound on waiting for the
//!   store's exclusive lock during mutations. Defaults to `5000`.
//! - `PASSVAULT_DISABLED_TOOLS` - Optional. Comma-separated tool names to
//!   remove from the MCP surface.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::CharsetOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Credential store configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding all persisted state (0700)
    pub dir: PathBuf,

    /// PBKDF2-HMAC-SHA256 iteration count for the blob key
    pub pbkdf2_iterations: u32,

    /// Default length for generated secrets
    pub default_length: usize,

    /// Default character classes for generated secrets
    pub default_charset: CharsetOptions,

    /// Bound on exclusive-lock acquisition for mutating operations
    pub lock_timeout: Duration,

    /// Tool names removed from the MCP surface
    pub disabled_tools: HashSet<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or charset
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var("PASSVAULT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_dir());

        let pbkdf2_iterations = std::env::var("PASSVAULT_PBKDF2_ITERATIONS")
            .unwrap_or_else(|_| "600000".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("PASSVAULT_PBKDF2_ITERATIONS".to_string(), format!("{}", e))
            })?;

        let default_length = std::env::var("PASSVAULT_DEFAULT_LENGTH")
            .unwrap_or_else(|_| "16".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("PASSVAULT_DEFAULT_LENGTH".to_string(), format!("{}", e))
            })?;

        let default_charset = match std::env::var("PASSVAULT_DEFAULT_CHARSET") {
            Ok(raw) => parse_charset(&raw)
                .map_err(|e| ConfigError::InvalidValue("PASSVAULT_DEFAULT_CHARSET".to_string(), e))?,
            Err(_) => CharsetOptions::default(),
        };

        let lock_timeout_ms: u64 = std::env::var("PASSVAULT_LOCK_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidValue("PASSVAULT_LOCK_TIMEOUT_MS".to_string(), format!("{}", e))
            })?;

        let disabled_tools = std::env::var("PASSVAULT_DISABLED_TOOLS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            dir,
            pbkdf2_iterations,
            default_length,
            default_charset,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            disabled_tools,
        })
    }

    /// Create a config rooted at a custom directory (useful for testing).
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            pbkdf2_iterations: 600_000,
            default_length: 16,
            default_charset: CharsetOptions::default(),
            lock_timeout: Duration::from_millis(5000),
            disabled_tools: HashSet::new(),
        }
    }
}

fn default_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".passvault"))
        .unwrap_or_else(|| PathBuf::from(".passvault"))
}

fn parse_charset(raw: &str) -> Result<CharsetOptions, String> {
    let mut charset = CharsetOptions {
        uppercase: false,
        lowercase: false,
        digits: false,
        symbols: false,
    };
    for token in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        match token {
            "upper" | "uppercase" => charset.uppercase = true,
            "lower" | "lowercase" => charset.lowercase = true,
            "digits" | "numbers" => charset.digits = true,
            "symbols" => charset.symbols = true,
            other => return Err(format!("unknown character class '{}'", other)),
        }
    }
    if !charset.any_enabled() {
        return Err("no character class selected".to_string());
    }
    Ok(charset)
}
