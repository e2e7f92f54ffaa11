//! # passvault
//!
//! Encrypted credential store exposed to MCP clients over stdio.
//!
//! This library provides:
//! - An authenticated, at-rest-encrypted store for named credentials
//! - Random secret generation with configurable character classes
//! - An append-only audit trail of store mutations
//! - A tool registry the `passvault-mcp` binary serves over JSON-RPC 2.0
//!
//! ## Design
//!
//! All records live in one encrypted blob. Every mutation decrypts the
//! full record set, applies the change, re-encrypts and atomically
//! replaces the file, holding an exclusive advisory lock for the cycle.
//! Readers never take the lock; they detect concurrent replacement by
//! watching the blob's file identity and re-reading.
//!
//! Key material stays in a separate owner-only file next to the blob.
//! Losing that file makes the stored records permanently unrecoverable.
//!
//! ## Modules
//! - `store`: encryption, persistence and the [`CredentialStore`] handle
//! - `tools`: MCP tool implementations and the [`tools::ToolRegistry`]
//! - `config`: environment-derived settings
//! - `error`: the [`StoreError`] taxonomy

pub mod config;
pub mod error;
pub mod store;
pub mod tools;

pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use store::{CredentialStore, StoreState};
