//! Credential tools: generate, save, retrieve, list, update, delete.
//!
//! Argument schemas and defaults follow the conventions MCP clients
//! expect: optional booleans default to true, string fields are omitted
//! rather than sent as null. Secrets appear in tool output only where
//! retrieval is the point (`generate_secret`, `get_credential`);
//! confirmations never echo them.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{SharedStore, Tool};
use crate::error::StoreError;
use crate::store::{CharsetOptions, CredentialMetadata, RecordUpdate};

const MIN_SECRET_LENGTH: usize = 8;
const MAX_SECRET_LENGTH: usize = 128;

/// Characters shown before a notes field is cut off in listings.
const NOTES_PREVIEW_CHARS: usize = 100;

fn not_found(name: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "No credential named '{}'. Use list_credentials to see saved names.",
        name
    )
}

fn notes_preview(notes: &str) -> String {
    if notes.chars().count() > NOTES_PREVIEW_CHARS {
        let cut: String = notes.chars().take(NOTES_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        notes.to_string()
    }
}

/// Generate a random secret.
pub struct GenerateSecret {
    store: SharedStore,
}

impl GenerateSecret {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GenerateSecret {
    fn name(&self) -> &str {
        "generate_secret"
    }

    fn description(&self) -> &str {
        "Generate a cryptographically secure random secret. Defaults to 16 characters drawn \
         from all character classes; individual classes can be toggled off, but at least one \
         must remain enabled."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "length": {
                    "type": "integer",
                    "description": "Secret length (default: 16)",
                    "default": 16,
                    "minimum": 8,
                    "maximum": 128
                },
                "include_symbols": {
                    "type": "boolean",
                    "description": "Include special symbols (default: true)",
                    "default": true
                },
                "include_numbers": {
                    "type": "boolean",
                    "description": "Include digits (default: true)",
                    "default": true
                },
                "include_uppercase": {
                    "type": "boolean",
                    "description": "Include uppercase letters (default: true)",
                    "default": true
                },
                "include_lowercase": {
                    "type": "boolean",
                    "description": "Include lowercase letters (default: true)",
                    "default": true
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        // Out-of-range lengths are clamped rather than rejected; the
        // schema documents the bounds.
        let length = args
            .get("length")
            .and_then(|v| v.as_u64())
            .map(|n| (n as usize).clamp(MIN_SECRET_LENGTH, MAX_SECRET_LENGTH));

        let store = self.store.lock().await;
        // Each class falls back to the configured default when its
        // include_* argument is absent.
        let defaults = store.config().default_charset;
        let charset = CharsetOptions {
            lowercase: args["include_lowercase"]
                .as_bool()
                .unwrap_or(defaults.lowercase),
            uppercase: args["include_uppercase"]
                .as_bool()
                .unwrap_or(defaults.uppercase),
            digits: args["include_numbers"].as_bool().unwrap_or(defaults.digits),
            symbols: args["include_symbols"].as_bool().unwrap_or(defaults.symbols),
        };
        let secret = store.generate_secret(length, Some(charset))?;
        Ok(secret)
    }
}

/// Encrypt and save a credential.
pub struct PutCredential {
    store: SharedStore,
}

impl PutCredential {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for PutCredential {
    fn name(&self) -> &str {
        "put_credential"
    }

    fn description(&self) -> &str {
        "Encrypt and save a secret under a unique name, with optional username, URL and notes. \
         Overwrites the existing credential if the name is already taken."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Unique credential name (e.g., 'github', 'aws-prod')"
                },
                "secret": {
                    "type": "string",
                    "description": "Secret value to encrypt and save"
                },
                "username": {
                    "type": "string",
                    "description": "Username or account for this credential (optional)"
                },
                "url": {
                    "type": "string",
                    "description": "Associated URL (optional)"
                },
                "notes": {
                    "type": "string",
                    "description": "Free-form notes (optional)"
                }
            },
            "required": ["name", "secret"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let name = args["name"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'name' argument"))?;
        let secret = args["secret"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'secret' argument"))?;

        let metadata = CredentialMetadata {
            username: args["username"].as_str().map(|s| s.to_string()),
            url: args["url"].as_str().map(|s| s.to_string()),
            notes: args["notes"].as_str().map(|s| s.to_string()),
        };

        let mut store = self.store.lock().await;
        store.put(name, secret.as_bytes(), metadata)?;
        Ok(format!(
            "Saved credential '{}'. Use get_credential with name='{}' to retrieve it.",
            name, name
        ))
    }
}

/// Retrieve and decrypt a credential.
pub struct GetCredential {
    store: SharedStore,
}

impl GetCredential {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCredential {
    fn name(&self) -> &str {
        "get_credential"
    }

    fn description(&self) -> &str {
        "Retrieve and decrypt the credential saved under a name. Returns the secret together \
         with its metadata."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Credential name to retrieve"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let name = args["name"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'name' argument"))?;

        let mut store = self.store.lock().await;
        let record = match store.get(name) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Err(not_found(name)),
            Err(e) => return Err(e.into()),
        };

        let mut out = format!("Credential '{}':\n", record.name);
        if let Some(username) = &record.username {
            out.push_str(&format!("Username: {}\n", username));
        }
        out.push_str(&format!(
            "Secret: {}\n",
            String::from_utf8_lossy(&record.secret)
        ));
        if let Some(url) = &record.url {
            out.push_str(&format!("URL: {}\n", url));
        }
        if let Some(notes) = &record.notes {
            out.push_str(&format!("Notes: {}\n", notes));
        }
        out.push_str(&format!("Updated: {}", record.updated_at.to_rfc3339()));
        Ok(out)
    }
}

/// List credential names and metadata.
pub struct ListCredentials {
    store: SharedStore,
}

impl ListCredentials {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListCredentials {
    fn name(&self) -> &str {
        "list_credentials"
    }

    fn description(&self) -> &str {
        "List saved credential names and metadata without revealing any secrets."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "show_details": {
                    "type": "boolean",
                    "description": "Show usernames, URLs, notes and timestamps (default: true)",
                    "default": true
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let show_details = args["show_details"].as_bool().unwrap_or(true);

        let mut store = self.store.lock().await;
        let entries = store.list_entries()?;
        if entries.is_empty() {
            return Ok(
                "No credentials saved yet. Use put_credential to add one.".to_string()
            );
        }

        let mut out = format!("{} saved credential(s):\n", entries.len());
        for entry in &entries {
            out.push('\n');
            out.push_str(&entry.name);
            out.push('\n');
            if show_details {
                if let Some(username) = &entry.username {
                    out.push_str(&format!("  Username: {}\n", username));
                }
                if let Some(url) = &entry.url {
                    out.push_str(&format!("  URL: {}\n", url));
                }
                if let Some(notes) = &entry.notes {
                    out.push_str(&format!("  Notes: {}\n", notes_preview(notes)));
                }
                out.push_str(&format!("  Updated: {}\n", entry.updated_at.to_rfc3339()));
            }
        }
        Ok(out)
    }
}

/// Update fields of an existing credential.
pub struct UpdateCredential {
    store: SharedStore,
}

impl UpdateCredential {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateCredential {
    fn name(&self) -> &str {
        "update_credential"
    }

    fn description(&self) -> &str {
        "Update fields of an existing credential. Only the provided fields change; everything \
         else is preserved."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Credential name to update"
                },
                "secret": {
                    "type": "string",
                    "description": "New secret (optional - keeps existing if not provided)"
                },
                "username": {
                    "type": "string",
                    "description": "New username (optional - keeps existing if not provided)"
                },
                "url": {
                    "type": "string",
                    "description": "New URL (optional)"
                },
                "notes": {
                    "type": "string",
                    "description": "New notes (optional)"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let name = args["name"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'name' argument"))?;

        let mut update = RecordUpdate::default();
        let mut fields: Vec<&str> = Vec::new();
        // Empty strings are treated as "not provided" for the secret and
        // username; URL and notes accept empty values to clear them.
        if let Some(secret) = args["secret"].as_str() {
            if !secret.is_empty() {
                update.secret = Some(secret.as_bytes().to_vec());
                fields.push("secret");
            }
        }
        if let Some(username) = args["username"].as_str() {
            if !username.is_empty() {
                update.username = Some(username.to_string());
                fields.push("username");
            }
        }
        if let Some(url) = args["url"].as_str() {
            update.url = Some(url.to_string());
            fields.push("url");
        }
        if let Some(notes) = args["notes"].as_str() {
            update.notes = Some(notes.to_string());
            fields.push("notes");
        }

        if update.is_empty() {
            return Ok(format!(
                "No changes requested for '{}' (no new values provided).",
                name
            ));
        }

        let mut store = self.store.lock().await;
        match store.update(name, update) {
            Ok(()) => Ok(format!("Updated {} for '{}'.", fields.join(", "), name)),
            Err(StoreError::NotFound(_)) => Err(not_found(name)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Delete a credential.
pub struct DeleteCredential {
    store: SharedStore,
}

impl DeleteCredential {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for DeleteCredential {
    fn name(&self) -> &str {
        "delete_credential"
    }

    fn description(&self) -> &str {
        "Permanently delete the credential saved under a name. This cannot be undone."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Credential name to delete"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let name = args["name"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'name' argument"))?;

        let mut store = self.store.lock().await;
        match store.delete(name) {
            Ok(()) => Ok(format!(
                "Deleted credential '{}'. This cannot be undone.",
                name
            )),
            Err(StoreError::NotFound(_)) => Err(not_found(name)),
            Err(e) => Err(e.into()),
        }
    }
}
