//! Append-only audit logging for store mutations.
//!
//! Every mutation appends one JSONL entry recording the operation, the
//! credential name, a UTC timestamp and an optional actor. Entries never
//! contain secret material, so the log stays plaintext with owner-only
//! permissions, in a file separate from the credential blob. History
//! survives credential deletion and store re-initialization.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreResult;

/// Operations recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Initialize,
    Put,
    Update,
    Delete,
    Destroy,
}

/// Single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub operation: AuditOperation,
    /// Credential name; absent for whole-store operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Caller identity, e.g. "mcp".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl AuditEntry {
    fn new(operation: AuditOperation, name: Option<&str>, actor: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            operation,
            name: name.map(|s| s.to_string()),
            actor: actor.map(|s| s.to_string()),
        }
    }
}

/// Append-only audit log backed by a JSONL file.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and flush it to disk.
    pub fn append(
        &self,
        operation: AuditOperation,
        name: Option<&str>,
        actor: Option<&str>,
    ) -> StoreResult<()> {
        let entry = AuditEntry::new(operation, name, actor);
        let line = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        Ok(())
    }

    /// Read entries in chronological order. With a limit, only the most
    /// recent `limit` entries are returned. Lines that fail to parse
    /// (e.g. a line torn by a crash mid-append) are skipped with a
    /// warning rather than poisoning the whole read.
    pub fn read_entries(&self, limit: Option<usize>) -> StoreResult<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Skipping unparseable audit line: {}", e);
                }
            }
        }

        if let Some(max) = limit {
            if entries.len() > max {
                entries.drain(..entries.len() - max);
            }
        }

        Ok(entries)
    }
}
