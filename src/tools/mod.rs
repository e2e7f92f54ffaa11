//! Tool surface exposed over MCP.
//!
//! Each tool wraps one credential store operation behind a JSON schema so
//! MCP clients can discover and call it. Tools share a single store
//! handle; the store itself serializes mutations, so concurrent tool
//! calls are safe but never interleave writes.
//!
//! The registry is the configuration seam: operators can switch
//! individual tools off (for example `delete_credential` on a shared
//! box) without rebuilding, via `PASSVAULT_DISABLED_TOOLS`.

mod credentials;

pub use credentials::{
    DeleteCredential, GenerateSecret, GetCredential, ListCredentials, PutCredential,
    UpdateCredential,
};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::store::CredentialStore;

/// Shared handle the tools operate through.
pub type SharedStore = Arc<Mutex<CredentialStore>>;

/// Information about a tool for display purposes.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// MCP-facing tool descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a registry with every credential tool enabled.
    pub fn new(store: SharedStore) -> Self {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();

        tools.insert(
            "generate_secret".to_string(),
            Arc::new(GenerateSecret::new(Arc::clone(&store))),
        );
        tools.insert(
            "put_credential".to_string(),
            Arc::new(PutCredential::new(Arc::clone(&store))),
        );
        tools.insert(
            "get_credential".to_string(),
            Arc::new(GetCredential::new(Arc::clone(&store))),
        );
        tools.insert(
            "list_credentials".to_string(),
            Arc::new(ListCredentials::new(Arc::clone(&store))),
        );
        tools.insert(
            "update_credential".to_string(),
            Arc::new(UpdateCredential::new(Arc::clone(&store))),
        );
        tools.insert(
            "delete_credential".to_string(),
            Arc::new(DeleteCredential::new(store)),
        );

        tracing::debug!("Registry complete with {} tools", tools.len());
        Self { tools }
    }

    /// Create a registry honoring the configured disabled-tool set.
    pub fn with_config(store: SharedStore, config: &Config) -> Self {
        let mut registry = Self::new(store);
        for name in &config.disabled_tools {
            if registry.tools.remove(name).is_some() {
                tracing::info!("Tool '{}' disabled by configuration", name);
            } else {
                tracing::warn!("Ignoring unknown tool '{}' in disabled set", name);
            }
        }
        registry
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Check if a tool exists by name.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all available tools.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// Tool descriptors for `tools/list`, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
