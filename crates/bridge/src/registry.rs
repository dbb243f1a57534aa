//! Tool registry: tool name → dispatch URL, plus the matching tool definitions.
//!
//! Every discovery pass replaces the whole registry in one swap; there is no incremental merge.
//! A backend whose document failed to load in the latest pass therefore has no entries.
//! Discovery passes on one registry are serialized through [`ToolRegistry::discovery_guard`];
//! readers never wait on a pass, they see either the old or the new snapshot.

use mcpo_openapi_tools::{ToolCatalog, ToolDefinition};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// An immutable registry generation.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub tools: Vec<ToolDefinition>,
    pub routes: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    discovery: Mutex<()>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize discovery passes. Hold the guard for the whole fetch + [`Self::replace`].
    pub async fn discovery_guard(&self) -> MutexGuard<'_, ()> {
        self.discovery.lock().await
    }

    /// Swap in the result of a discovery pass.
    pub fn replace(&self, catalog: ToolCatalog) {
        let (tools, routes) = catalog.into_parts();
        *self.current.write() = Arc::new(RegistrySnapshot { tools, routes });
    }

    pub fn clear(&self) {
        *self.current.write() = Arc::new(RegistrySnapshot::default());
    }

    /// Dispatch URL for a tool.
    #[must_use]
    pub fn resolve(&self, tool_name: &str) -> Option<String> {
        self.current.read().routes.get(tool_name).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    #[must_use]
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.current.read().tools.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.read().routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
