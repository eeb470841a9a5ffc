//! Tool catalog: the single source of truth for tool identity
//!
//! Every invokable tool is described by a [`ToolMeta`] and registered in a
//! [`ToolCatalog`]. The catalog hands out immutable snapshots: readers clone
//! an `Arc` and never contend with writers, and a registration becomes
//! visible to all subsequent lookups the moment it returns.

use crate::sandbox::SandboxPolicy;
use crate::schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Execution backend families a tool can be served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// In-process function
    Local,
    /// Packaged skill run in a sandboxed child process
    Skill,
    /// Remote server speaking JSON-RPC
    Remote,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Skill => "skill",
            ProviderKind::Remote => "remote",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-specific binding recorded at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolSource {
    /// Served by a handler bound in the local provider
    Local,
    /// Served by a skill package entrypoint
    Skill {
        entrypoint: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sandbox: Option<SandboxPolicy>,
    },
    /// Served by a remote server reachable at one of these endpoints
    Remote { endpoints: Vec<String> },
}

impl ToolSource {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ToolSource::Local => ProviderKind::Local,
            ToolSource::Skill { .. } => ProviderKind::Skill,
            ToolSource::Remote { .. } => ProviderKind::Remote,
        }
    }
}

/// Identity and execution contract of one registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub source: ToolSource,
    /// JSON Schema the arguments must satisfy before dispatch
    #[serde(default = "schema::permissive_object")]
    pub input_schema: Value,
    /// JSON Schema the output must satisfy, when declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Capability tags this tool requires from its sandbox
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_tags: Vec<String>,
}

impl ToolMeta {
    pub fn new(name: impl Into<String>, version: impl Into<String>, source: ToolSource) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            source,
            input_schema: schema::permissive_object(),
            output_schema: None,
            capability_tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_capability_tag(mut self, tag: impl Into<String>) -> Self {
        self.capability_tags.push(tag.into());
        self
    }

    pub fn with_capability_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.capability_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// The backend family that serves this tool.
    pub fn kind(&self) -> ProviderKind {
        self.source.kind()
    }
}

/// Errors from catalog registration and lookup
#[derive(Debug, Clone)]
pub enum CatalogError {
    /// A different tool already holds this name
    DuplicateTool { name: String, detail: String },
    /// No tool registered under this name
    NotFound { name: String },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::DuplicateTool { name, detail } => {
                write!(f, "tool '{}' is already registered: {}", name, detail)
            }
            CatalogError::NotFound { name } => {
                write!(f, "tool '{}' is not registered in the catalog", name)
            }
        }
    }
}

impl std::error::Error for CatalogError {}

/// Concurrent registry of tool metadata.
///
/// Writers rebuild the map and swap it in atomically; `list` and `lookup`
/// observe a consistent snapshot even while registrations land.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: RwLock<Arc<HashMap<String, ToolMeta>>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<HashMap<String, ToolMeta>> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a tool under its name.
    ///
    /// Re-registering an identical definition is a no-op. A definition that
    /// differs in any field fails with [`CatalogError::DuplicateTool`];
    /// deliberate upgrades go through [`ToolCatalog::replace`].
    pub fn register(&self, meta: ToolMeta) -> Result<(), CatalogError> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = tools.get(&meta.name) {
            if *existing == meta {
                return Ok(());
            }
            return Err(CatalogError::DuplicateTool {
                name: meta.name.clone(),
                detail: conflict_detail(existing, &meta),
            });
        }
        let mut next = tools.as_ref().clone();
        next.insert(meta.name.clone(), meta);
        *tools = Arc::new(next);
        Ok(())
    }

    /// Replace whatever is registered under this name, returning the
    /// displaced definition if there was one.
    pub fn replace(&self, meta: ToolMeta) -> Option<ToolMeta> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = tools.as_ref().clone();
        let previous = next.insert(meta.name.clone(), meta);
        *tools = Arc::new(next);
        previous
    }

    /// Remove a tool, returning its definition if it was registered.
    pub fn unregister(&self, name: &str) -> Option<ToolMeta> {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if !tools.contains_key(name) {
            return None;
        }
        let mut next = tools.as_ref().clone();
        let previous = next.remove(name);
        *tools = Arc::new(next);
        previous
    }

    pub fn lookup(&self, name: &str) -> Result<ToolMeta, CatalogError> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.snapshot().contains_key(name)
    }

    /// All registered tools, sorted by name. The returned list is a point-in-
    /// time snapshot and stays stable while registrations continue.
    pub fn list(&self) -> Vec<ToolMeta> {
        let mut entries: Vec<ToolMeta> = self.snapshot().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

fn conflict_detail(existing: &ToolMeta, incoming: &ToolMeta) -> String {
    if existing.kind() != incoming.kind() {
        format!(
            "registered provider kind '{}' conflicts with incoming kind '{}'",
            existing.kind(),
            incoming.kind()
        )
    } else if existing.version != incoming.version {
        format!(
            "registered version '{}' conflicts with incoming version '{}'",
            existing.version, incoming.version
        )
    } else {
        "registered metadata differs from the incoming definition".to_string()
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;
    use serde_json::json;

    fn echo_meta() -> ToolMeta {
        ToolMeta::new("echo", "1.0.0", ToolSource::Local)
            .with_description("Echoes its arguments back")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }))
    }

    #[test]
    fn test_register_and_lookup() {
        let catalog = ToolCatalog::new();
        catalog.register(echo_meta()).unwrap();

        let meta = catalog.lookup("echo").unwrap();
        assert_eq!(meta.name, "echo");
        assert_eq!(meta.kind(), ProviderKind::Local);
        assert!(catalog.contains("echo"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_lookup_missing_tool() {
        let catalog = ToolCatalog::new();
        let err = catalog.lookup("missing").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
        assert_eq!(
            err.to_string(),
            "tool 'missing' is not registered in the catalog"
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let catalog = ToolCatalog::new();
        catalog.register(echo_meta()).unwrap();

        let conflicting = ToolMeta::new(
            "echo",
            "1.0.0",
            ToolSource::Remote {
                endpoints: vec!["http://localhost:9000".to_string()],
            },
        );
        let err = catalog.register(conflicting).unwrap_err();
        match err {
            CatalogError::DuplicateTool { name, detail } => {
                assert_eq!(name, "echo");
                assert!(detail.contains("'local'"));
                assert!(detail.contains("'remote'"));
            }
            other => panic!("expected DuplicateTool, got {other:?}"),
        }
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let catalog = ToolCatalog::new();
        catalog.register(echo_meta()).unwrap();
        catalog.register(echo_meta()).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_replace_swaps_definition() {
        let catalog = ToolCatalog::new();
        catalog.register(echo_meta()).unwrap();

        let upgraded = ToolMeta::new("echo", "2.0.0", ToolSource::Local);
        let previous = catalog.replace(upgraded).unwrap();
        assert_eq!(previous.version, "1.0.0");
        assert_eq!(catalog.lookup("echo").unwrap().version, "2.0.0");
    }

    #[test]
    fn test_unregister() {
        let catalog = ToolCatalog::new();
        catalog.register(echo_meta()).unwrap();

        let removed = catalog.unregister("echo").unwrap();
        assert_eq!(removed.name, "echo");
        assert!(catalog.is_empty());
        assert!(catalog.unregister("echo").is_none());
    }

    #[test]
    fn test_list_is_a_stable_snapshot() {
        let catalog = ToolCatalog::new();
        catalog.register(echo_meta()).unwrap();

        let before = catalog.list();
        catalog
            .register(ToolMeta::new("reverse", "1.0.0", ToolSource::Local))
            .unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(catalog.list().len(), 2);
        assert_eq!(catalog.names(), vec!["echo", "reverse"]);
    }

    #[test]
    fn test_concurrent_registration_is_linearizable() {
        let catalog = Arc::new(ToolCatalog::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let catalog = catalog.clone();
            handles.push(std::thread::spawn(move || {
                let meta = ToolMeta::new(format!("tool-{i}"), "1.0.0", ToolSource::Local);
                catalog.register(meta).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(catalog.len(), 8);
    }

    #[test]
    fn test_meta_serializes_camel_case() {
        let meta = echo_meta().with_output_schema(json!({"type": "object"}));
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("outputSchema").is_some());
        assert_eq!(value["source"]["kind"], "local");
    }
}
