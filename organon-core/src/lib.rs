//! # Organon - The Tool Layer for Intelligent Agents
//!
//! Organon (Ὄργανον) is a runtime for agent tool invocation with:
//! - A catalog of versioned tools described by JSON Schemas
//! - Fail-closed policy gating on every invocation
//! - Local, sandboxed-skill, and remote JSON-RPC providers behind one trait
//! - Path translation between host and sandbox filesystem views
//! - Uniform timeouts and cooperative cancellation in a single dispatch path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use organon_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Describe a tool and bind its local handler
//!     let catalog = Arc::new(ToolCatalog::new());
//!     catalog.register(ToolMeta::new("echo", "1.0.0", ToolSource::Local))?;
//!
//!     let local = LocalProvider::new();
//!     local.bind_fn("echo", |args| Box::pin(async move { Ok(args) }));
//!
//!     let runtime = ToolRuntime::builder()
//!         .catalog(catalog)
//!         .policy(Arc::new(AllowListPolicy::new(["echo"])))
//!         .provider(Arc::new(local))
//!         .build();
//!
//!     // Invoke it
//!     let call = ToolCall::new("echo").with_argument("text", "hello");
//!     let result = runtime.invoke(call, &InvocationContext::default()).await?;
//!     println!("{:?}", result.output);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Organon sits between an agent loop and the tools it calls:
//! - **Catalog**: versioned tool metadata, schemas, capability tags
//! - **Policy**: allow-list gating, deny by default
//! - **Providers**: in-process functions, skill child processes, remote endpoints
//! - **Sandbox**: runtime detection and host/sandbox path translation
//! - **Runtime**: validation, dispatch, budgets, and cancellation in one place

pub mod catalog;
pub mod config;
pub mod error;
pub mod manifest;
pub mod policy;
pub mod providers;
pub mod runtime;
pub mod sandbox;
pub mod schema;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{CatalogError, ProviderKind, ToolCatalog, ToolMeta, ToolSource};
    pub use crate::config::{
        OrganonConfig, PolicyConfig, RemoteConfig, RemoteServerConfig, SandboxConfig, SkillsConfig,
    };
    pub use crate::error::{ErrorKind, OrganonError, Result, ToolError};
    pub use crate::manifest::{
        load_remote_dir, load_skill_dir, register_manifests, RemoteManifest, SkillManifest,
    };
    pub use crate::policy::{AllowAllPolicy, AllowListPolicy, PolicyDecision, PolicyEngine};
    pub use crate::providers::{
        BoxedProvider, FnTool, LocalProvider, Provider, RemoteProvider, SkillProvider, ToolFn,
        ToolOutput,
    };
    pub use crate::runtime::{
        InvocationContext, InvocationRequest, InvocationResponse, InvocationState, Provenance,
        RequestContext, ToolCall, ToolResult, ToolRuntime, ToolRuntimeBuilder, ToolRuntimeConfig,
    };
    pub use crate::sandbox::{
        detect_runtime, HostPath, PathAdapter, PathError, RuntimeKind, SandboxPath, SandboxPolicy,
    };
    pub use crate::schema::{CompiledSchema, SchemaCache};
}
