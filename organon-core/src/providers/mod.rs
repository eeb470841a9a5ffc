//! Execution backends for registered tools
//!
//! Three backend families sit behind one contract: in-process functions,
//! sandboxed skill processes, and remote JSON-RPC servers. The runtime
//! dispatches on a tool's [`ProviderKind`](crate::catalog::ProviderKind) and
//! treats every backend identically; a provider never sees an invocation
//! that failed validation or policy.

mod local;
mod remote;
mod skill;

pub use local::{FnTool, LocalProvider, ToolFn};
pub use remote::RemoteProvider;
pub use skill::SkillProvider;

use crate::catalog::{ProviderKind, ToolMeta};
use crate::error::ToolError;
use crate::runtime::{InvocationContext, ToolCall};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Output payload a tool returns: always a JSON object.
pub type ToolOutput = Map<String, Value>;

/// Uniform execution contract implemented by every backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The backend family this provider serves.
    fn kind(&self) -> ProviderKind;

    /// Execute a resolved call. Arguments have already passed schema
    /// validation and policy; the provider is responsible for its own
    /// transport and isolation concerns.
    async fn execute(
        &self,
        call: &ToolCall,
        meta: &ToolMeta,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Shared handle to a provider.
pub type BoxedProvider = Arc<dyn Provider>;
