//! In-process tool execution

use super::{Provider, ToolOutput};
use crate::catalog::{ProviderKind, ToolMeta};
use crate::error::ToolError;
use crate::runtime::{InvocationContext, ToolCall};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A handler bound to a tool name at startup.
///
/// Handlers receive arguments that already satisfied the tool's input
/// schema. Errors they return pass through to the caller unchanged, so a
/// handler can surface any [`ToolError`] kind that fits what went wrong.
#[async_trait]
pub trait ToolFn: Send + Sync {
    async fn invoke(
        &self,
        args: ToolOutput,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError>;
}

/// Adapter wrapping a plain async closure as a [`ToolFn`].
pub struct FnTool<F> {
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(ToolOutput) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ToolFn for FnTool<F>
where
    F: Fn(ToolOutput) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync,
{
    async fn invoke(
        &self,
        args: ToolOutput,
        _ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        (self.f)(args).await
    }
}

/// Executes tools bound to in-process functions.
#[derive(Default)]
pub struct LocalProvider {
    handlers: RwLock<HashMap<String, Arc<dyn ToolFn>>>,
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LocalProvider")
            .field("handlers", &handlers.len())
            .finish()
    }
}

impl LocalProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler under a tool name. Rebinding a name replaces the
    /// previous handler; tool identity itself is the catalog's concern.
    pub fn bind(&self, name: impl Into<String>, handler: Arc<dyn ToolFn>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.insert(name.into(), handler);
    }

    /// Bind a plain async closure under a tool name.
    pub fn bind_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(ToolOutput) -> BoxFuture<'static, Result<ToolOutput, ToolError>>
            + Send
            + Sync
            + 'static,
    {
        self.bind(name, Arc::new(FnTool::new(f)));
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn ToolFn>> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(name).cloned()
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn execute(
        &self,
        call: &ToolCall,
        _meta: &ToolMeta,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let handler = self.handler(&call.name).ok_or_else(|| {
            ToolError::new(
                crate::error::ErrorKind::ToolNotFound,
                format!("no local handler bound for tool '{}'", call.name),
            )
        })?;
        handler.invoke(call.arguments.clone(), ctx).await
    }
}
