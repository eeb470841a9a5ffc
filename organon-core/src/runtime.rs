//! Tool invocation dispatch
//!
//! One invocation moves through a fixed progression: received, validated
//! against the tool's input schema, policy-checked, dispatched to the
//! provider serving the tool's kind, and finally completed, denied, or
//! failed. The runtime owns the execution budget and the single
//! cancellation mechanism; a provider may finish early or enforce a tighter
//! internal limit, never a looser one. Nothing here retries: failures
//! surface to the caller with a stable kind and the caller decides.

use crate::catalog::{CatalogError, ProviderKind, ToolCatalog};
use crate::config::OrganonConfig;
use crate::error::{ErrorKind, ToolError};
use crate::manifest::{self, RemoteManifest};
use crate::policy::{AllowListPolicy, PolicyEngine};
use crate::providers::{BoxedProvider, LocalProvider, RemoteProvider, SkillProvider, ToolOutput};
use crate::sandbox::PathAdapter;
use crate::schema::SchemaCache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// A single invocation request: which tool, with what arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Caller-supplied facts scoped to one invocation.
///
/// The policy engine receives the whole context; the runtime itself only
/// consults the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub session_id: Option<String>,
    pub actor_id: Option<String>,
    pub resource_scope: Option<String>,
    /// Cooperative cancellation handle shared with the caller
    pub cancellation: Option<CancellationToken>,
}

impl InvocationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_resource_scope(mut self, resource_scope: impl Into<String>) -> Self {
        self.resource_scope = Some(resource_scope.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(|token| token.is_cancelled())
            .unwrap_or(false)
    }
}

/// Progression of one invocation through the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Received,
    Validated,
    PolicyChecked,
    Dispatched,
    Completed,
    Denied,
    Failed,
}

impl InvocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationState::Received => "received",
            InvocationState::Validated => "validated",
            InvocationState::PolicyChecked => "policy_checked",
            InvocationState::Dispatched => "dispatched",
            InvocationState::Completed => "completed",
            InvocationState::Denied => "denied",
            InvocationState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution record attached to every successful invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub invocation_id: Uuid,
    pub tool_name: String,
    /// Truncated SHA-256 over the serialized arguments
    pub args_hash: String,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: ToolOutput,
    pub provenance: Provenance,
}

/// Runtime execution budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRuntimeConfig {
    /// Budget applied to any tool without an override
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Per-tool budget overrides
    #[serde(default)]
    pub tool_timeouts: HashMap<String, Duration>,
}

impl Default for ToolRuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            tool_timeouts: HashMap::new(),
        }
    }
}

impl ToolRuntimeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, tool: impl Into<String>, timeout: Duration) -> Self {
        self.tool_timeouts.insert(tool.into(), timeout);
        self
    }
}

/// Wire request consumed from the calling agent layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub context: RequestContext,
}

/// Caller identity fields of the wire request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_scope: Option<String>,
}

/// Wire response surfaced back to the calling agent layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl InvocationResponse {
    pub fn success(output: ToolOutput) -> Self {
        Self {
            ok: true,
            output: Some(output),
            error_kind: None,
            detail: None,
        }
    }

    pub fn failure(err: &ToolError) -> Self {
        Self {
            ok: false,
            output: None,
            error_kind: Some(err.kind.as_str().to_string()),
            detail: Some(err.detail.clone()),
        }
    }
}

/// Builder wiring a runtime's collaborators together.
#[derive(Default)]
pub struct ToolRuntimeBuilder {
    catalog: Option<Arc<ToolCatalog>>,
    policy: Option<Arc<dyn PolicyEngine>>,
    providers: HashMap<ProviderKind, BoxedProvider>,
    config: ToolRuntimeConfig,
}

impl ToolRuntimeBuilder {
    pub fn catalog(mut self, catalog: Arc<ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn provider(mut self, provider: BoxedProvider) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn config(mut self, config: ToolRuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the runtime. Missing pieces default closed: an empty
    /// catalog and a deny-everything policy.
    pub fn build(self) -> ToolRuntime {
        ToolRuntime {
            catalog: self.catalog.unwrap_or_else(|| Arc::new(ToolCatalog::new())),
            policy: self
                .policy
                .unwrap_or_else(|| Arc::new(AllowListPolicy::empty())),
            providers: self.providers,
            config: self.config,
            schemas: SchemaCache::new(),
        }
    }
}

/// Dispatches validated, policy-checked invocations to providers.
pub struct ToolRuntime {
    catalog: Arc<ToolCatalog>,
    policy: Arc<dyn PolicyEngine>,
    providers: HashMap<ProviderKind, BoxedProvider>,
    config: ToolRuntimeConfig,
    schemas: SchemaCache,
}

impl std::fmt::Debug for ToolRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRuntime")
            .field("catalog", &self.catalog)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ToolRuntime {
    pub fn builder() -> ToolRuntimeBuilder {
        ToolRuntimeBuilder::default()
    }

    /// Assemble a runtime from configuration: skill manifests are loaded
    /// from the configured directories, the allow-list comes from the
    /// policy section, and the remote provider is wired only when remote
    /// servers are actually configured. Local handlers are bound by the
    /// embedder, so the local provider is passed in.
    pub fn from_config(
        config: &OrganonConfig,
        local: Arc<LocalProvider>,
    ) -> crate::error::Result<ToolRuntime> {
        config.validate()?;
        let catalog = Arc::new(ToolCatalog::new());

        let mut skills = Vec::new();
        for dir in &config.skills.dirs {
            if !dir.exists() {
                tracing::debug!(dir = %dir.display(), "skill directory absent, skipping");
                continue;
            }
            skills.extend(manifest::load_skill_dir(dir)?);
        }

        let mut remotes: Vec<RemoteManifest> = config
            .remote
            .servers
            .iter()
            .map(|server| server.manifest())
            .collect();
        if let Some(dir) = &config.remote.manifest_dir {
            if dir.exists() {
                remotes.extend(manifest::load_remote_dir(dir)?);
            }
        }

        let registered = manifest::register_manifests(&catalog, &skills, &remotes)?;
        tracing::info!(tools = registered, "catalog initialized from manifests");

        let policy = Arc::new(AllowListPolicy::new(config.policy.allow.iter().cloned()));
        let adapter = PathAdapter::detected().with_mount_base(&config.sandbox.mount_base);

        let mut builder = ToolRuntime::builder()
            .catalog(catalog)
            .policy(policy)
            .config(config.runtime.clone())
            .provider(local)
            .provider(Arc::new(SkillProvider::new(
                adapter,
                config.sandbox.default_policy.clone(),
            )));
        if !remotes.is_empty() {
            builder =
                builder.provider(Arc::new(RemoteProvider::new(config.remote.call_timeout)?));
        }

        Ok(builder.build())
    }

    /// The catalog this runtime dispatches against.
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ToolRuntimeConfig {
        &self.config
    }

    fn timeout_for(&self, tool_name: &str) -> Duration {
        self.config
            .tool_timeouts
            .get(tool_name)
            .copied()
            .unwrap_or(self.config.default_timeout)
    }

    /// Execute one call under the given context.
    ///
    /// Concurrent calls are independent: each runs in its own task, and one
    /// tool exceeding its budget never delays another.
    pub async fn invoke(
        &self,
        call: ToolCall,
        ctx: &InvocationContext,
    ) -> Result<ToolResult, ToolError> {
        let invocation_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "tool_invoke",
            tool = %call.name,
            invocation = %invocation_id,
        );
        self.invoke_inner(call, ctx, invocation_id)
            .instrument(span)
            .await
    }

    async fn invoke_inner(
        &self,
        call: ToolCall,
        ctx: &InvocationContext,
        invocation_id: Uuid,
    ) -> Result<ToolResult, ToolError> {
        let started_at = Utc::now();
        tracing::debug!(state = %InvocationState::Received, "invocation received");

        if ctx.is_cancelled() {
            tracing::debug!(state = %InvocationState::Failed, "cancelled before dispatch");
            return Err(ToolError::cancelled());
        }

        let meta = self.catalog.lookup(&call.name).map_err(|e| match e {
            CatalogError::NotFound { .. } => ToolError::tool_not_found(&call.name),
            other => ToolError::execution(other.to_string()),
        })?;

        let input_schema = self.schemas.get_or_compile(&meta.input_schema).map_err(|e| {
            ToolError::execution(format!("input schema for '{}' is invalid: {}", call.name, e))
        })?;
        let instance = Value::Object(call.arguments.clone());
        if let Err(errors) = input_schema.validate(&instance) {
            tracing::debug!(state = %InvocationState::Failed, "arguments failed schema validation");
            return Err(ToolError::invalid_arguments(&errors));
        }
        tracing::debug!(state = %InvocationState::Validated, "arguments validated");

        let decision = self.policy.decide(&call.name, ctx);
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "denied by policy".to_string());
            tracing::warn!(state = %InvocationState::Denied, reason = %reason, "invocation denied");
            return Err(ToolError::policy_denied(reason));
        }
        tracing::debug!(state = %InvocationState::PolicyChecked, "policy allowed");

        let provider = self.providers.get(&meta.kind()).cloned().ok_or_else(|| {
            ToolError::new(
                ErrorKind::ToolNotFound,
                format!(
                    "tool '{}' has no provider registered for kind '{}'",
                    call.name,
                    meta.kind()
                ),
            )
        })?;

        let budget = self.timeout_for(&call.name);
        tracing::debug!(
            state = %InvocationState::Dispatched,
            provider = %meta.kind(),
            budget_ms = budget.as_millis() as u64,
            "dispatching to provider"
        );

        // The provider runs in its own task: a panic is contained there,
        // and abort on timeout or cancellation drops provider resources.
        let task_call = call.clone();
        let task_meta = meta.clone();
        let task_ctx = ctx.clone();
        let handle =
            tokio::spawn(async move { provider.execute(&task_call, &task_meta, &task_ctx).await });
        let abort = handle.abort_handle();
        let cancel = ctx.cancellation.clone().unwrap_or_default();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                abort.abort();
                tracing::debug!(state = %InvocationState::Failed, "cancelled by caller");
                Err(ToolError::cancelled())
            }
            joined = tokio::time::timeout(budget, handle) => match joined {
                Err(_) => {
                    abort.abort();
                    tracing::debug!(state = %InvocationState::Failed, "provider exceeded budget");
                    Err(ToolError::provider_timeout(budget))
                }
                Ok(Err(join_err)) if join_err.is_panic() => Err(ToolError::execution(format!(
                    "tool '{}' panicked during execution",
                    call.name
                ))),
                Ok(Err(_)) => Err(ToolError::execution("provider task was aborted")),
                Ok(Ok(result)) => result,
            },
        };

        let output = match outcome {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(
                    state = %InvocationState::Failed,
                    kind = %err.kind,
                    "provider execution failed"
                );
                return Err(err);
            }
        };

        if let Some(schema_doc) = meta.output_schema.as_ref() {
            let output_schema = self.schemas.get_or_compile(schema_doc).map_err(|e| {
                ToolError::execution(format!(
                    "output schema for '{}' is invalid: {}",
                    call.name, e
                ))
            })?;
            if let Err(errors) = output_schema.validate(&Value::Object(output.clone())) {
                tracing::warn!(state = %InvocationState::Failed, "output failed schema validation");
                return Err(ToolError::execution(format!(
                    "tool '{}' returned output violating its schema: {}",
                    call.name,
                    errors.join("; ")
                )));
            }
        }

        let duration = (Utc::now() - started_at).to_std().unwrap_or_default();
        tracing::debug!(
            state = %InvocationState::Completed,
            duration_ms = duration.as_millis() as u64,
            "invocation completed"
        );

        let mut hasher = Sha256::new();
        hasher.update(
            serde_json::to_string(&call.arguments)
                .unwrap_or_default()
                .as_bytes(),
        );
        let args_hash = format!("{:x}", hasher.finalize());

        Ok(ToolResult {
            output,
            provenance: Provenance {
                invocation_id,
                tool_name: call.name,
                args_hash: args_hash[..16].to_string(),
                started_at,
                duration,
            },
        })
    }

    /// Wire entry point: decode nothing, encode nothing, just map the
    /// invocation outcome onto the response envelope.
    pub async fn handle(&self, request: InvocationRequest) -> InvocationResponse {
        let InvocationRequest {
            tool_name,
            arguments,
            context,
        } = request;
        let ctx = InvocationContext {
            session_id: context.session_id,
            actor_id: context.actor_id,
            resource_scope: context.resource_scope,
            ..InvocationContext::default()
        };
        let call = ToolCall {
            name: tool_name,
            arguments,
        };
        match self.invoke(call, &ctx).await {
            Ok(result) => InvocationResponse::success(result.output),
            Err(err) => InvocationResponse::failure(&err),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
