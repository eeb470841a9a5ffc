//! Remote tool execution over JSON-RPC
//!
//! Remote tools live on servers speaking the MCP tool-call convention: a
//! `tools/call` request carrying `{"name", "arguments"}`, answered with
//! content blocks. Transport failures map to [`ProviderUnavailable`] or
//! [`ProviderTimeout`] and server-side tool failures to [`ExecutionError`],
//! so callers can tell "could not reach it" from "it ran and failed".
//!
//! A connection that was never established is safe to retry on the next
//! configured endpoint. Anything after the request may have left the wire,
//! so timeouts and HTTP errors do not fail over.
//!
//! [`ProviderUnavailable`]: crate::error::ErrorKind::ProviderUnavailable
//! [`ProviderTimeout`]: crate::error::ErrorKind::ProviderTimeout
//! [`ExecutionError`]: crate::error::ErrorKind::ExecutionError

use super::{Provider, ToolOutput};
use crate::catalog::{ProviderKind, ToolMeta, ToolSource};
use crate::error::{ErrorKind, ToolError};
use crate::runtime::{InvocationContext, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const JSONRPC_VERSION: &str = "2.0";
const TOOLS_CALL_METHOD: &str = "tools/call";

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Result payload of a `tools/call`
#[derive(Debug, Deserialize)]
struct ToolCallResult {
    #[serde(default)]
    content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    is_error: bool,
}

/// One content block in a tool-call result
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ToolContent {
    Json { json: Value },
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

/// Executes tools served by remote JSON-RPC endpoints.
#[derive(Debug)]
pub struct RemoteProvider {
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RemoteProvider {
    /// Build a provider whose individual requests are capped at
    /// `call_timeout`. The runtime's budget still applies on top; whichever
    /// fires first ends the invocation.
    pub fn new(call_timeout: Duration) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| {
                crate::error::OrganonError::Configuration(format!(
                    "failed to build HTTP client: {}",
                    e
                ))
            })?;
        Ok(Self {
            http,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl Provider for RemoteProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    async fn execute(
        &self,
        call: &ToolCall,
        meta: &ToolMeta,
        _ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let ToolSource::Remote { endpoints } = &meta.source else {
            return Err(ToolError::execution(format!(
                "tool '{}' is not served by a remote endpoint",
                call.name
            )));
        };
        if endpoints.is_empty() {
            return Err(ToolError::provider_unavailable(format!(
                "tool '{}' lists no remote endpoints",
                call.name
            )));
        }

        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: TOOLS_CALL_METHOD,
            params: json!({
                "name": call.name,
                "arguments": Value::Object(call.arguments.clone()),
            }),
        };

        let mut last_connect_failure = String::new();
        for endpoint in endpoints {
            let response = match self.http.post(endpoint).json(&request).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(ToolError::new(
                        ErrorKind::ProviderTimeout,
                        format!("remote endpoint did not answer in time: {}", e),
                    ));
                }
                Err(e) if e.is_connect() => {
                    tracing::debug!(
                        tool = %call.name,
                        error = %e,
                        "remote endpoint unreachable, trying next"
                    );
                    last_connect_failure = e.to_string();
                    continue;
                }
                Err(e) => {
                    return Err(ToolError::provider_unavailable(format!(
                        "remote request failed: {}",
                        e
                    )));
                }
            };
            if !response.status().is_success() {
                return Err(ToolError::provider_unavailable(format!(
                    "remote endpoint answered HTTP {}",
                    response.status()
                )));
            }
            let rpc: JsonRpcResponse = response.json().await.map_err(|e| {
                ToolError::provider_unavailable(format!(
                    "remote endpoint returned an invalid JSON-RPC response: {}",
                    e
                ))
            })?;
            return decode_rpc(rpc, &call.name);
        }

        Err(ToolError::provider_unavailable(format!(
            "no remote endpoint reachable for tool '{}': {}",
            call.name, last_connect_failure
        )))
    }
}

fn decode_rpc(rpc: JsonRpcResponse, tool_name: &str) -> Result<ToolOutput, ToolError> {
    if let Some(error) = rpc.error {
        return Err(ToolError::execution(format!(
            "remote tool error {}: {}",
            error.code, error.message
        )));
    }
    let Some(result) = rpc.result else {
        return Err(ToolError::provider_unavailable(
            "remote endpoint returned neither result nor error".to_string(),
        ));
    };

    // Content-block envelope per the tools/call convention; plain-object
    // results are accepted from servers that skip the envelope.
    if result.get("content").is_some() {
        let parsed: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| ToolError::execution(format!("remote tool result is malformed: {}", e)))?;
        if parsed.is_error {
            let detail = parsed
                .content
                .iter()
                .find_map(|block| match block {
                    ToolContent::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| format!("remote tool '{}' reported failure", tool_name));
            return Err(ToolError::execution(detail));
        }
        for block in parsed.content {
            match block {
                ToolContent::Json {
                    json: Value::Object(output),
                } => return Ok(output),
                ToolContent::Text { text } => {
                    if let Ok(Value::Object(output)) = serde_json::from_str(&text) {
                        return Ok(output);
                    }
                    let mut output = ToolOutput::new();
                    output.insert("text".to_string(), Value::String(text));
                    return Ok(output);
                }
                _ => continue,
            }
        }
        return Ok(ToolOutput::new());
    }

    match result {
        Value::Object(output) => Ok(output),
        _ => Err(ToolError::execution(
            "remote tool returned a non-object result",
        )),
    }
}
