//! Sandboxed skill execution
//!
//! A skill is an executable entrypoint run as a fresh child process per
//! invocation. The exchange is one JSON line each way: the provider writes
//! `{"tool": ..., "arguments": {...}}` to the child's stdin and closes it,
//! and the child answers `{"ok": true, "output": {...}}` or
//! `{"ok": false, "error": "..."}` on stdout.
//!
//! Path arguments are rewritten into the sandbox view before the process
//! starts; one that falls outside the allowed roots fails the invocation
//! before any child code runs. The child is spawned with kill-on-drop, so a
//! timeout or abort upstream reclaims the process.

use super::{Provider, ToolOutput};
use crate::catalog::{ProviderKind, ToolMeta, ToolSource};
use crate::error::ToolError;
use crate::runtime::{InvocationContext, ToolCall};
use crate::sandbox::{PathAdapter, SandboxPolicy};
use crate::schema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Request line written to the skill's stdin
#[derive(Debug, Serialize)]
struct SkillRequest<'a> {
    tool: &'a str,
    arguments: &'a ToolOutput,
}

/// Response line read from the skill's stdout
#[derive(Debug, Deserialize)]
struct SkillResponse {
    ok: bool,
    #[serde(default)]
    output: Option<ToolOutput>,
    #[serde(default)]
    error: Option<String>,
}

/// Runs packaged skills inside an isolated process boundary.
#[derive(Debug, Clone)]
pub struct SkillProvider {
    adapter: PathAdapter,
    default_policy: SandboxPolicy,
}

impl SkillProvider {
    /// Create a provider translating paths through `adapter` and applying
    /// `default_policy` to skills whose manifests carry no policy of their
    /// own.
    pub fn new(adapter: PathAdapter, default_policy: SandboxPolicy) -> Self {
        Self {
            adapter,
            default_policy,
        }
    }

    pub fn adapter(&self) -> &PathAdapter {
        &self.adapter
    }

    fn check_capabilities(&self, policy: &SandboxPolicy, meta: &ToolMeta) -> Result<(), ToolError> {
        for tag in &meta.capability_tags {
            if !policy.permits_capability(tag) {
                return Err(ToolError::policy_denied(format!(
                    "capability '{}' is not granted by the sandbox policy",
                    tag
                )));
            }
        }
        Ok(())
    }

    /// Rewrite path arguments into the sandbox view. Runs before the child
    /// process starts; a rejected path aborts the invocation here.
    fn translate_arguments(
        &self,
        call: &ToolCall,
        meta: &ToolMeta,
        policy: &SandboxPolicy,
    ) -> Result<ToolOutput, ToolError> {
        let mut arguments = call.arguments.clone();
        for field in schema::path_fields(&meta.input_schema) {
            let Some(value) = arguments.get_mut(&field) else {
                continue;
            };
            let Some(raw) = value.as_str() else {
                continue;
            };
            let mapped = self
                .adapter
                .to_sandbox_path(Path::new(raw), policy)
                .map_err(|e| {
                    tracing::warn!(
                        tool = %call.name,
                        argument = %field,
                        "path argument rejected at the sandbox boundary"
                    );
                    ToolError::from(e.with_field(field.as_str()))
                })?;
            *value = Value::String(mapped.as_path().display().to_string());
        }
        Ok(arguments)
    }

    /// Rewrite path fields of the skill's output back into host view,
    /// containment-checked. Sandbox output is untrusted.
    fn translate_output(
        &self,
        mut output: ToolOutput,
        meta: &ToolMeta,
        policy: &SandboxPolicy,
    ) -> Result<ToolOutput, ToolError> {
        let Some(schema_doc) = meta.output_schema.as_ref() else {
            return Ok(output);
        };
        for field in schema::path_fields(schema_doc) {
            let Some(value) = output.get_mut(&field) else {
                continue;
            };
            let Some(raw) = value.as_str() else {
                continue;
            };
            let host = self
                .adapter
                .to_host_path(Path::new(raw), policy)
                .map_err(|e| {
                    tracing::warn!(
                        tool = %meta.name,
                        field = %field,
                        "skill output path rejected at the sandbox boundary"
                    );
                    ToolError::from(e.with_field(field.as_str()))
                })?;
            *value = Value::String(host.as_path().display().to_string());
        }
        Ok(output)
    }
}

#[async_trait]
impl Provider for SkillProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Skill
    }

    async fn execute(
        &self,
        call: &ToolCall,
        meta: &ToolMeta,
        _ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let ToolSource::Skill {
            entrypoint,
            sandbox,
        } = &meta.source
        else {
            return Err(ToolError::execution(format!(
                "tool '{}' is not backed by a skill package",
                call.name
            )));
        };
        let policy = sandbox.as_ref().unwrap_or(&self.default_policy);

        self.check_capabilities(policy, meta)?;
        let arguments = self.translate_arguments(call, meta, policy)?;

        let mut command = Command::new(entrypoint);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        {
            let caps = crate::sandbox::ResourceCaps::from_policy(policy);
            // Safety: apply() only issues setrlimit syscalls, which are
            // async-signal-safe between fork and exec.
            unsafe {
                command.pre_exec(move || caps.apply());
            }
        }

        let mut child = command.spawn().map_err(|e| {
            ToolError::provider_unavailable(format!("failed to start skill entrypoint: {}", e))
        })?;

        let request = SkillRequest {
            tool: &call.name,
            arguments: &arguments,
        };
        let mut request_line = serde_json::to_vec(&request)
            .map_err(|e| ToolError::execution(format!("failed to encode skill request: {}", e)))?;
        request_line.push(b'\n');

        let budget = policy.time_budget();
        let outcome = tokio::time::timeout(budget, drive_child(&mut child, request_line)).await;
        let response = match outcome {
            Ok(result) => result?,
            Err(_) => {
                let _ = child.start_kill();
                return Err(ToolError::provider_timeout(budget));
            }
        };

        if !response.ok {
            let detail = response
                .error
                .unwrap_or_else(|| "skill reported failure without detail".to_string());
            return Err(ToolError::execution(detail));
        }
        self.translate_output(response.output.unwrap_or_default(), meta, policy)
    }
}

/// Feed the request line to the child and read its single response line.
async fn drive_child(child: &mut Child, request_line: Vec<u8>) -> Result<SkillResponse, ToolError> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ToolError::execution("skill process has no stdin pipe"))?;
    stdin
        .write_all(&request_line)
        .await
        .map_err(|e| ToolError::execution(format!("failed to write skill request: {}", e)))?;
    stdin
        .shutdown()
        .await
        .map_err(|e| ToolError::execution(format!("failed to close skill stdin: {}", e)))?;
    drop(stdin);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::execution("skill process has no stdout pipe"))?;
    let mut lines = BufReader::new(stdout).lines();
    let line = lines
        .next_line()
        .await
        .map_err(|e| ToolError::execution(format!("failed to read skill response: {}", e)))?;
    let status = child
        .wait()
        .await
        .map_err(|e| ToolError::execution(format!("failed to reap skill process: {}", e)))?;

    let Some(line) = line else {
        if status.success() {
            return Err(ToolError::execution("skill exited without producing a response"));
        }
        return Err(ToolError::execution(format!("skill exited with {}", status)));
    };
    serde_json::from_str(&line)
        .map_err(|e| ToolError::execution(format!("skill response is not valid JSON: {}", e)))
}
