//! Error types for Organon operations

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result type for Organon operations
pub type Result<T> = std::result::Result<T, OrganonError>;

/// Stable error classification surfaced to callers on the wire.
///
/// The serialized names are part of the invocation contract: callers branch
/// on them, so they never change across releases. Renderable detail text is
/// free to evolve; the kind is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No tool registered under the requested name, or no provider serves it
    ToolNotFound,
    /// Arguments failed validation against the tool's input schema
    InvalidArguments,
    /// The policy engine denied the invocation
    PolicyDenied,
    /// A path argument falls outside the sandbox's allowed roots
    PathNotAllowed,
    /// The provider could not be reached or started
    ProviderUnavailable,
    /// Execution exceeded its time budget or was cancelled
    ProviderTimeout,
    /// The tool ran and failed, or returned malformed output
    ExecutionError,
}

impl ErrorKind {
    /// Wire-stable name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::PolicyDenied => "PolicyDenied",
            ErrorKind::PathNotAllowed => "PathNotAllowed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::ProviderTimeout => "ProviderTimeout",
            ErrorKind::ExecutionError => "ExecutionError",
        }
    }

    /// Whether retrying the same invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ProviderUnavailable | ErrorKind::ProviderTimeout)
    }

    /// Whether retrying the same invocation is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::ToolNotFound
                | ErrorKind::InvalidArguments
                | ErrorKind::PolicyDenied
                | ErrorKind::PathNotAllowed
                | ErrorKind::ExecutionError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure outcome of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    /// Stable classification for programmatic handling
    pub kind: ErrorKind,
    /// Human-readable explanation, safe to log and surface to callers
    pub detail: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(
            ErrorKind::ToolNotFound,
            format!("tool '{}' is not registered in the catalog", name),
        )
    }

    pub fn invalid_arguments(errors: &[String]) -> Self {
        let detail = if errors.is_empty() {
            "arguments failed schema validation".to_string()
        } else {
            errors.join("; ")
        };
        Self::new(ErrorKind::InvalidArguments, detail)
    }

    pub fn policy_denied(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyDenied, reason)
    }

    pub fn provider_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderUnavailable, detail)
    }

    pub fn provider_timeout(budget: Duration) -> Self {
        Self::new(
            ErrorKind::ProviderTimeout,
            format!("execution did not complete within {}ms", budget.as_millis()),
        )
    }

    /// Caller-initiated cancellation. Shares the timeout kind so callers
    /// handle both interruptions through one branch.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::ProviderTimeout, "invocation cancelled by caller")
    }

    pub fn execution(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionError, detail)
    }

    /// Whether retrying the same invocation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

impl std::error::Error for ToolError {}

impl From<crate::sandbox::PathError> for ToolError {
    fn from(err: crate::sandbox::PathError) -> Self {
        Self::new(ErrorKind::PathNotAllowed, err.to_string())
    }
}

/// Main error type for Organon operations
#[derive(Debug, thiserror::Error)]
pub enum OrganonError {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Manifest parsing or validation errors
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// JSON Schema compilation errors
    #[error("Schema error: {0}")]
    Schema(String),

    /// Catalog registration and lookup errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] crate::catalog::CatalogError),

    /// A tool invocation failed
    #[error("Invocation failed: {0}")]
    Invocation(#[from] ToolError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<String> for OrganonError {
    fn from(s: String) -> Self {
        OrganonError::Other(s)
    }
}

impl From<&str> for OrganonError {
    fn from(s: &str) -> Self {
        OrganonError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for OrganonError {
    fn from(err: anyhow::Error) -> Self {
        OrganonError::Other(err.to_string())
    }
}
