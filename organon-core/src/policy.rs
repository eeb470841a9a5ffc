//! Policy decision point for tool invocations
//!
//! Every invocation passes a policy check after argument validation and
//! before dispatch. Engines are fail-closed: they return a decision for any
//! input and never raise, and anything not explicitly allowed is denied.

use crate::runtime::InvocationContext;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Outcome of one policy check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    /// Human-readable explanation, always present on denials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Decides whether one invocation may proceed.
///
/// The invocation context rides along so engines can factor in session,
/// actor, or resource scope. Implementations must not panic: a malformed
/// input is a denial, not an error.
pub trait PolicyEngine: Send + Sync {
    fn decide(&self, tool_name: &str, ctx: &InvocationContext) -> PolicyDecision;
}

/// Allows every invocation. For embedders that gate elsewhere, and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl PolicyEngine for AllowAllPolicy {
    fn decide(&self, _tool_name: &str, _ctx: &InvocationContext) -> PolicyDecision {
        PolicyDecision::allow()
    }
}

/// Name-based allow-list. Any tool absent from the list is denied.
///
/// The list is an immutable snapshot behind an atomic swap: in-flight
/// decisions keep reading the set they started with while [`set_allowed`]
/// installs a replacement. No decision ever observes a half-updated list.
///
/// [`set_allowed`]: AllowListPolicy::set_allowed
#[derive(Debug, Default)]
pub struct AllowListPolicy {
    allowed: RwLock<Arc<HashSet<String>>>,
}

impl AllowListPolicy {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let allowed: HashSet<String> = names.into_iter().map(Into::into).collect();
        Self {
            allowed: RwLock::new(Arc::new(allowed)),
        }
    }

    /// An empty list, denying everything.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Atomically replace the entire allow-list.
    pub fn set_allowed(&self, names: impl IntoIterator<Item = impl Into<String>>) {
        let next: HashSet<String> = names.into_iter().map(Into::into).collect();
        let mut allowed = self.allowed.write().unwrap_or_else(PoisonError::into_inner);
        *allowed = Arc::new(next);
    }

    fn snapshot(&self) -> Arc<HashSet<String>> {
        self.allowed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PolicyEngine for AllowListPolicy {
    fn decide(&self, tool_name: &str, _ctx: &InvocationContext) -> PolicyDecision {
        if tool_name.trim().is_empty() {
            return PolicyDecision::deny("unknown tool");
        }
        if self.snapshot().contains(tool_name) {
            PolicyDecision::allow()
        } else {
            PolicyDecision::deny(format!("tool '{}' is not on the allow-list", tool_name))
        }
    }
}
