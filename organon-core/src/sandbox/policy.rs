//! Resource and permission envelope for sandboxed execution

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Budget and permission envelope applied to one sandboxed execution.
///
/// Wire form is camelCase; config files may also use snake_case keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxPolicy {
    /// Filesystem roots sandboxed code may reach. Empty permits no paths.
    #[serde(default, alias = "allowed_roots")]
    pub allowed_roots: Vec<PathBuf>,
    /// Capability tags grantable to sandboxed code
    #[serde(default, alias = "allowed_capability_tags")]
    pub allowed_capability_tags: Vec<String>,
    /// Wall-clock budget for one execution, in milliseconds
    #[serde(default = "default_time_budget_ms", alias = "time_budget_ms")]
    pub time_budget_ms: u64,
    /// Address-space ceiling for the sandboxed process, in megabytes
    #[serde(default = "default_memory_budget_mb", alias = "memory_budget_mb")]
    pub memory_budget_mb: u64,
}

fn default_time_budget_ms() -> u64 {
    30_000
}

fn default_memory_budget_mb() -> u64 {
    512
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            allowed_capability_tags: Vec::new(),
            time_budget_ms: default_time_budget_ms(),
            memory_budget_mb: default_memory_budget_mb(),
        }
    }
}

impl SandboxPolicy {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            allowed_roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_capability_tag(mut self, tag: impl Into<String>) -> Self {
        self.allowed_capability_tags.push(tag.into());
        self
    }

    pub fn with_time_budget_ms(mut self, millis: u64) -> Self {
        self.time_budget_ms = millis;
        self
    }

    pub fn with_memory_budget_mb(mut self, megabytes: u64) -> Self {
        self.memory_budget_mb = megabytes;
        self
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn permits_capability(&self, tag: &str) -> bool {
        self.allowed_capability_tags.iter().any(|t| t == tag)
    }

    /// Roots must be absolute: a relative root cannot anchor containment.
    pub fn validate(&self) -> crate::error::Result<()> {
        for root in &self.allowed_roots {
            if !root.is_absolute() {
                return Err(crate::error::OrganonError::Configuration(format!(
                    "sandbox allowed root '{}' must be an absolute path",
                    root.display()
                )));
            }
        }
        if self.time_budget_ms == 0 {
            return Err(crate::error::OrganonError::Configuration(
                "sandbox time budget must be greater than zero".to_string(),
            ));
        }
        if self.memory_budget_mb == 0 {
            return Err(crate::error::OrganonError::Configuration(
                "sandbox memory budget must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
