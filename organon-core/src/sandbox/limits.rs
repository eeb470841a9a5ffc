//! Hard resource ceilings for skill processes

use super::policy::SandboxPolicy;

/// Resource caps installed in a skill process between fork and exec.
///
/// These are kernel-enforced backstops behind the runtime's cooperative
/// timeout: a skill that ignores its budget is stopped by the OS.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceCaps {
    address_space_bytes: u64,
    cpu_seconds: u64,
}

impl ResourceCaps {
    pub(crate) fn from_policy(policy: &SandboxPolicy) -> Self {
        let address_space_bytes = policy.memory_budget_mb.saturating_mul(1024 * 1024);
        // CPU cap is the wall budget rounded up to whole seconds.
        let cpu_seconds = policy.time_budget_ms.div_ceil(1000).max(1);
        Self {
            address_space_bytes,
            cpu_seconds,
        }
    }

    /// Apply the caps to the calling process. Runs post-fork, pre-exec, so
    /// only async-signal-safe operations are permitted here.
    pub(crate) fn apply(&self) -> std::io::Result<()> {
        use rlimit::{setrlimit, Resource};

        setrlimit(Resource::AS, self.address_space_bytes, self.address_space_bytes)?;
        setrlimit(Resource::CPU, self.cpu_seconds, self.cpu_seconds)?;
        Ok(())
    }
}
