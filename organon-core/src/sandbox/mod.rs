//! Sandbox boundary: environment detection, path adaptation, budgets
//!
//! Skill code runs in an isolated child process with a remapped view of the
//! filesystem. This module owns the three pieces that make the boundary
//! hold: classifying the execution environment once per process, translating
//! paths between the host view and the sandbox view with containment
//! enforced on resolved locations, and the [`SandboxPolicy`] envelope that
//! caps what sandboxed code may touch and spend.

mod detect;
#[cfg(unix)]
mod limits;
mod path;
mod policy;

pub use detect::{detect_runtime, RuntimeKind};
pub use path::{HostPath, PathAdapter, PathError, SandboxPath};
pub use policy::SandboxPolicy;

#[cfg(unix)]
pub(crate) use limits::ResourceCaps;
