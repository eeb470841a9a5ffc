//! Path adaptation across the sandbox boundary
//!
//! Sandboxed code never sees raw host layout. Before a skill process starts,
//! every path argument is resolved against the live filesystem (symlinks and
//! dot segments included), checked for containment in an allowed root, and
//! rewritten into the sandbox's view. Output paths travel the reverse
//! direction. Containment is always decided on the resolved location: a
//! symlink that points out of an allowed root fails even though the link
//! itself sits inside one.

use super::detect::{detect_runtime, RuntimeKind};
use super::policy::SandboxPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// An absolute path in the host's view of the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPath(PathBuf);

impl HostPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_inner(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for HostPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for HostPath {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl std::fmt::Display for HostPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// An absolute path in the sandboxed code's view of the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SandboxPath(PathBuf);

impl SandboxPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_inner(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for SandboxPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl From<PathBuf> for SandboxPath {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl std::fmt::Display for SandboxPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A rejected boundary crossing.
///
/// Carries the offending argument's field name and a coarse reason, never
/// the path value itself: this text flows back to sandboxed code and into
/// logs, and must not reveal host filesystem layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PathError {
    reason: &'static str,
    field: Option<String>,
}

impl PathError {
    fn outside_roots() -> Self {
        Self {
            reason: "resolves outside the allowed filesystem roots",
            field: None,
        }
    }

    fn unresolvable() -> Self {
        Self {
            reason: "could not be resolved to a checkable host location",
            field: None,
        }
    }

    fn bad_mount() -> Self {
        Self {
            reason: "does not name a location under the sandbox mount",
            field: None,
        }
    }

    /// Attach the argument field name this error belongs to.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "path argument '{}' {}", field, self.reason),
            None => write!(f, "path argument {}", self.reason),
        }
    }
}

impl std::error::Error for PathError {}

/// Translates paths between the host view and the sandbox view.
///
/// Both directions are pure given a policy: the adapter holds only the
/// environment classification and the mount base, fixed at construction.
#[derive(Debug, Clone)]
pub struct PathAdapter {
    runtime: RuntimeKind,
    mount_base: PathBuf,
}

impl Default for PathAdapter {
    fn default() -> Self {
        Self::detected()
    }
}

impl PathAdapter {
    /// Adapter for the detected process environment.
    pub fn detected() -> Self {
        Self::for_runtime(detect_runtime())
    }

    /// Adapter for an explicit environment classification.
    pub fn for_runtime(runtime: RuntimeKind) -> Self {
        Self {
            runtime,
            mount_base: PathBuf::from("/sandbox"),
        }
    }

    /// Override the mount point sandbox-view paths are rooted under.
    pub fn with_mount_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.mount_base = base.into();
        self
    }

    pub fn runtime(&self) -> RuntimeKind {
        self.runtime
    }

    /// Rewrite a host path into the sandbox view, enforcing containment.
    ///
    /// Native environments keep the resolved host location as-is.
    /// Containerized and unknown environments map each allowed root to an
    /// indexed directory under the mount base, so sandboxed code learns
    /// nothing about host layout.
    pub fn to_sandbox_path(
        &self,
        host: &Path,
        policy: &SandboxPolicy,
    ) -> Result<SandboxPath, PathError> {
        let resolved = resolve_host_path(host)?;
        let (root_index, relative) = containing_root(&resolved, &policy.allowed_roots)?;
        match self.runtime {
            RuntimeKind::Native => Ok(SandboxPath(resolved)),
            RuntimeKind::Containerized | RuntimeKind::Unknown => {
                let mut mapped = self.mount_base.join(root_index.to_string());
                if !relative.as_os_str().is_empty() {
                    mapped.push(&relative);
                }
                Ok(SandboxPath(mapped))
            }
        }
    }

    /// Rewrite a sandbox-view path back into a host path.
    ///
    /// The result is resolved and containment-checked again: sandbox output
    /// is untrusted, and dot segments or links it smuggles in must not move
    /// the host location outside an allowed root.
    pub fn to_host_path(
        &self,
        sandbox: &Path,
        policy: &SandboxPolicy,
    ) -> Result<HostPath, PathError> {
        match self.runtime {
            RuntimeKind::Native => {
                let resolved = resolve_host_path(sandbox)?;
                containing_root(&resolved, &policy.allowed_roots)?;
                Ok(HostPath(resolved))
            }
            RuntimeKind::Containerized | RuntimeKind::Unknown => {
                let relative = sandbox
                    .strip_prefix(&self.mount_base)
                    .map_err(|_| PathError::bad_mount())?;
                let mut components = relative.components();
                let root_index: usize = match components.next() {
                    Some(Component::Normal(first)) => first
                        .to_str()
                        .and_then(|s| s.parse::<usize>().ok())
                        .ok_or_else(PathError::bad_mount)?,
                    _ => return Err(PathError::bad_mount()),
                };
                let root = policy
                    .allowed_roots
                    .get(root_index)
                    .ok_or_else(PathError::bad_mount)?;
                let host = root.join(components.as_path());
                let resolved = resolve_host_path(&host)?;
                containing_root(&resolved, &policy.allowed_roots)?;
                Ok(HostPath(resolved))
            }
        }
    }
}

/// Resolve a host path against the live filesystem.
///
/// Dot segments drop out lexically, symlinks in the existing portion resolve
/// to their targets, and a not-yet-existing tail is tolerated so tools can
/// name files they are about to create. Symlinks in that tail are refused: a
/// dangling link would redirect a later write to an unchecked location.
fn resolve_host_path(path: &Path) -> Result<PathBuf, PathError> {
    if path.is_relative() {
        return Err(PathError::unresolvable());
    }
    let normalized = normalize_lexically(path)?;
    let existing = deepest_existing_ancestor(&normalized);
    let resolved_base = fs::canonicalize(existing).map_err(|_| PathError::unresolvable())?;
    let tail = normalized
        .strip_prefix(existing)
        .map_err(|_| PathError::unresolvable())?;
    if tail.as_os_str().is_empty() {
        return Ok(resolved_base);
    }
    reject_symlink_components(&resolved_base, tail)?;
    Ok(resolved_base.join(tail))
}

fn normalize_lexically(path: &Path) -> Result<PathBuf, PathError> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(PathError::unresolvable());
                }
            }
            Component::Normal(segment) => normalized.push(segment),
        }
    }
    Ok(normalized)
}

fn deepest_existing_ancestor(path: &Path) -> &Path {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor;
        }
    }
    Path::new("/")
}

fn reject_symlink_components(base: &Path, tail: &Path) -> Result<(), PathError> {
    let mut current = base.to_path_buf();
    for component in tail.components() {
        current.push(component);
        if let Ok(metadata) = fs::symlink_metadata(&current) {
            if metadata.file_type().is_symlink() {
                return Err(PathError::unresolvable());
            }
        }
    }
    Ok(())
}

/// Index of the allowed root containing `resolved`, plus the location
/// relative to that root. Roots are themselves resolved before comparison
/// so containment is component-wise on real locations.
fn containing_root(resolved: &Path, roots: &[PathBuf]) -> Result<(usize, PathBuf), PathError> {
    for (index, root) in roots.iter().enumerate() {
        let Ok(resolved_root) = fs::canonicalize(root) else {
            continue;
        };
        if let Ok(relative) = resolved.strip_prefix(&resolved_root) {
            return Ok((index, relative.to_path_buf()));
        }
    }
    Err(PathError::outside_roots())
}

#[cfg(test)]
mod path_tests {
    use super::*;

    struct Fixture {
        _base: tempfile::TempDir,
        root: PathBuf,
        policy: SandboxPolicy,
    }

    fn fixture() -> Fixture {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("workspace");
        fs::create_dir(&root).unwrap();
        let policy = SandboxPolicy::new([&root]);
        Fixture {
            _base: base,
            root,
            policy,
        }
    }

    #[test]
    fn test_native_round_trip() {
        let fx = fixture();
        let file = fx.root.join("data.txt");
        fs::write(&file, "payload").unwrap();

        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        let sandbox = adapter.to_sandbox_path(&file, &fx.policy).unwrap();
        assert_eq!(sandbox.as_path(), fs::canonicalize(&file).unwrap());

        let host = adapter.to_host_path(sandbox.as_path(), &fx.policy).unwrap();
        assert_eq!(host.as_path(), fs::canonicalize(&file).unwrap());
    }

    #[test]
    fn test_containerized_round_trip() {
        let fx = fixture();
        let file = fx.root.join("nested/data.txt");
        fs::create_dir(fx.root.join("nested")).unwrap();
        fs::write(&file, "payload").unwrap();

        let adapter = PathAdapter::for_runtime(RuntimeKind::Containerized);
        let sandbox = adapter.to_sandbox_path(&file, &fx.policy).unwrap();
        assert_eq!(
            sandbox.as_path(),
            Path::new("/sandbox/0/nested/data.txt"),
            "host layout must not leak into the sandbox view"
        );

        let host = adapter.to_host_path(sandbox.as_path(), &fx.policy).unwrap();
        assert_eq!(host.as_path(), fs::canonicalize(&file).unwrap());
    }

    #[test]
    fn test_root_itself_round_trips() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Containerized);

        let sandbox = adapter.to_sandbox_path(&fx.root, &fx.policy).unwrap();
        assert_eq!(sandbox.as_path(), Path::new("/sandbox/0"));

        let host = adapter.to_host_path(sandbox.as_path(), &fx.policy).unwrap();
        assert_eq!(host.as_path(), fs::canonicalize(&fx.root).unwrap());
    }

    #[test]
    fn test_dot_dot_escape_rejected() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        let escape = fx.root.join("inner/../../outside-secret.txt");

        let err = adapter.to_sandbox_path(&escape, &fx.policy).unwrap_err();
        assert!(!err.to_string().contains("outside-secret"));
    }

    #[test]
    fn test_dot_dot_inside_root_allowed() {
        let fx = fixture();
        fs::create_dir(fx.root.join("a")).unwrap();
        fs::write(fx.root.join("data.txt"), "x").unwrap();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);

        let path = fx.root.join("a/../data.txt");
        let sandbox = adapter.to_sandbox_path(&path, &fx.policy).unwrap();
        assert_eq!(
            sandbox.as_path(),
            fs::canonicalize(fx.root.join("data.txt")).unwrap()
        );
    }

    #[test]
    fn test_sibling_prefix_not_contained() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("wk");
        let sibling = base.path().join("wk2");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&sibling).unwrap();
        fs::write(sibling.join("data.txt"), "x").unwrap();

        let policy = SandboxPolicy::new([&root]);
        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        assert!(adapter
            .to_sandbox_path(&sibling.join("data.txt"), &policy)
            .is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let fx = fixture();
        let outside = fx._base.path().join("outside");
        fs::create_dir(&outside).unwrap();
        fs::write(outside.join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(&outside, fx.root.join("link")).unwrap();

        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        let err = adapter
            .to_sandbox_path(&fx.root.join("link/secret.txt"), &fx.policy)
            .unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_symlink_tail_rejected() {
        let fx = fixture();
        std::os::unix::fs::symlink(fx.root.join("missing"), fx.root.join("dangle")).unwrap();

        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        assert!(adapter
            .to_sandbox_path(&fx.root.join("dangle"), &fx.policy)
            .is_err());
    }

    #[test]
    fn test_nonexistent_tail_allowed() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);

        let target = fx.root.join("new/sub/output.txt");
        let sandbox = adapter.to_sandbox_path(&target, &fx.policy).unwrap();
        assert_eq!(
            sandbox.as_path(),
            fs::canonicalize(&fx.root).unwrap().join("new/sub/output.txt")
        );
    }

    #[test]
    fn test_relative_path_rejected() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        assert!(adapter
            .to_sandbox_path(Path::new("data.txt"), &fx.policy)
            .is_err());
    }

    #[test]
    fn test_empty_roots_reject_everything() {
        let fx = fixture();
        let file = fx.root.join("data.txt");
        fs::write(&file, "x").unwrap();

        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        let empty = SandboxPolicy::default();
        assert!(adapter.to_sandbox_path(&file, &empty).is_err());
    }

    #[test]
    fn test_to_host_rejects_foreign_mounts() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Containerized);

        for bogus in ["/elsewhere/0/x", "/sandbox/9/x", "/sandbox/abc/x", "/sandbox"] {
            assert!(
                adapter.to_host_path(Path::new(bogus), &fx.policy).is_err(),
                "{bogus} must be rejected"
            );
        }
    }

    #[test]
    fn test_to_host_rejects_smuggled_dot_dot() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Containerized);

        let err = adapter
            .to_host_path(Path::new("/sandbox/0/../../../etc/passwd"), &fx.policy)
            .unwrap_err();
        assert!(!err.to_string().contains("passwd"));
    }

    #[test]
    fn test_error_display_names_field_not_value() {
        let fx = fixture();
        let adapter = PathAdapter::for_runtime(RuntimeKind::Native);
        let err = adapter
            .to_sandbox_path(Path::new("/etc/passwd"), &fx.policy)
            .unwrap_err()
            .with_field("path");

        assert_eq!(
            err.to_string(),
            "path argument 'path' resolves outside the allowed filesystem roots"
        );
        assert_eq!(err.field(), Some("path"));
    }

    #[test]
    fn test_unknown_runtime_maps_like_containerized() {
        let fx = fixture();
        let file = fx.root.join("data.txt");
        fs::write(&file, "x").unwrap();

        let unknown = PathAdapter::for_runtime(RuntimeKind::Unknown);
        let sandbox = unknown.to_sandbox_path(&file, &fx.policy).unwrap();
        assert_eq!(sandbox.as_path(), Path::new("/sandbox/0/data.txt"));
    }

    #[test]
    fn test_custom_mount_base() {
        let fx = fixture();
        let file = fx.root.join("data.txt");
        fs::write(&file, "x").unwrap();

        let adapter =
            PathAdapter::for_runtime(RuntimeKind::Containerized).with_mount_base("/mnt/skills");
        let sandbox = adapter.to_sandbox_path(&file, &fx.policy).unwrap();
        assert_eq!(sandbox.as_path(), Path::new("/mnt/skills/0/data.txt"));

        let host = adapter.to_host_path(sandbox.as_path(), &fx.policy).unwrap();
        assert_eq!(host.as_path(), fs::canonicalize(&file).unwrap());
    }
}
