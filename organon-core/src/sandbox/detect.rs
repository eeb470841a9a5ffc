//! Execution environment detection
//!
//! Whether this process runs directly on the host or inside a container
//! decides how sandbox paths are mapped. The classification is computed once
//! and stays fixed for the process lifetime, so every path translation in a
//! process agrees on the mapping scheme.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Classification of the environment this process executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Direct host execution; host and sandbox views coincide
    Native,
    /// Inside a container; sandbox paths are remapped under a mount base
    Containerized,
    /// Markers are contradictory or unreadable; treated like a container
    Unknown,
}

impl RuntimeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Native => "native",
            RuntimeKind::Containerized => "containerized",
            RuntimeKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static DETECTED: OnceCell<RuntimeKind> = OnceCell::new();

/// The current process environment, probed once on first call.
///
/// Every later call returns the same value, even if the probed files change
/// underneath a running process.
pub fn detect_runtime() -> RuntimeKind {
    *DETECTED.get_or_init(|| probe(Path::new("/")))
}

const CGROUP_MARKERS: [&str; 5] = ["docker", "containerd", "kubepods", "lxc", "libpod"];

fn probe(root: &Path) -> RuntimeKind {
    if !cfg!(target_os = "linux") {
        return RuntimeKind::Native;
    }
    if root.join(".dockerenv").exists() || root.join("run/.containerenv").exists() {
        return RuntimeKind::Containerized;
    }
    match std::fs::read_to_string(root.join("proc/1/cgroup")) {
        Ok(contents) => {
            if CGROUP_MARKERS.iter().any(|marker| contents.contains(marker)) {
                RuntimeKind::Containerized
            } else {
                RuntimeKind::Native
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => RuntimeKind::Native,
        Err(_) => RuntimeKind::Unknown,
    }
}

#[cfg(test)]
mod detect_tests {
    use super::*;

    #[test]
    fn test_detection_is_deterministic() {
        let first = detect_runtime();
        for _ in 0..3 {
            assert_eq!(detect_runtime(), first);
        }
    }

    #[cfg(target_os = "linux")]
    mod probe_tests {
        use super::super::*;
        use std::fs;

        #[test]
        fn test_clean_root_probes_native() {
            let dir = tempfile::tempdir().unwrap();
            assert_eq!(probe(dir.path()), RuntimeKind::Native);
        }

        #[test]
        fn test_dockerenv_marker() {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join(".dockerenv"), "").unwrap();
            assert_eq!(probe(dir.path()), RuntimeKind::Containerized);
        }

        #[test]
        fn test_containerenv_marker() {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir(dir.path().join("run")).unwrap();
            fs::write(dir.path().join("run/.containerenv"), "").unwrap();
            assert_eq!(probe(dir.path()), RuntimeKind::Containerized);
        }

        #[test]
        fn test_cgroup_classification() {
            let dir = tempfile::tempdir().unwrap();
            fs::create_dir_all(dir.path().join("proc/1")).unwrap();

            let cgroup = dir.path().join("proc/1/cgroup");
            fs::write(&cgroup, "0::/system.slice/docker-abc123.scope\n").unwrap();
            assert_eq!(probe(dir.path()), RuntimeKind::Containerized);

            fs::write(&cgroup, "0::/init.scope\n").unwrap();
            assert_eq!(probe(dir.path()), RuntimeKind::Native);
        }

        #[test]
        fn test_unreadable_cgroup_probes_unknown() {
            let dir = tempfile::tempdir().unwrap();
            // A directory where the file belongs makes the read fail with
            // something other than NotFound.
            fs::create_dir_all(dir.path().join("proc/1/cgroup")).unwrap();
            assert_eq!(probe(dir.path()), RuntimeKind::Unknown);
        }
    }
}
