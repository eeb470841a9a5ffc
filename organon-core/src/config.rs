//! Configuration
//!
//! Layered the usual way: `organon.toml` in the working directory (or the
//! file named by `ORGANON_CONFIG_PATH`), then `ORGANON_*` environment
//! variables on top. Double underscores separate nesting in variable
//! names, e.g. `ORGANON_REMOTE__CALL_TIMEOUT=5s`.

use crate::error::{OrganonError, Result};
use crate::manifest::RemoteManifest;
use crate::runtime::ToolRuntimeConfig;
use crate::sandbox::SandboxPolicy;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration of the runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganonConfig {
    pub runtime: ToolRuntimeConfig,
    pub policy: PolicyConfig,
    pub sandbox: SandboxConfig,
    pub skills: SkillsConfig,
    pub remote: RemoteConfig,
}

/// Which tools the allow-list policy admits. Empty denies everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub allow: Vec<String>,
}

/// Filesystem confinement applied to skill processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Mount point under which skills see their allowed roots
    pub mount_base: PathBuf,
    /// Policy for skills whose manifest does not carry its own
    pub default_policy: SandboxPolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mount_base: PathBuf::from("/sandbox"),
            default_policy: SandboxPolicy::default(),
        }
    }
}

/// Where skill manifests are discovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    pub dirs: Vec<PathBuf>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dirs: default_skill_dirs(),
        }
    }
}

/// Remote JSON-RPC tool endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Budget for a single JSON-RPC exchange
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
    /// Inline remote tool definitions
    pub servers: Vec<RemoteServerConfig>,
    /// Directory of remote manifest files
    pub manifest_dir: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            servers: Vec::new(),
            manifest_dir: None,
        }
    }
}

/// One remote tool declared inline in the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    pub name: String,
    #[serde(default = "default_server_version")]
    pub version: String,
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
}

impl RemoteServerConfig {
    pub fn manifest(&self) -> RemoteManifest {
        RemoteManifest {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            endpoints: self.endpoints.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
        }
    }
}

impl OrganonConfig {
    /// Load from `organon.toml` (or `ORGANON_CONFIG_PATH`) with
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("ORGANON_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("organon.toml"));
        Self::load_from(&path)
    }

    /// Load from an explicit file, still honoring environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_from(path.as_ref())
    }

    fn load_from(path: &Path) -> Result<Self> {
        let config: OrganonConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ORGANON_").split("__"))
            .extract()
            .map_err(|e| OrganonError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sandbox.default_policy.validate()?;
        for server in &self.remote.servers {
            if server.endpoints.is_empty() {
                return Err(OrganonError::Configuration(format!(
                    "remote server '{}' lists no endpoints",
                    server.name
                )));
            }
        }
        Ok(())
    }
}

fn default_skill_dirs() -> Vec<PathBuf> {
    dirs::config_dir()
        .map(|base| vec![base.join("organon").join("skills")])
        .unwrap_or_default()
}

fn default_server_version() -> String {
    "0.0.0".to_string()
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrganonConfig::default();
        assert_eq!(config.sandbox.mount_base, PathBuf::from("/sandbox"));
        assert_eq!(config.remote.call_timeout, Duration::from_secs(10));
        assert_eq!(config.runtime.default_timeout, Duration::from_secs(30));
        assert!(config.policy.allow.is_empty());
        assert!(config.remote.servers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_layered_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "organon.toml",
                r#"
                    [runtime]
                    default_timeout = "5s"

                    [policy]
                    allow = ["echo", "notes-search"]

                    [sandbox]
                    mount_base = "/mnt/skills"

                    [[remote.servers]]
                    name = "web-search"
                    endpoints = ["http://127.0.0.1:9999/rpc"]
                "#,
            )?;
            jail.set_env("ORGANON_REMOTE__CALL_TIMEOUT", "2s");

            let config = OrganonConfig::load().expect("config should load");
            assert_eq!(config.runtime.default_timeout, Duration::from_secs(5));
            assert_eq!(config.policy.allow, vec!["echo", "notes-search"]);
            assert_eq!(config.sandbox.mount_base, PathBuf::from("/mnt/skills"));
            assert_eq!(config.remote.call_timeout, Duration::from_secs(2));
            assert_eq!(config.remote.servers[0].name, "web-search");
            assert_eq!(config.remote.servers[0].version, "0.0.0");
            Ok(())
        });
    }

    #[test]
    fn test_server_without_endpoints_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "organon.toml",
                r#"
                    [[remote.servers]]
                    name = "hollow"
                    endpoints = []
                "#,
            )?;

            let err = OrganonConfig::load().expect_err("empty endpoints must not validate");
            assert!(err.to_string().contains("hollow"));
            Ok(())
        });
    }

    #[test]
    fn test_sandbox_policy_in_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "organon.toml",
                r#"
                    [sandbox.default_policy]
                    allowedRoots = ["/srv/data"]
                    timeBudgetMs = 8000
                    memoryBudgetMb = 256
                "#,
            )?;

            let config = OrganonConfig::load().expect("config should load");
            let policy = &config.sandbox.default_policy;
            assert_eq!(policy.allowed_roots, vec![PathBuf::from("/srv/data")]);
            assert_eq!(policy.time_budget_ms, 8000);
            assert_eq!(policy.memory_budget_mb, 256);
            Ok(())
        });
    }

    #[test]
    fn test_server_manifest_conversion() {
        let server = RemoteServerConfig {
            name: "lookup".to_string(),
            version: "1.4.0".to_string(),
            endpoints: vec!["http://127.0.0.1:8080/rpc".to_string()],
            description: Some("ID lookups".to_string()),
            input_schema: None,
            output_schema: None,
        };
        let manifest = server.manifest();
        assert_eq!(manifest.name, "lookup");
        assert_eq!(manifest.version, "1.4.0");
        assert_eq!(manifest.endpoints.len(), 1);
        assert!(manifest.validate().is_ok());
    }
}
