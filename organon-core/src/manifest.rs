//! Skill and remote tool manifests
//!
//! A skill is described either by a `SKILL.md` with YAML frontmatter or by
//! a standalone `skill.yaml`/`skill.json`; a remote tool by a manifest
//! file naming its JSON-RPC endpoints. Directory loading is tolerant: a
//! malformed manifest is logged and skipped so one bad file cannot keep a
//! directory of good ones from registering.

use crate::catalog::{ToolCatalog, ToolMeta, ToolSource};
use crate::error::{OrganonError, Result};
use crate::sandbox::SandboxPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Manifest for one sandboxed skill.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Capability tags the skill requires at execution time
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Executable to spawn; a manifest without one is documentation-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<PathBuf>,
    #[serde(default, alias = "input_schema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, alias = "output_schema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxPolicy>,
}

impl SkillManifest {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let manifest: SkillManifest = serde_yaml::from_str(content)
            .map_err(|e| OrganonError::Manifest(format!("invalid skill manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a `SKILL.md`: YAML frontmatter between `---` fences, markdown
    /// body ignored.
    pub fn from_skill_md(content: &str) -> Result<Self> {
        let trimmed = content.trim_start();
        let Some(rest) = trimmed.strip_prefix("---") else {
            return Err(OrganonError::Manifest(
                "SKILL.md is missing its opening frontmatter fence".to_string(),
            ));
        };
        let Some(end) = rest.find("\n---") else {
            return Err(OrganonError::Manifest(
                "SKILL.md frontmatter is never closed".to_string(),
            ));
        };
        Self::from_yaml_str(&rest[..end])
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") => Self::from_skill_md(&content),
            Some("json") => {
                let manifest: SkillManifest = serde_json::from_str(&content)
                    .map_err(|e| OrganonError::Manifest(format!("invalid skill manifest: {e}")))?;
                manifest.validate()?;
                Ok(manifest)
            }
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(OrganonError::Manifest(format!(
                "skill name '{}' must be lowercase alphanumeric with hyphens",
                self.name
            )));
        }
        if self.version.trim().is_empty() {
            return Err(OrganonError::Manifest(format!(
                "skill '{}' is missing a version",
                self.name
            )));
        }
        if let Some(sandbox) = &self.sandbox {
            sandbox.validate()?;
        }
        Ok(())
    }

    /// Catalog entry for this skill, or None when there is no entrypoint
    /// to execute.
    pub fn tool_meta(&self) -> Option<ToolMeta> {
        let entrypoint = self.entrypoint.clone()?;
        let mut meta = ToolMeta::new(
            &self.name,
            &self.version,
            ToolSource::Skill {
                entrypoint,
                sandbox: self.sandbox.clone(),
            },
        )
        .with_capability_tags(self.capabilities.iter().cloned());
        if let Some(description) = &self.description {
            meta = meta.with_description(description);
        }
        if let Some(schema) = &self.input_schema {
            meta = meta.with_input_schema(schema.clone());
        }
        if let Some(schema) = &self.output_schema {
            meta = meta.with_output_schema(schema.clone());
        }
        Some(meta)
    }
}

/// Manifest for one remote JSON-RPC tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tried in order until one accepts a connection
    pub endpoints: Vec<String>,
    #[serde(default, alias = "input_schema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    #[serde(default, alias = "output_schema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

impl RemoteManifest {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let manifest: RemoteManifest = serde_yaml::from_str(content)
            .map_err(|e| OrganonError::Manifest(format!("invalid remote manifest: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => {
                let manifest: RemoteManifest = serde_json::from_str(&content)
                    .map_err(|e| OrganonError::Manifest(format!("invalid remote manifest: {e}")))?;
                manifest.validate()?;
                Ok(manifest)
            }
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(OrganonError::Manifest(format!(
                "remote tool name '{}' must be lowercase alphanumeric with hyphens",
                self.name
            )));
        }
        if self.endpoints.is_empty() {
            return Err(OrganonError::Manifest(format!(
                "remote tool '{}' lists no endpoints",
                self.name
            )));
        }
        Ok(())
    }

    pub fn tool_meta(&self) -> ToolMeta {
        let mut meta = ToolMeta::new(
            &self.name,
            &self.version,
            ToolSource::Remote {
                endpoints: self.endpoints.clone(),
            },
        );
        if let Some(description) = &self.description {
            meta = meta.with_description(description);
        }
        if let Some(schema) = &self.input_schema {
            meta = meta.with_input_schema(schema.clone());
        }
        if let Some(schema) = &self.output_schema {
            meta = meta.with_output_schema(schema.clone());
        }
        meta
    }
}

/// Scan a directory for skills. Two layouts are recognized: a
/// subdirectory holding a `SKILL.md` (or `skill.yaml`/`skill.yml`/
/// `skill.json`), and a bare manifest file sitting directly in the
/// directory. Relative entrypoints resolve against the manifest's
/// directory.
pub fn load_skill_dir(dir: &Path) -> Result<Vec<SkillManifest>> {
    let mut manifests = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let candidate = if path.is_dir() {
            ["SKILL.md", "skill.yaml", "skill.yml", "skill.json"]
                .iter()
                .map(|name| path.join(name))
                .find(|p| p.is_file())
        } else if is_manifest_file(&path) {
            Some(path.clone())
        } else {
            None
        };
        let Some(manifest_path) = candidate else {
            continue;
        };
        match SkillManifest::from_path(&manifest_path) {
            Ok(mut manifest) => {
                if let Some(entrypoint) = manifest.entrypoint.take() {
                    manifest.entrypoint = Some(resolve_entrypoint(&manifest_path, entrypoint));
                }
                manifests.push(manifest);
            }
            Err(e) => {
                tracing::warn!(
                    path = %manifest_path.display(),
                    error = %e,
                    "skipping malformed skill manifest"
                );
            }
        }
    }
    manifests.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(manifests)
}

/// Scan a directory of remote tool manifests.
pub fn load_remote_dir(dir: &Path) -> Result<Vec<RemoteManifest>> {
    let mut manifests = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !is_manifest_file(&path) {
            continue;
        }
        match RemoteManifest::from_path(&path) {
            Ok(manifest) => manifests.push(manifest),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping malformed remote manifest"
                );
            }
        }
    }
    manifests.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(manifests)
}

/// Register every manifest with the catalog. Skills without an entrypoint
/// are skipped with a warning; conflicting registrations surface as
/// catalog errors rather than being silently dropped.
pub fn register_manifests(
    catalog: &ToolCatalog,
    skills: &[SkillManifest],
    remotes: &[RemoteManifest],
) -> Result<usize> {
    let mut registered = 0;
    for skill in skills {
        let Some(meta) = skill.tool_meta() else {
            tracing::warn!(skill = %skill.name, "manifest has no entrypoint, not registering");
            continue;
        };
        catalog.register(meta)?;
        registered += 1;
    }
    for remote in remotes {
        catalog.register(remote.tool_meta())?;
        registered += 1;
    }
    Ok(registered)
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml") | Some("json")
    )
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn resolve_entrypoint(manifest_path: &Path, entrypoint: PathBuf) -> PathBuf {
    if entrypoint.is_absolute() {
        return entrypoint;
    }
    manifest_path
        .parent()
        .map(|dir| dir.join(&entrypoint))
        .unwrap_or(entrypoint)
}

#[cfg(test)]
mod manifest_tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const NOTES_SKILL_MD: &str = r#"---
name: notes-search
version: 1.2.0
description: Search the local notes archive
capabilities:
  - files-read
entrypoint: ./run.sh
inputSchema:
  type: object
  properties:
    query:
      type: string
  required:
    - query
---

# Notes Search

Reads the archive under the first allowed root and returns matching lines.
"#;

    #[test]
    fn test_skill_md_frontmatter_parsed() {
        let manifest = SkillManifest::from_skill_md(NOTES_SKILL_MD).unwrap();
        assert_eq!(manifest.name, "notes-search");
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.capabilities, vec!["files-read"]);
        assert_eq!(manifest.entrypoint, Some(PathBuf::from("./run.sh")));
        assert!(manifest.input_schema.is_some());
        assert!(manifest.output_schema.is_none());
    }

    #[test]
    fn test_skill_md_without_fences_rejected() {
        let err = SkillManifest::from_skill_md("# Just markdown\n").unwrap_err();
        assert!(err.to_string().contains("frontmatter"));

        let err = SkillManifest::from_skill_md("---\nname: x\nversion: 1.0.0\n").unwrap_err();
        assert!(err.to_string().contains("never closed"));
    }

    #[test]
    fn test_yaml_manifest_accepts_snake_case_aliases() {
        let manifest = SkillManifest::from_yaml_str(
            r#"
name: archiver
version: 0.3.1
entrypoint: /opt/skills/archiver
input_schema:
  type: object
sandbox:
  allowedRoots:
    - /var/archive
  timeBudgetMs: 5000
"#,
        )
        .unwrap();
        assert_eq!(manifest.name, "archiver");
        assert!(manifest.input_schema.is_some());
        let sandbox = manifest.sandbox.unwrap();
        assert_eq!(sandbox.allowed_roots, vec![PathBuf::from("/var/archive")]);
        assert_eq!(sandbox.time_budget_ms, 5000);
    }

    #[test]
    fn test_name_validation() {
        for bad in ["", "Bad_Name", "-leading", "trailing-", "has space"] {
            let result = SkillManifest::from_yaml_str(&format!(
                "name: \"{bad}\"\nversion: 1.0.0\n"
            ));
            assert!(result.is_err(), "name {bad:?} should be rejected");
        }
        assert!(SkillManifest::from_yaml_str("name: ok-tool2\nversion: 1.0.0\n").is_ok());
    }

    #[test]
    fn test_invalid_sandbox_rejected() {
        let err = SkillManifest::from_yaml_str(
            r#"
name: loose
version: 1.0.0
sandbox:
  allowedRoots:
    - relative/root
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_tool_meta_requires_entrypoint() {
        let doc_only =
            SkillManifest::from_yaml_str("name: readme-only\nversion: 1.0.0\n").unwrap();
        assert!(doc_only.tool_meta().is_none());

        let runnable = SkillManifest::from_yaml_str(
            "name: runner\nversion: 1.0.0\nentrypoint: /opt/run\ncapabilities: [net]\n",
        )
        .unwrap();
        let meta = runnable.tool_meta().unwrap();
        assert_eq!(meta.name, "runner");
        assert!(meta.capability_tags.contains(&"net".to_string()));
        assert!(matches!(meta.source, ToolSource::Skill { .. }));
    }

    #[test]
    fn test_load_skill_dir_layouts_and_sorting() {
        let dir = TempDir::new().unwrap();

        let beta = dir.path().join("beta");
        std::fs::create_dir(&beta).unwrap();
        std::fs::write(beta.join("SKILL.md"), NOTES_SKILL_MD).unwrap();

        let alpha = dir.path().join("alpha");
        std::fs::create_dir(&alpha).unwrap();
        std::fs::write(
            alpha.join("skill.yaml"),
            "name: alpha-tool\nversion: 2.0.0\nentrypoint: bin/alpha\n",
        )
        .unwrap();

        let broken = dir.path().join("broken");
        std::fs::create_dir(&broken).unwrap();
        std::fs::write(broken.join("SKILL.md"), "not: [valid\n").unwrap();

        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manifests = load_skill_dir(dir.path()).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].name, "alpha-tool");
        assert_eq!(manifests[1].name, "notes-search");

        // Relative entrypoints land under the manifest's directory.
        assert_eq!(
            manifests[0].entrypoint,
            Some(alpha.join("bin/alpha")),
        );
        assert_eq!(manifests[1].entrypoint, Some(beta.join("./run.sh")));
    }

    #[test]
    fn test_remote_manifest_requires_endpoints() {
        let err = RemoteManifest::from_yaml_str("name: search\nversion: 1.0.0\nendpoints: []\n")
            .unwrap_err();
        assert!(err.to_string().contains("no endpoints"));
    }

    #[test]
    fn test_load_remote_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("search.yaml"),
            "name: web-search\nversion: 1.0.0\nendpoints:\n  - http://127.0.0.1:8080/rpc\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("lookup.json"),
            r#"{"name": "lookup", "version": "1.0.0", "endpoints": ["http://127.0.0.1:8081/rpc"]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "endpoints: {broken\n").unwrap();

        let manifests = load_remote_dir(dir.path()).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].name, "lookup");
        assert_eq!(manifests[1].name, "web-search");
    }

    #[test]
    fn test_register_manifests_skips_doc_only_skills() {
        let catalog = ToolCatalog::new();
        let skills = vec![
            SkillManifest::from_yaml_str(
                "name: runner\nversion: 1.0.0\nentrypoint: /opt/run\n",
            )
            .unwrap(),
            SkillManifest::from_yaml_str("name: readme-only\nversion: 1.0.0\n").unwrap(),
        ];
        let remotes = vec![RemoteManifest {
            name: "web-search".to_string(),
            version: "1.0.0".to_string(),
            description: None,
            endpoints: vec!["http://127.0.0.1:8080/rpc".to_string()],
            input_schema: Some(json!({"type": "object"})),
            output_schema: None,
        }];

        let registered = register_manifests(&catalog, &skills, &remotes).unwrap();
        assert_eq!(registered, 2);
        assert!(catalog.contains("runner"));
        assert!(catalog.contains("web-search"));
        assert!(!catalog.contains("readme-only"));
    }
}
