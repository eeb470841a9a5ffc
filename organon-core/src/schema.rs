//! JSON Schema compilation and argument validation
//!
//! Tool input and output contracts are plain JSON Schema documents compiled
//! under draft 2020-12. Compiled validators are cached by content hash so a
//! tool replaced with a new schema never validates against a stale one.

use crate::error::{OrganonError, Result};
use jsonschema::{Draft, Validator};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A schema compiled once for repeated validation.
pub struct CompiledSchema {
    schema: Value,
    validator: Validator,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Compile a JSON Schema document under draft 2020-12.
    pub fn compile(schema: &Value) -> Result<Self> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|e| OrganonError::Schema(format!("failed to compile schema: {}", e)))?;
        Ok(Self {
            schema: schema.clone(),
            validator,
        })
    }

    /// The source document this validator was compiled from.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.validator.is_valid(instance)
    }

    /// Validate an instance, collecting every violation message.
    pub fn validate(&self, instance: &Value) -> std::result::Result<(), Vec<String>> {
        if self.validator.is_valid(instance) {
            return Ok(());
        }
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Err(vec!["schema validation failed".to_string()])
        } else {
            Err(errors)
        }
    }
}

/// Schema accepting any JSON object. Used for tools registered without an
/// explicit input contract.
pub fn permissive_object() -> Value {
    json!({"type": "object", "additionalProperties": true})
}

/// Names of top-level string properties annotated with `"format": "path"`.
///
/// These mark arguments that cross the sandbox boundary and must be
/// translated before the tool runs.
pub fn path_fields(schema: &Value) -> Vec<String> {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    props
        .iter()
        .filter(|(_, prop)| prop.get("format").and_then(Value::as_str) == Some("path"))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Compile-once validator cache keyed by schema content.
///
/// Keys are content hashes rather than tool names: re-registration may bind
/// a tool name to a different schema, and the old entry must not shadow it.
#[derive(Debug, Default)]
pub struct SchemaCache {
    inner: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the compiled validator for a schema, compiling on first use.
    pub fn get_or_compile(&self, schema: &Value) -> Result<Arc<CompiledSchema>> {
        let key = fingerprint(schema);
        {
            let cache = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(compiled) = cache.get(&key) {
                return Ok(compiled.clone());
            }
        }
        let compiled = Arc::new(CompiledSchema::compile(schema)?);
        let mut cache = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        Ok(cache.entry(key).or_insert(compiled).clone())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn fingerprint(schema: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}
