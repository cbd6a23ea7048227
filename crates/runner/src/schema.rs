// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured-output validation against named JSON schemas
//!
//! Schemas live as `<name>_output.json` files in a schemas directory and
//! are cached by name; a built-in `default` schema covers the common
//! summary/changed-files shape. Validation reports human-readable paths
//! (`root → field → index`) rather than raw pointers.

use jsonschema::paths::PathChunk;
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Built-in schema names a free-text task type maps to.
pub fn schema_for_task_type(task_type: &str) -> &'static str {
    match task_type {
        "review" | "code_review" => "review",
        "analyze" | "analysis" | "explain" => "analysis",
        _ => "default",
    }
}

fn default_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "changed_files": {
                "type": "array",
                "items": { "type": "string" }
            },
            "commands_run": {
                "type": "array",
                "items": { "type": "string" }
            },
            "tests_run": {
                "type": "object",
                "properties": {
                    "passed": { "type": "integer" },
                    "failed": { "type": "integer" },
                    "skipped": { "type": "integer" }
                }
            },
            "next_steps": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["summary", "changed_files"]
    })
}

/// Named-schema validator with a per-name cache.
pub struct SchemaValidator {
    schemas_dir: Option<PathBuf>,
    cache: Mutex<HashMap<String, Value>>,
}

impl SchemaValidator {
    pub fn new(schemas_dir: Option<PathBuf>) -> Self {
        Self {
            schemas_dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load a schema by name, falling back to the built-in default when
    /// the file is absent or unreadable.
    pub fn load_schema(&self, name: &str) -> Value {
        if let Ok(cache) = self.cache.lock() {
            if let Some(schema) = cache.get(name) {
                return schema.clone();
            }
        }

        let loaded = self
            .schemas_dir
            .as_ref()
            .map(|dir| dir.join(format!("{name}_output.json")))
            .filter(|path| path.exists())
            .and_then(|path| {
                std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|text| serde_json::from_str(&text).ok())
                    .or_else(|| {
                        warn!(path = %path.display(), "unreadable schema file, using default");
                        None
                    })
            });

        let schema = match loaded {
            Some(schema) => schema,
            None => {
                debug!(name, "schema not found, using built-in default");
                default_schema()
            }
        };

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(name.to_string(), schema.clone());
        }
        schema
    }

    /// Validate an instance against a named schema. Returns validity plus
    /// every violation as a readable path.
    pub fn validate(&self, instance: &Value, name: &str) -> (bool, Vec<String>) {
        let schema = self.load_schema(name);

        let compiled = match JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
        {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!(name, error = %e, "schema does not compile");
                return (false, vec![format!("schema '{name}' is invalid: {e}")]);
            }
        };

        let errors: Vec<String> = match compiled.validate(instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| {
                    let mut path = String::from("root");
                    for chunk in error.instance_path.iter() {
                        match chunk {
                            PathChunk::Property(p) => {
                                path.push_str(" → ");
                                path.push_str(p.as_ref());
                            }
                            PathChunk::Index(i) => {
                                path.push_str(&format!(" → {i}"));
                            }
                            _ => {}
                        }
                    }
                    format!("{path}: {error}")
                })
                .collect(),
        };

        (errors.is_empty(), errors)
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
