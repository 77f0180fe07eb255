//! Schema Registry
//!
//! Simple in-memory registry of field schemas: the embedded default plus
//! any schema files loaded from disk.

use super::definition::{FieldDef, FieldRole, FieldType, Schema};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// Name of the built-in schema
pub const DEFAULT_SCHEMA: &str = "pabulib";

/// Simple in-memory schema registry
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
    active_schema: Option<String>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
            active_schema: None,
        }
    }

    /// Registry holding the embedded schema, already active
    pub fn with_default() -> Self {
        let mut registry = Self::new();
        registry.add_embedded_default();
        registry.set_active_schema(DEFAULT_SCHEMA);
        registry
    }

    /// Add a schema to the registry
    pub fn add_schema(&mut self, schema: Schema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    /// Set the active schema
    pub fn set_active_schema(&mut self, name: &str) -> bool {
        if self.schemas.contains_key(name) {
            self.active_schema = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Get the currently active schema
    pub fn get_active_schema(&self) -> Option<&Schema> {
        self.active_schema
            .as_ref()
            .and_then(|name| self.schemas.get(name))
    }

    /// List all available schemas
    pub fn list_schemas(&self) -> Vec<&str> {
        self.schemas.keys().map(|s| s.as_str()).collect()
    }

    /// Load a schema file, register it and make it active
    pub fn load_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read schema file {}", path.display()))?;
        let schema = Schema::from_toml(&content)
            .with_context(|| format!("load schema file {}", path.display()))?;
        let name = schema.name.clone();

        log::info!("Loaded schema '{}' from {}", name, path.display());
        self.add_schema(schema);
        self.set_active_schema(&name);
        Ok(name)
    }

    /// Add the schema embedded in the binary
    pub fn add_embedded_default(&mut self) {
        self.add_schema(default_schema());
    }
}

/// The embedded default schema
pub fn default_schema() -> Schema {
    let embedded_toml = include_str!("../../resources/schema/pabulib.toml");

    match Schema::from_toml(embedded_toml) {
        Ok(schema) => schema,
        Err(e) => {
            // Fallback to minimal schema if parsing fails
            log::warn!(
                "Failed to parse embedded schema: {:#}. Using minimal fallback.",
                e
            );
            minimal_schema()
        }
    }
}

/// Minimal fallback schema in case embedded TOML parsing fails
fn minimal_schema() -> Schema {
    Schema {
        name: DEFAULT_SCHEMA.to_string(),
        version: Some("minimal-fallback".to_string()),
        description: Some("Minimal fallback schema".to_string()),
        meta: vec![
            FieldDef::new("num_projects", FieldType::Int).with_role(FieldRole::ProjectCount),
            FieldDef::new("num_votes", FieldType::Int).with_role(FieldRole::VoteCount),
            FieldDef::new("budget", FieldType::Float)
                .required()
                .with_role(FieldRole::Budget),
            FieldDef::new("vote_type", FieldType::String).with_role(FieldRole::VoteType),
            FieldDef::new("rule", FieldType::String).with_role(FieldRole::Rule),
        ],
        projects: vec![
            FieldDef::new("project_id", FieldType::String)
                .required()
                .with_role(FieldRole::Id),
            FieldDef::new("cost", FieldType::Float)
                .required()
                .with_role(FieldRole::Cost),
        ],
        votes: vec![
            FieldDef::new("voter_id", FieldType::String)
                .required()
                .with_role(FieldRole::Id),
            FieldDef::new("vote", FieldType::List)
                .required()
                .with_role(FieldRole::Selection),
        ],
    }
}
