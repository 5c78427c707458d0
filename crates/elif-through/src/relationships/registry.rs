//! Relationship Registry - Runtime storage for model and relation metadata

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};

use super::metadata::{ModelMeta, RelationDeclaration, RelationKind};
use crate::error::{ThroughError, ThroughResult};

/// Thread-safe registry of models and their relation declarations
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    /// Model name -> table metadata
    models: Arc<DashMap<String, ModelMeta>>,

    /// Model name -> relation name -> declaration
    relationships: Arc<DashMap<String, HashMap<String, RelationDeclaration>>>,
}

impl RelationshipRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a model's table metadata
    pub fn register_model(&self, meta: ModelMeta) -> ThroughResult<()> {
        meta.validate()?;
        tracing::debug!("Registering model {} (table: {})", meta.name, meta.table_name);
        self.models.insert(meta.name.clone(), meta);
        Ok(())
    }

    /// Get a model's table metadata
    pub fn model(&self, name: &str) -> Option<ModelMeta> {
        self.models.get(name).map(|entry| entry.clone())
    }

    /// Get a model's table metadata, failing if it was never registered
    pub fn expect_model(&self, name: &str) -> ThroughResult<ModelMeta> {
        self.model(name).ok_or_else(|| ThroughError::unknown_model(name))
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Register a relation for its owner, replacing any declaration of the same name
    pub fn register(&self, declaration: RelationDeclaration) -> ThroughResult<()> {
        declaration.validate()?;

        if !self.has_model(&declaration.owner) {
            return Err(ThroughError::unknown_model(&declaration.owner));
        }

        let mut model_relationships = self
            .relationships
            .entry(declaration.owner.clone())
            .or_insert_with(HashMap::new);

        if model_relationships.contains_key(&declaration.name) {
            tracing::debug!(
                "Replacing relation {}.{} with kind {}",
                declaration.owner,
                declaration.name,
                declaration.kind
            );
        }

        model_relationships.insert(declaration.name.clone(), declaration);
        Ok(())
    }

    /// Get a relation by model and relation name
    pub fn get(&self, model_name: &str, relation_name: &str) -> Option<RelationDeclaration> {
        self.relationships
            .get(model_name)?
            .get(relation_name)
            .cloned()
    }

    /// Check if a relation exists
    pub fn has_relationship(&self, model_name: &str, relation_name: &str) -> bool {
        self.relationships
            .get(model_name)
            .map(|relationships| relationships.contains_key(relation_name))
            .unwrap_or(false)
    }

    /// Get all relation names for a model, sorted
    pub fn relationship_names(&self, model_name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .relationships
            .get(model_name)
            .map(|relationships| relationships.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let mut relationship_kind_counts = HashMap::new();
        let mut total_relationships = 0;

        for entry in self.relationships.iter() {
            for declaration in entry.value().values() {
                total_relationships += 1;
                *relationship_kind_counts.entry(declaration.kind).or_insert(0) += 1;
            }
        }

        RegistryStats {
            total_models: self.models.len(),
            total_relationships,
            relationship_kind_counts,
        }
    }

    /// Export every model and relation as JSON, ordered by name
    pub fn export_json(&self) -> ThroughResult<Value> {
        let models: BTreeMap<String, ModelMeta> = self
            .models
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let relationships: BTreeMap<String, BTreeMap<String, RelationDeclaration>> = self
            .relationships
            .iter()
            .map(|entry| {
                let declarations = entry
                    .value()
                    .iter()
                    .map(|(name, declaration)| (name.clone(), declaration.clone()))
                    .collect();
                (entry.key().clone(), declarations)
            })
            .collect();

        let to_value = |value: serde_json::Result<Value>| {
            value.map_err(|e| ThroughError::validation(format!("Failed to export registry: {}", e)))
        };

        Ok(json!({
            "models": to_value(serde_json::to_value(models))?,
            "relationships": to_value(serde_json::to_value(relationships))?,
        }))
    }

    /// Clear all registered models and relations
    pub fn clear(&self) {
        self.models.clear();
        self.relationships.clear();
    }
}

/// Statistics about the relationship registry
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_models: usize,
    pub total_relationships: usize,
    pub relationship_kind_counts: HashMap<RelationKind, usize>,
}

impl RegistryStats {
    /// Number of relations derived through other relations
    pub fn through_relationships(&self) -> usize {
        self.relationship_kind_counts
            .iter()
            .filter(|(kind, _)| kind.is_through())
            .map(|(_, count)| *count)
            .sum()
    }
}
