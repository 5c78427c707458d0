//! Relation declaration entry point
//!
//! [`ThroughAssociations`] intercepts every relation declaration. Requests
//! without a `through` option are completed with naming-convention defaults
//! and constructed directly; requests with one are resolved into a hop list
//! and constructed as a derived relation.

use std::fmt;
use std::sync::Arc;

use crate::config::ThroughConfig;
use crate::error::{ThroughError, ThroughResult};
use crate::inflector::{DefaultInflector, Inflector};
use crate::relationships::{
    AssociationOptions, ModelMeta, RelationDeclaration, RelationKind, RelationshipRegistry,
    ThroughPath,
};

use super::cardinality::{build_through_path, through_kind_for};
use super::path::PathResolver;

/// Builds relations from completed declarations
pub trait RelationConstructor: Send + Sync {
    fn construct(
        &self,
        registry: &RelationshipRegistry,
        declaration: RelationDeclaration,
    ) -> ThroughResult<RelationDeclaration>;
}

impl<T: RelationConstructor + ?Sized> RelationConstructor for Arc<T> {
    fn construct(
        &self,
        registry: &RelationshipRegistry,
        declaration: RelationDeclaration,
    ) -> ThroughResult<RelationDeclaration> {
        (**self).construct(registry, declaration)
    }
}

/// Validates declarations and stores them in the registry
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConstructor;

impl RelationConstructor for RegistryConstructor {
    fn construct(
        &self,
        registry: &RelationshipRegistry,
        declaration: RelationDeclaration,
    ) -> ThroughResult<RelationDeclaration> {
        registry.register(declaration.clone())?;
        Ok(declaration)
    }
}

/// Relation declarations for a set of models sharing one registry
#[derive(Clone)]
pub struct ThroughAssociations {
    registry: RelationshipRegistry,
    inflector: Arc<dyn Inflector>,
    constructor: Arc<dyn RelationConstructor>,
    config: ThroughConfig,
}

impl fmt::Debug for ThroughAssociations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThroughAssociations")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ThroughAssociations {
    fn default() -> Self {
        Self::new(RelationshipRegistry::new())
    }
}

impl ThroughAssociations {
    pub fn new(registry: RelationshipRegistry) -> Self {
        Self {
            registry,
            inflector: Arc::new(DefaultInflector),
            constructor: Arc::new(RegistryConstructor),
            config: ThroughConfig::default(),
        }
    }

    /// Create with configuration loaded from the environment
    pub fn from_env(registry: RelationshipRegistry) -> ThroughResult<Self> {
        let config = ThroughConfig::from_env()?;
        Ok(Self::new(registry).with_config(config))
    }

    pub fn with_config(mut self, config: ThroughConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_inflector(mut self, inflector: impl Inflector + 'static) -> Self {
        self.inflector = Arc::new(inflector);
        self
    }

    pub fn with_constructor(mut self, constructor: impl RelationConstructor + 'static) -> Self {
        self.constructor = Arc::new(constructor);
        self
    }

    pub fn registry(&self) -> &RelationshipRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ThroughConfig {
        &self.config
    }

    pub fn inflector(&self) -> &dyn Inflector {
        self.inflector.as_ref()
    }

    pub fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(&self.registry, self.inflector.as_ref(), &self.config)
    }

    /// Register a model with a conventional table name and the configured primary key
    pub fn define_model(&self, name: &str) -> ThroughResult<ModelMeta> {
        let meta = ModelMeta::new(name, self.inflector.tableize(name))
            .with_primary_key(self.config.default_primary_key.clone());
        self.registry.register_model(meta.clone())?;
        Ok(meta)
    }

    pub fn register_model(&self, meta: ModelMeta) -> ThroughResult<()> {
        self.registry.register_model(meta)
    }

    /// Declaration helpers scoped to one model
    pub fn model(&self, name: impl Into<String>) -> ModelScope<'_> {
        ModelScope {
            associations: self,
            model: name.into(),
        }
    }

    /// Declare a relation, resolving a path when `options.through` is set
    pub fn associate(
        &self,
        owner: &str,
        kind: RelationKind,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        if options.through.is_some() {
            return self.associate_through(owner, kind, name, options);
        }

        let declaration = self.direct_declaration(owner, kind, name, &options)?;
        tracing::debug!("Declaring {} {}.{} -> {}", kind, owner, name, declaration.target);
        self.constructor.construct(&self.registry, declaration)
    }

    /// Declare a derived relation from the path behind `options.through`
    pub fn associate_through(
        &self,
        owner: &str,
        kind: RelationKind,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        let derived = through_kind_for(kind)?;
        let through = match &options.through {
            Some(through) if !through.is_empty() => through.clone(),
            _ => {
                return Err(ThroughError::validation(format!(
                    "Relation '{}.{}' requires a through chain",
                    owner, name
                )))
            }
        };

        let path = self.resolver().find_path(owner, name, &options)?;
        let destination = path
            .destination()
            .map(|model| self.registry.expect_model(model))
            .transpose()?
            .ok_or_else(|| ThroughError::validation("Association path does not reach any model"))?;
        let resolved = build_through_path(path, &destination)?;

        let path = ThroughPath {
            left_primary_key: options
                .left_primary_key
                .clone()
                .unwrap_or(resolved.path.left_primary_key),
            // through_kind_for never yields OneThroughOne today, which would
            // keep the boundary keys alone.
            hops: if derived.takes_hop_path() {
                resolved.path.hops
            } else {
                Vec::new()
            },
            right_primary_key: options
                .right_primary_key
                .clone()
                .unwrap_or(resolved.path.right_primary_key),
        };
        let target = options.target.clone().unwrap_or(resolved.target);

        tracing::debug!(
            "Declaring {} {}.{} -> {} through {} ({} hops)",
            derived,
            owner,
            name,
            target,
            through,
            path.hops.len()
        );

        let mut declaration = RelationDeclaration::new(owner, name, derived, target)
            .with_path(path)
            .with_originally_through(through);
        declaration.using = options.using;

        self.constructor.construct(&self.registry, declaration)
    }

    /// Complete a direct declaration with naming-convention defaults
    fn direct_declaration(
        &self,
        owner: &str,
        kind: RelationKind,
        name: &str,
        options: &AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        let owner_meta = self.registry.expect_model(owner)?;
        let target = options
            .target
            .clone()
            .unwrap_or_else(|| self.inflector.classify(name));
        let declaration = RelationDeclaration::new(owner, name, kind, target.clone());

        let declaration = match kind {
            RelationKind::OneToMany | RelationKind::OneToOne => declaration.with_keys(
                options
                    .key
                    .clone()
                    .unwrap_or_else(|| self.inflector.foreign_key(owner)),
                options
                    .primary_key
                    .clone()
                    .unwrap_or(owner_meta.primary_key),
            ),
            RelationKind::ManyToOne => {
                let primary_key = match &options.primary_key {
                    Some(primary_key) => primary_key.clone(),
                    None => self.registry.expect_model(&target)?.primary_key,
                };
                let key = options
                    .key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", self.inflector.singularize(name)));
                declaration.with_keys(key, primary_key)
            }
            RelationKind::ManyToMany => {
                let target_meta = self.registry.expect_model(&target)?;
                let join_table = options.join_table.clone().unwrap_or_else(|| {
                    let mut tables = [owner_meta.table_name.clone(), target_meta.table_name];
                    tables.sort();
                    tables.join("_")
                });
                let mut declaration = declaration.with_join_table(
                    join_table,
                    options
                        .left_key
                        .clone()
                        .unwrap_or_else(|| self.inflector.foreign_key(owner)),
                    options
                        .right_key
                        .clone()
                        .unwrap_or_else(|| self.inflector.foreign_key(&target)),
                );
                declaration.primary_key = options.primary_key.clone();
                declaration
            }
            RelationKind::OneThroughMany
            | RelationKind::ManyThroughMany
            | RelationKind::OneThroughOne => {
                return Err(ThroughError::validation(format!(
                    "Relation '{}.{}' of kind {} needs a through option or a registered path",
                    owner, name, kind
                )));
            }
        };

        Ok(declaration)
    }
}

/// Declaration helpers for a single owner model
#[derive(Debug, Clone)]
pub struct ModelScope<'a> {
    associations: &'a ThroughAssociations,
    model: String,
}

impl ModelScope<'_> {
    pub fn name(&self) -> &str {
        &self.model
    }

    pub fn one_to_many(
        &self,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        self.associations
            .associate(&self.model, RelationKind::OneToMany, name, options)
    }

    pub fn many_to_one(
        &self,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        self.associations
            .associate(&self.model, RelationKind::ManyToOne, name, options)
    }

    pub fn one_to_one(
        &self,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        self.associations
            .associate(&self.model, RelationKind::OneToOne, name, options)
    }

    pub fn many_to_many(
        &self,
        name: &str,
        options: AssociationOptions,
    ) -> ThroughResult<RelationDeclaration> {
        self.associations
            .associate(&self.model, RelationKind::ManyToMany, name, options)
    }
}
