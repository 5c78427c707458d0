//! Association path resolution
//!
//! Walks relation declarations starting from a named `through` chain and
//! flattens them into the tables and keys joining the owner to the final
//! destination model. Derived relations met along the way are expanded in
//! place, either through the chain they were declared with or by splicing
//! their stored path.

use std::collections::VecDeque;

use crate::config::ThroughConfig;
use crate::error::{ThroughError, ThroughResult};
use crate::inflector::Inflector;
use crate::relationships::{
    AssociationOptions, ModelMeta, RelationDeclaration, RelationKind, RelationshipRegistry,
};

/// Tables and keys joining an owner model to a destination model
///
/// Every table carries two keys: the column joined on the previous step and
/// the column of the table itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationPath {
    pub tables: Vec<String>,
    pub keys: Vec<String>,
    /// Models visited, ending at the destination
    pub models: Vec<String>,
    /// Successful lookups as `Model.relation` segments
    pub walked: Vec<String>,
    /// Names of the relations matched by those lookups
    pub matched: Vec<String>,
}

impl AssociationPath {
    /// Destination model of the path
    pub fn destination(&self) -> Option<&str> {
        self.models.last().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct Traversal {
    path: AssociationPath,
    /// Explicit relation names still to follow, front first
    pending: VecDeque<String>,
    using: Option<String>,
    depth: usize,
}

impl Traversal {
    fn current_model(&self) -> &str {
        self.path.destination().unwrap_or_default()
    }

    fn push_chain_front(&mut self, names: &[String]) {
        for name in names.iter().rev() {
            self.pending.push_front(name.clone());
        }
    }

    fn push_hop(&mut self, table: String, left_key: String, right_key: String) {
        self.path.tables.push(table);
        self.path.keys.push(left_key);
        self.path.keys.push(right_key);
    }
}

/// Resolves the join path of a single derived relation request
pub struct PathResolver<'a> {
    registry: &'a RelationshipRegistry,
    inflector: &'a dyn Inflector,
    config: &'a ThroughConfig,
}

impl<'a> PathResolver<'a> {
    pub fn new(
        registry: &'a RelationshipRegistry,
        inflector: &'a dyn Inflector,
        config: &'a ThroughConfig,
    ) -> Self {
        Self {
            registry,
            inflector,
            config,
        }
    }

    /// Find the path from `owner` through `options.through` for the relation `name`
    pub fn find_path(
        &self,
        owner: &str,
        name: &str,
        options: &AssociationOptions,
    ) -> ThroughResult<AssociationPath> {
        self.registry.expect_model(owner)?;

        let through = match &options.through {
            Some(through) if !through.is_empty() => through,
            _ => {
                return Err(ThroughError::validation(format!(
                    "Relation '{}.{}' requires a through chain",
                    owner, name
                )))
            }
        };

        let request = Request { owner, name };
        let traversal = Traversal {
            path: AssociationPath {
                models: vec![owner.to_string()],
                ..AssociationPath::default()
            },
            pending: through.names().iter().cloned().collect(),
            using: options.using.clone(),
            depth: 0,
        };

        let path = self.walk(&request, traversal)?;
        tracing::debug!(
            "Resolved {}.{} through {} to tables [{}]",
            owner,
            name,
            through,
            path.tables.join(", ")
        );
        Ok(path)
    }

    fn walk(&self, request: &Request<'_>, mut state: Traversal) -> ThroughResult<AssociationPath> {
        state.depth += 1;
        if state.depth > self.config.max_path_depth {
            return Err(ThroughError::PathTooDeep {
                model: request.owner.to_string(),
                association: request.name.to_string(),
                max_depth: self.config.max_path_depth,
            });
        }

        let current = state.current_model().to_string();
        let (lookup, explicit) = match state.pending.pop_front() {
            Some(name) => (name, true),
            None => (request.landing_name(&state).to_string(), false),
        };

        let Some(declaration) = self.lookup(&current, &lookup) else {
            return self.finish(request, state, &current, &lookup, explicit);
        };

        state.path.walked.push(format!("{}.{}", current, lookup));
        state.path.matched.push(declaration.name.clone());

        if declaration.kind.is_through() {
            return match declaration.expansion_chain() {
                Some(chain) => {
                    state.push_chain_front(chain.names());
                    self.expand(request, state, &current, &lookup, &declaration)
                }
                None => {
                    self.splice(&mut state, &declaration)?;
                    self.walk(request, state)
                }
            };
        }

        let target = self.registry.expect_model(&declaration.target)?;
        state.path.models.push(declaration.target.clone());

        if let Some(chain) = &declaration.through {
            match &declaration.using {
                Some(using) => state.pending.push_front(using.clone()),
                None => state.push_chain_front(chain.names()),
            }
            state.using = None;
            return self.walk(request, state);
        }

        let table = match target.inheritance_tables.first() {
            Some(table) if explicit => table.clone(),
            _ => target.table_name.clone(),
        };
        self.push_direct_hop(&mut state, &current, &declaration, &target, table)?;

        self.walk(request, state)
    }

    /// Look a relation up by exact name, then by its plural and singular forms
    fn lookup(&self, model: &str, name: &str) -> Option<RelationDeclaration> {
        if let Some(declaration) = self.registry.get(model, name) {
            return Some(declaration);
        }
        if !self.config.normalize_names {
            return None;
        }
        self.registry
            .get(model, &self.inflector.pluralize(name))
            .or_else(|| self.registry.get(model, &self.inflector.singularize(name)))
    }

    /// Handle a lookup that found nothing: either the path is complete or broken
    fn finish(
        &self,
        request: &Request<'_>,
        state: Traversal,
        current: &str,
        lookup: &str,
        explicit: bool,
    ) -> ThroughResult<AssociationPath> {
        let mut attempted = state.path.walked.clone();
        attempted.push(format!("{}.{}", current, lookup));

        if explicit {
            let from = if state.path.walked.is_empty() {
                request.owner.to_string()
            } else {
                format!("{} -> {}", request.owner, state.path.walked.join(" -> "))
            };
            return Err(ThroughError::MissingAssociation {
                model: current.to_string(),
                association: lookup.to_string(),
                message: format!(
                    "{} is missing through association :{} from {}",
                    current, lookup, from
                ),
                path: attempted,
            });
        }

        let wanted = self.inflector.singularize(request.landing_name(&state));
        let complete = state
            .path
            .matched
            .last()
            .map(|matched| self.inflector.singularize(matched) == wanted)
            .unwrap_or(false);

        if complete {
            return Ok(state.path);
        }

        Err(ThroughError::MissingAssociation {
            model: current.to_string(),
            association: lookup.to_string(),
            message: format!(
                "{}.{} could not be resolved through path {}",
                request.owner,
                request.name,
                attempted.join(" -> ")
            ),
            path: attempted,
        })
    }

    /// Expand a derived relation by walking its own chain from each candidate model
    fn expand(
        &self,
        request: &Request<'_>,
        state: Traversal,
        current: &str,
        lookup: &str,
        declaration: &RelationDeclaration,
    ) -> ThroughResult<AssociationPath> {
        let mut candidates = vec![current.to_string()];
        if declaration.target != current {
            candidates.push(declaration.target.clone());
        }

        let mut tried = Vec::with_capacity(candidates.len());
        let mut furthest: Option<ThroughError> = None;
        for candidate in &candidates {
            tried.push(candidate.clone());

            let mut attempt = state.clone();
            attempt.path.models.push(candidate.clone());

            match self.walk(request, attempt) {
                Ok(path) => return Ok(path),
                Err(err @ ThroughError::MissingAssociation { .. }) => {
                    tracing::debug!(
                        "Expanding {}.{} from {} failed, trying next candidate: {}",
                        current,
                        lookup,
                        candidate,
                        err
                    );
                    if walked_len(&err) > furthest.as_ref().map_or(0, walked_len) {
                        furthest = Some(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        match furthest {
            Some(cause) => Err(ThroughError::NoAssociationPath {
                model: current.to_string(),
                association: lookup.to_string(),
                tried,
                cause: Box::new(cause),
            }),
            None => Err(ThroughError::validation(format!(
                "Relation '{}.{}' has no candidate model to expand from",
                current, lookup
            ))),
        }
    }

    /// Append the stored path of a derived relation that has no chain to expand
    fn splice(
        &self,
        state: &mut Traversal,
        declaration: &RelationDeclaration,
    ) -> ThroughResult<()> {
        let target = self.registry.expect_model(&declaration.target)?;
        let Some(path) = &declaration.path else {
            return Err(ThroughError::validation(format!(
                "Relation '{}.{}' of kind {} has no path to splice",
                declaration.owner, declaration.name, declaration.kind
            )));
        };

        state.path.keys.push(path.left_primary_key.clone());
        for hop in &path.hops {
            state.path.tables.push(hop.table.clone());
            state.path.keys.push(hop.left_key.clone());
            state.path.keys.push(hop.right_key.clone());
        }
        state.path.tables.push(target.table_name.clone());
        state.path.keys.push(path.right_primary_key.clone());
        state.path.models.push(declaration.target.clone());

        Ok(())
    }

    fn push_direct_hop(
        &self,
        state: &mut Traversal,
        current: &str,
        declaration: &RelationDeclaration,
        target: &ModelMeta,
        table: String,
    ) -> ThroughResult<()> {
        match declaration.kind {
            RelationKind::OneToMany => {
                let left = column(declaration, &declaration.primary_key, "primary key")?;
                let right = column(declaration, &declaration.key, "key")?;
                state.push_hop(table, left, right);
            }
            RelationKind::OneToOne => {
                let left = column(declaration, &declaration.primary_key, "primary key")?;
                state.push_hop(table, left, target.primary_key.clone());
            }
            RelationKind::ManyToOne => {
                let left = column(declaration, &declaration.key, "key")?;
                let right = declaration
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| target.primary_key.clone());
                state.push_hop(table, left, right);
            }
            RelationKind::ManyToMany => {
                let owner = self.registry.expect_model(current)?;
                let left = declaration
                    .primary_key
                    .clone()
                    .unwrap_or_else(|| owner.primary_key.clone());
                let join_table = column(declaration, &declaration.join_table, "join table")?;
                let join_left = column(declaration, &declaration.left_key, "left key")?;
                let join_right = column(declaration, &declaration.right_key, "right key")?;
                state.push_hop(join_table, left, join_left);
                state.push_hop(table, join_right, target.primary_key.clone());
            }
            RelationKind::OneThroughMany
            | RelationKind::ManyThroughMany
            | RelationKind::OneThroughOne => {
                return Err(ThroughError::validation(format!(
                    "Relation '{}.{}' of kind {} is not a direct relation",
                    declaration.owner, declaration.name, declaration.kind
                )));
            }
        }
        Ok(())
    }
}

struct Request<'r> {
    owner: &'r str,
    name: &'r str,
}

impl Request<'_> {
    /// Name looked up on a landing model once the explicit chain is exhausted
    fn landing_name<'s>(&'s self, state: &'s Traversal) -> &'s str {
        state.using.as_deref().unwrap_or(self.name)
    }
}

/// Number of lookups a failed walk got through
fn walked_len(err: &ThroughError) -> usize {
    match err {
        ThroughError::MissingAssociation { path, .. } => path.len(),
        _ => 0,
    }
}

fn column(
    declaration: &RelationDeclaration,
    value: &Option<String>,
    what: &str,
) -> ThroughResult<String> {
    value.clone().ok_or_else(|| {
        ThroughError::validation(format!(
            "Relation '{}.{}' has no {}",
            declaration.owner, declaration.name, what
        ))
    })
}
