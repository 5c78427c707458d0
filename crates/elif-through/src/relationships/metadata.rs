//! Relationship Metadata - Declarations, model metadata and caller options

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ThroughError, ThroughResult};

/// Defines the kind of relation between two models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Foreign key lives on the target (hasMany)
    OneToMany,
    /// Foreign key lives on the owner (belongsTo)
    ManyToOne,
    /// Single related row (hasOne)
    OneToOne,
    /// Related rows through a join table
    ManyToMany,
    /// Single related row reached through a multi-hop path
    OneThroughMany,
    /// Related rows reached through a multi-hop path
    ManyThroughMany,
    /// Single related row reached through exactly one implied hop
    OneThroughOne,
}

impl RelationKind {
    pub const ALL: [RelationKind; 7] = [
        Self::OneToMany,
        Self::ManyToOne,
        Self::OneToOne,
        Self::ManyToMany,
        Self::OneThroughMany,
        Self::ManyThroughMany,
        Self::OneThroughOne,
    ];

    /// Returns true for relations derived from a path of other relations
    pub fn is_through(self) -> bool {
        matches!(
            self,
            Self::OneThroughMany | Self::ManyThroughMany | Self::OneThroughOne
        )
    }

    /// Returns true if this relation returns a collection
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::OneToMany | Self::ManyToMany | Self::ManyThroughMany
        )
    }

    /// Returns true if construction takes an explicit hop list
    pub fn takes_hop_path(self) -> bool {
        matches!(self, Self::OneThroughMany | Self::ManyThroughMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::OneToOne => "one_to_one",
            Self::ManyToMany => "many_to_many",
            Self::OneThroughMany => "one_through_many",
            Self::ManyThroughMany => "many_through_many",
            Self::OneThroughOne => "one_through_one",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered chain of relation names a derived relation is defined through
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThroughRef(Vec<String>);

impl ThroughRef {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ThroughRef {
    fn from(name: &str) -> Self {
        Self(vec![name.to_string()])
    }
}

impl From<String> for ThroughRef {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<&str>> for ThroughRef {
    fn from(names: Vec<&str>) -> Self {
        Self::new(names)
    }
}

impl<const N: usize> From<[&str; N]> for ThroughRef {
    fn from(names: [&str; N]) -> Self {
        Self::new(names)
    }
}

impl fmt::Display for ThroughRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|name| format!(":{}", name)).collect();
        f.write_str(&names.join(" -> "))
    }
}

/// One join step of a resolved path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub table: String,
    /// Column in `table` joined to the previous step
    pub left_key: String,
    /// Column in `table` joined to the next step
    pub right_key: String,
}

impl Hop {
    pub fn new(
        table: impl Into<String>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            left_key: left_key.into(),
            right_key: right_key.into(),
        }
    }
}

/// Flattened join path of a through relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughPath {
    /// Key on the owner's table the first hop joins against
    pub left_primary_key: String,
    pub hops: Vec<Hop>,
    /// Key on the target's table the last hop joins against
    pub right_primary_key: String,
}

impl ThroughPath {
    pub fn key_count(&self) -> usize {
        self.hops.len() * 2 + 2
    }
}

/// Table metadata of a registered model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    pub name: String,
    pub table_name: String,
    pub primary_key: String,
    /// Class-table-inheritance tables, base table first
    pub inheritance_tables: Vec<String>,
}

impl ModelMeta {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            primary_key: "id".to_string(),
            inheritance_tables: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_inheritance_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inheritance_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> ThroughResult<()> {
        if self.name.is_empty() {
            return Err(ThroughError::validation("Model name cannot be empty"));
        }
        if self.table_name.is_empty() {
            return Err(ThroughError::validation(format!(
                "Model '{}' must have a table name",
                self.name
            )));
        }
        if self.primary_key.is_empty() {
            return Err(ThroughError::validation(format!(
                "Model '{}' must have a primary key",
                self.name
            )));
        }
        Ok(())
    }
}

/// Caller-supplied options of a relation declaration
///
/// `target`, `left_primary_key` and `right_primary_key` take precedence over
/// values computed by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationOptions {
    pub through: Option<ThroughRef>,
    pub target: Option<String>,
    pub key: Option<String>,
    pub primary_key: Option<String>,
    pub join_table: Option<String>,
    pub left_key: Option<String>,
    pub right_key: Option<String>,
    pub left_primary_key: Option<String>,
    pub right_primary_key: Option<String>,
    /// Relation name looked up on landing models instead of the declared name
    pub using: Option<String>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a relation derived through another relation chain
    pub fn through(through: impl Into<ThroughRef>) -> Self {
        Self {
            through: Some(through.into()),
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn with_join_table(
        mut self,
        join_table: impl Into<String>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        self.join_table = Some(join_table.into());
        self.left_key = Some(left_key.into());
        self.right_key = Some(right_key.into());
        self
    }

    pub fn with_left_primary_key(mut self, key: impl Into<String>) -> Self {
        self.left_primary_key = Some(key.into());
        self
    }

    pub fn with_right_primary_key(mut self, key: impl Into<String>) -> Self {
        self.right_primary_key = Some(key.into());
        self
    }

    pub fn with_using(mut self, using: impl Into<String>) -> Self {
        self.using = Some(using.into());
        self
    }
}

/// A registered relation of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDeclaration {
    pub owner: String,
    pub name: String,
    pub kind: RelationKind,
    pub target: String,

    /// Foreign key column (direct kinds)
    pub key: Option<String>,
    /// Primary key the foreign key references (direct kinds)
    pub primary_key: Option<String>,

    pub join_table: Option<String>,
    pub left_key: Option<String>,
    pub right_key: Option<String>,

    /// Resolved join path (through kinds)
    pub path: Option<ThroughPath>,

    /// Chain a direct relation is defined in terms of
    pub through: Option<ThroughRef>,
    pub using: Option<String>,
    /// Logical chain a derived relation was resolved from
    pub originally_through: Option<ThroughRef>,
}

impl RelationDeclaration {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            kind,
            target: target.into(),
            key: None,
            primary_key: None,
            join_table: None,
            left_key: None,
            right_key: None,
            path: None,
            through: None,
            using: None,
            originally_through: None,
        }
    }

    pub fn with_keys(mut self, key: impl Into<String>, primary_key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.primary_key = Some(primary_key.into());
        self
    }

    pub fn with_join_table(
        mut self,
        join_table: impl Into<String>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        self.join_table = Some(join_table.into());
        self.left_key = Some(left_key.into());
        self.right_key = Some(right_key.into());
        self
    }

    pub fn with_path(mut self, path: ThroughPath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_through(mut self, through: impl Into<ThroughRef>) -> Self {
        self.through = Some(through.into());
        self
    }

    pub fn with_using(mut self, using: impl Into<String>) -> Self {
        self.using = Some(using.into());
        self
    }

    pub fn with_originally_through(mut self, through: impl Into<ThroughRef>) -> Self {
        self.originally_through = Some(through.into());
        self
    }

    /// Chain to expand when a path walk meets this derived relation
    pub fn expansion_chain(&self) -> Option<&ThroughRef> {
        self.originally_through.as_ref().or(self.through.as_ref())
    }

    /// Validate the declaration for consistency
    pub fn validate(&self) -> ThroughResult<()> {
        if self.owner.is_empty() || self.name.is_empty() {
            return Err(ThroughError::validation(
                "Relation owner and name cannot be empty",
            ));
        }

        if self.target.is_empty() {
            return Err(ThroughError::validation(format!(
                "Relation '{}.{}' must have a target model",
                self.owner, self.name
            )));
        }

        match self.kind {
            RelationKind::OneToMany | RelationKind::ManyToOne | RelationKind::OneToOne => {
                require_column(self, "key", self.key.as_deref())?;
                require_column(self, "primary key", self.primary_key.as_deref())?;
            }
            RelationKind::ManyToMany => {
                require_column(self, "join table", self.join_table.as_deref())?;
                require_column(self, "left key", self.left_key.as_deref())?;
                require_column(self, "right key", self.right_key.as_deref())?;
                if self.left_key == self.right_key {
                    return Err(ThroughError::validation(format!(
                        "Relation '{}.{}' join table keys must be different",
                        self.owner, self.name
                    )));
                }
            }
            RelationKind::OneThroughMany
            | RelationKind::ManyThroughMany
            | RelationKind::OneThroughOne => {
                let Some(path) = &self.path else {
                    return Err(ThroughError::validation(format!(
                        "Relation '{}.{}' of kind {} requires a resolved path",
                        self.owner, self.name, self.kind
                    )));
                };
                if self.kind == RelationKind::OneThroughOne && !path.hops.is_empty() {
                    return Err(ThroughError::validation(format!(
                        "Relation '{}.{}' of kind {} cannot declare intermediate hops",
                        self.owner, self.name, self.kind
                    )));
                }
                require_column(self, "left primary key", Some(&path.left_primary_key))?;
                require_column(self, "right primary key", Some(&path.right_primary_key))?;
                for hop in &path.hops {
                    require_column(self, "hop table", Some(&hop.table))?;
                    require_column(self, "hop left key", Some(&hop.left_key))?;
                    require_column(self, "hop right key", Some(&hop.right_key))?;
                }
            }
        }

        Ok(())
    }
}

fn require_column(
    declaration: &RelationDeclaration,
    what: &str,
    value: Option<&str>,
) -> ThroughResult<()> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(ThroughError::validation(format!(
            "Relation '{}.{}' of kind {} requires a {}",
            declaration.owner, declaration.name, declaration.kind, what
        ))),
    }
}
