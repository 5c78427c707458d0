//! Mapping of direct relation kinds onto their derived counterparts, and of
//! resolved association paths onto hop lists.

use crate::error::{ThroughError, ThroughResult};
use crate::relationships::{Hop, ModelMeta, RelationKind, ThroughPath};

use super::path::AssociationPath;

/// Direct kinds accepted with a `through` option and the kinds they become
pub const THROUGH_KINDS: [(RelationKind, RelationKind); 4] = [
    (RelationKind::OneToOne, RelationKind::OneThroughMany),
    (RelationKind::OneToMany, RelationKind::ManyThroughMany),
    (RelationKind::ManyToOne, RelationKind::OneThroughMany),
    (RelationKind::ManyToMany, RelationKind::ManyThroughMany),
];

/// Derived kind constructed for a relation requested as `kind` with a `through` option
pub fn through_kind_for(kind: RelationKind) -> ThroughResult<RelationKind> {
    THROUGH_KINDS
        .iter()
        .find(|(direct, _)| *direct == kind)
        .map(|(_, derived)| *derived)
        .ok_or(ThroughError::UnsupportedKind { kind })
}

/// Hop list of a resolved path, together with the model it lands on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub target: String,
    pub path: ThroughPath,
}

/// Convert a resolved association path into the hop list of a derived relation
///
/// The trailing table is dropped when it is the destination's own table, since
/// the derived relation joins the destination itself.
pub fn build_through_path(
    mut path: AssociationPath,
    destination: &ModelMeta,
) -> ThroughResult<ResolvedPath> {
    let target = path.models.pop().ok_or_else(|| {
        ThroughError::validation("Association path does not reach any model")
    })?;

    let owns_table = |table: &String| {
        *table == destination.table_name || destination.inheritance_tables.contains(table)
    };
    if path.tables.last().is_some_and(owns_table) {
        path.tables.pop();
    }

    if path.keys.len() != path.tables.len() * 2 + 2 {
        return Err(ThroughError::validation(format!(
            "Association path to {} has {} keys for {} join tables",
            target,
            path.keys.len(),
            path.tables.len()
        )));
    }

    let mut keys = path.keys.into_iter();
    let mut next_key = || keys.next().unwrap_or_default();

    let left_primary_key = next_key();
    let hops = path
        .tables
        .into_iter()
        .map(|table| {
            let left_key = next_key();
            let right_key = next_key();
            Hop::new(table, left_key, right_key)
        })
        .collect();
    let right_primary_key = next_key();

    Ok(ResolvedPath {
        target,
        path: ThroughPath {
            left_primary_key,
            hops,
            right_primary_key,
        },
    })
}
