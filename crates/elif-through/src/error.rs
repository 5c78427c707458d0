//! Error types for through relationships
//!
//! Path resolution distinguishes errors caused by declaration *order* (a
//! relation that may still be declared later) from structural and
//! configuration errors. Only the former are eligible for deferred retry.

use crate::config::ConfigError;
use crate::relationships::RelationKind;

/// Result type alias for through relationship operations
pub type ThroughResult<T> = Result<T, ThroughError>;

/// Error types for through relationship resolution and construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThroughError {
    /// A named relation does not exist where the path expects it
    #[error("{message}")]
    MissingAssociation {
        /// Model the lookup was performed on
        model: String,
        /// Relation name that could not be found
        association: String,
        /// Lookups walked so far, as `Model.relation` segments
        path: Vec<String>,
        message: String,
    },

    /// Every candidate model of a nested through expansion failed
    #[error(
        "No association path from {model} through :{association} (tried {}): {cause}",
        .tried.join(", ")
    )]
    NoAssociationPath {
        model: String,
        association: String,
        tried: Vec<String>,
        /// Failure of the candidate that walked furthest
        #[source]
        cause: Box<ThroughError>,
    },

    #[error("{kind} does not support through associations")]
    UnsupportedKind { kind: RelationKind },

    #[error("Association path for {model}.{association} exceeds the maximum depth of {max_depth}")]
    PathTooDeep {
        model: String,
        association: String,
        max_depth: usize,
    },

    #[error("Model '{model}' is not registered")]
    UnknownModel { model: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Lock error on resource: {resource}")]
    Lock { resource: String },

    #[error("Cyclical associations are already being solved")]
    SolveInProgress,
}

impl ThroughError {
    /// Returns true if the error may disappear once more relations are declared
    pub fn is_deferrable(&self) -> bool {
        matches!(
            self,
            Self::MissingAssociation { .. } | Self::NoAssociationPath { .. }
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn unknown_model(model: impl Into<String>) -> Self {
        Self::UnknownModel {
            model: model.into(),
        }
    }

    pub(crate) fn lock(resource: &str) -> Self {
        Self::Lock {
            resource: resource.to_string(),
        }
    }
}

impl From<ConfigError> for ThroughError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}
