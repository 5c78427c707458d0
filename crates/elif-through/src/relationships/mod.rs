//! Relationships Module - Relation metadata and the runtime registry

pub mod metadata;
pub mod registry;

pub use metadata::*;
pub use registry::*;
