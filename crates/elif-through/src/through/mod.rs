//! Through relationships
//!
//! Resolution of relations declared in terms of other relations, including
//! deferred resolution of declarations that reference each other.

pub mod associate;
pub mod cardinality;
pub mod path;
pub mod scheduler;

pub use associate::*;
pub use cardinality::*;
pub use path::*;
pub use scheduler::*;
