//! # elif-through
//!
//! Derived relationships for elif models. A relation declared with a
//! `through` option is resolved into the flattened join path between its
//! owner and the model the path lands on, and constructed as a
//! `one_through_many` or `many_through_many` relation.
//!
//! ```ignore
//! let associations = ThroughAssociations::default();
//! for model in ["User", "UserHasGroup", "Group"] {
//!     associations.define_model(model)?;
//! }
//!
//! let users = associations.model("User");
//! users.one_to_many("user_has_groups", AssociationOptions::new())?;
//! associations
//!     .model("UserHasGroup")
//!     .many_to_one("group", AssociationOptions::new())?;
//! users.one_to_many("groups", AssociationOptions::through("user_has_groups"))?;
//! ```
//!
//! Declarations that reference relations not declared yet go through a
//! [`Scheduler`], which queues them until [`Scheduler::solve`] is called.

pub mod config;
pub mod error;
pub mod inflector;
pub mod relationships;
pub mod through;

pub use config::*;
pub use error::*;
pub use inflector::*;
pub use relationships::*;
pub use through::*;
