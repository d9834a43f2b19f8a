//! Feature backlog: the persisted, ordered set of work for a project.
//!
//! The backlog is a schema-validated JSON document. All mutations go through
//! [`BacklogStore`], which persists atomically (write-temp-then-rename) and
//! enforces the structural invariants: unique ids, resolvable dependencies,
//! and no dependency cycles.

mod model;
mod store;

pub use model::{Backlog, Feature, FeatureCategory, FeatureStatus, StatusCounts};
pub use store::{is_stuck, select_next, validate, BacklogError, BacklogStore};
