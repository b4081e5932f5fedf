//! Database Layer
//!
//! This module handles persistence of node records:
//!
//! - `NodeStore` trait, the seam every service talks to
//! - `MemoryStore`, a process-local backend
//! - `TursoStore` over `DatabaseService`, the libsql backend
//! - `NodeQuery`, the path-pattern query model shared by both backends
//!
//! # Architecture
//!
//! All nodes live in a single flat collection. Tree structure exists only in
//! the `path` strings, so child and subgraph lookups are anchored pattern
//! queries over paths rather than joins.

mod database;
mod error;
mod memory_store;
mod node_store;
pub mod query;
mod turso_store;

pub use database::{path_hash, DatabaseService, DbNodeRecord};
pub use error::DatabaseError;
pub use memory_store::MemoryStore;
pub use node_store::NodeStore;
pub use query::{
    regex_direct_children_of_path, regex_recursive_children_of_path, NodeQuery, OrdinalFilter,
    PathScope, QueryMatcher, Sort, SortDirection, SortField,
};
pub use turso_store::TursoStore;
