//! SubNode Core
//!
//! This crate provides a path-addressed hierarchical node store: every piece
//! of content is one flat record whose `path` encodes its place in the tree.
//!
//! # Architecture
//!
//! - **Paths, not joins**: parent, children and subgraph are anchored pattern
//!   queries over `/`-delimited paths
//! - **Inherited access**: a node is readable or writable through an ACL on
//!   any ancestor, evaluated top-down on every check
//! - **Explicit sessions**: the acting identity and its dirty-node set are
//!   passed to every call and flushed parents-first
//! - **libsql/Turso**: embedded SQLite-compatible backend, with an in-memory
//!   store for tests and tooling
//!
//! # Modules
//!
//! - [`models`] - Node record, ACLs and path algebra
//! - [`behaviors`] - per-type validation and save hooks
//! - [`services`] - NodeService, AuthService, AclService and sessions
//! - [`db`] - NodeStore trait, query model and backends
//! - [`config`] - store configuration

pub mod behaviors;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use behaviors::*;
pub use config::StoreConfig;
pub use models::*;
pub use services::*;
