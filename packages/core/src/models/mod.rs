//! Data Models
//!
//! This module contains the core data structures used throughout SubNode:
//!
//! - `Node` - the single record type every piece of content is stored as
//! - `Acl`, `Privilege`, `PrivilegeSet` - sharing and access control
//! - `node_path` - string algebra over `/`-delimited node paths

pub mod acl;
mod node;
pub mod node_path;

pub use acl::{acl_grants, Acl, Privilege, PrivilegeSet, PUBLIC_PRINCIPAL};
pub use node::{sanitize_name, Node, ValidationError, DEFAULT_NODE_TYPE};
