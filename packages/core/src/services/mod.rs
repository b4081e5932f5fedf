//! Business Services
//!
//! This module contains the services every caller goes through:
//!
//! - `NodeService` - creation, lookup, search, deferred saves and deletes
//! - `AuthService` - privilege checks with inherited ancestor ACLs
//! - `AclService` - owner-only ACL mutation and mention sharing
//! - `LifecycleHooks` - normalization around saves and deletes
//! - `Session` - acting identity, dirty set and session node cache
//!
//! Services coordinate between the storage layer and callers, enforcing
//! access control and tree invariants the stores know nothing about.

mod accounts;
pub mod acl_service;
mod auth;
pub mod error;
mod lifecycle;
mod node_cache;
pub mod node_service;
mod path_resolver;
pub mod session;

pub use accounts::{validate_user_name, NodeReport, RESERVED_USER_NAMES};
pub use acl_service::{parse_mentions, AclService};
pub use auth::AuthService;
pub use error::NodeServiceError;
pub use lifecycle::LifecycleHooks;
pub use node_cache::{NodeCache, NodeCacheStats};
pub use node_service::{CreateNodeLocation, CreateNodeParams, NodeService, SubgraphSearch};
pub use path_resolver::PathResolver;
pub use session::{Session, SessionIdentity, ADMIN_USER_NAME, ANONYMOUS_USER_NAME};
