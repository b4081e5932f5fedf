//! NodeStore Trait - Storage Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts persistence of
//! node records. Services only ever talk to `Arc<dyn NodeStore>`, so the
//! in-memory backend and the libsql backend are interchangeable.
//!
//! # Design Decisions
//!
//! 1. **Flat collection**: the store knows nothing about trees; hierarchy is
//!    expressed through [`NodeQuery`] path scopes
//! 2. **Upsert by id**: `save_node` inserts or replaces the record with the
//!    node's id; the caller assigns ids
//! 3. **Path uniqueness**: a save that would put two records on one path
//!    fails with [`DatabaseError::UniqueViolation`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use subnode_core::db::{MemoryStore, NodeQuery, NodeStore};
//! use subnode_core::models::Node;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
//!
//!     let mut node = Node::new("/r", "sn:repoRoot");
//!     let id = node.ensure_id().to_string();
//!     node.owner = Some(id);
//!     store.save_node(&node).await?;
//!
//!     let children = store.find_nodes(&NodeQuery::children_of("/r")).await?;
//!     assert!(children.is_empty());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use super::{DatabaseError, NodeQuery};
use crate::models::Node;

/// Abstraction layer for node persistence operations
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; services share one store across
/// every session.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert or replace the record with `node.id`.
    ///
    /// # Errors
    ///
    /// - `InvalidRecord` if the node has no id or no owner
    /// - `UniqueViolation` if another record already holds `node.path`
    async fn save_node(&self, node: &Node) -> Result<(), DatabaseError>;

    async fn get_node_by_id(&self, id: &str) -> Result<Option<Node>, DatabaseError>;

    async fn get_node_by_path(&self, path: &str) -> Result<Option<Node>, DatabaseError>;

    /// Point existence check on a path.
    async fn path_exists(&self, path: &str) -> Result<bool, DatabaseError> {
        Ok(self.get_node_by_path(path).await?.is_some())
    }

    /// All records matching `query`, sorted and limited as it asks.
    async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError>;

    /// First record matching `query` under its sort order.
    async fn find_one(&self, query: &NodeQuery) -> Result<Option<Node>, DatabaseError> {
        let query = query.clone().limit(1);
        Ok(self.find_nodes(&query).await?.into_iter().next())
    }

    async fn count_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError>;

    /// Remove one record. Returns the number of records removed (0 or 1).
    async fn delete_node(&self, id: &str) -> Result<u64, DatabaseError>;

    /// Remove every record matching `query` as one operation.
    async fn delete_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError>;
}
