//! In-Memory NodeStore
//!
//! Keeps every record in a map keyed by id plus a path index that enforces
//! path uniqueness. Queries run the compiled path patterns directly against
//! each record.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{DatabaseError, NodeQuery, NodeStore};
use crate::models::Node;

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<String, Node>,
    id_by_path: HashMap<String, String>,
}

/// Store backed by process memory. Used by tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.read().await.by_id.is_empty()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn save_node(&self, node: &Node) -> Result<(), DatabaseError> {
        let id = node
            .id
            .clone()
            .ok_or_else(|| DatabaseError::invalid_record(format!("node at {} has no id", node.path)))?;
        if node.owner.is_none() {
            return Err(DatabaseError::invalid_record(format!(
                "node {} has no owner",
                id
            )));
        }

        let mut tables = self.tables.write().await;

        if let Some(holder) = tables.id_by_path.get(&node.path) {
            if *holder != id {
                return Err(DatabaseError::unique_violation(node.path.clone()));
            }
        }

        let previous_path = tables.by_id.get(&id).map(|old| old.path.clone());
        if let Some(previous_path) = previous_path {
            if previous_path != node.path {
                tables.id_by_path.remove(&previous_path);
            }
        }

        tables.id_by_path.insert(node.path.clone(), id.clone());
        tables.by_id.insert(id, node.clone());
        Ok(())
    }

    async fn get_node_by_id(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        Ok(self.tables.read().await.by_id.get(id).cloned())
    }

    async fn get_node_by_path(&self, path: &str) -> Result<Option<Node>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .id_by_path
            .get(path)
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn path_exists(&self, path: &str) -> Result<bool, DatabaseError> {
        Ok(self.tables.read().await.id_by_path.contains_key(path))
    }

    async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        let matcher = query.compile()?;
        let tables = self.tables.read().await;
        Ok(matcher.apply(tables.by_id.values().cloned()))
    }

    async fn count_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError> {
        let matcher = query.compile()?;
        let tables = self.tables.read().await;
        Ok(tables.by_id.values().filter(|n| matcher.matches(n)).count() as u64)
    }

    async fn delete_node(&self, id: &str) -> Result<u64, DatabaseError> {
        let mut tables = self.tables.write().await;
        match tables.by_id.remove(id) {
            Some(node) => {
                tables.id_by_path.remove(&node.path);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError> {
        let matcher = query.compile()?;
        let mut tables = self.tables.write().await;

        let doomed: Vec<(String, String)> = tables
            .by_id
            .iter()
            .filter(|(_, node)| matcher.matches(node))
            .map(|(id, node)| (id.clone(), node.path.clone()))
            .collect();

        for (id, path) in &doomed {
            tables.by_id.remove(id);
            tables.id_by_path.remove(path);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn owned(path: &str) -> Node {
        let mut node = Node::new(path, "u");
        node.ensure_id();
        node.owner = Some("acct".to_string());
        node
    }

    #[tokio::test]
    async fn test_path_uniqueness_is_enforced() -> Result<()> {
        let store = MemoryStore::new();
        store.save_node(&owned("/r/a")).await?;

        let err = store.save_node(&owned("/r/a")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation { .. }));
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_moving_a_record_releases_old_path() -> Result<()> {
        let store = MemoryStore::new();
        let mut node = owned("/r/a");
        store.save_node(&node).await?;

        node.path = "/r/b".to_string();
        store.save_node(&node).await?;

        assert!(!store.path_exists("/r/a").await?);
        assert!(store.path_exists("/r/b").await?);
        store.save_node(&owned("/r/a")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_rejects_records_without_id_or_owner() {
        let store = MemoryStore::new();
        assert!(store.save_node(&Node::new("/r/a", "u")).await.is_err());

        let mut no_owner = Node::new("/r/a", "u");
        no_owner.ensure_id();
        assert!(store.save_node(&no_owner).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_nodes_by_subgraph() -> Result<()> {
        let store = MemoryStore::new();
        for path in ["/p", "/p/a", "/p/a/b", "/px", "/px/a"] {
            store.save_node(&owned(path)).await?;
        }

        let removed = store.delete_nodes(&NodeQuery::subgraph_of("/p")).await?;
        assert_eq!(removed, 2);
        assert!(store.path_exists("/p").await?);
        assert!(store.path_exists("/px/a").await?);
        Ok(())
    }
}
