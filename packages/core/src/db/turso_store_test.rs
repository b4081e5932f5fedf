//! Tests for the libsql-backed NodeStore
//!
//! Tests cover:
//! - Record round trip including ACL and properties JSON
//! - Path uniqueness through the path hash index
//! - Prefix-range narrowing plus anchored re-check for child/subgraph scopes
//! - Sorting, limits and bulk deletes

#[cfg(test)]
mod tests {
    use crate::db::{DatabaseError, DatabaseService, NodeQuery, NodeStore, OrdinalFilter, Sort, SortField, TursoStore};
    use crate::models::{Acl, Node, PrivilegeSet, PUBLIC_PRINCIPAL};
    use anyhow::Result;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Helper to create a store over a fresh database file
    async fn create_test_store() -> Result<(TursoStore, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");
        let db = Arc::new(DatabaseService::new(db_path).await?);
        Ok((TursoStore::new(db), temp_dir))
    }

    fn owned(path: &str, ordinal: i64) -> Node {
        let mut node = Node::new(path, "u");
        node.ensure_id();
        node.owner = Some("acct-1".to_string());
        node.ordinal = Some(ordinal);
        node.touch();
        node
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() -> Result<()> {
        let (store, _temp) = create_test_store().await?;

        let mut node = owned("/r/usr/a/posts", 3);
        node.content = "hello".to_string();
        node.name = Some("posts".to_string());
        node.create_time = node.modify_time;
        node.set_property("priority", json!(2));
        let mut acl = Acl::new();
        acl.insert(PUBLIC_PRINCIPAL.to_string(), PrivilegeSet::read());
        node.ac = Some(acl);
        store.save_node(&node).await?;

        let loaded = store.get_node_by_path("/r/usr/a/posts").await?.unwrap();
        assert_eq!(loaded, node);

        let by_id = store.get_node_by_id(node.id_str().unwrap()).await?.unwrap();
        assert_eq!(by_id.path, node.path);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_path_is_unique_violation() -> Result<()> {
        let (store, _temp) = create_test_store().await?;
        store.save_node(&owned("/r/a", 0)).await?;

        let err = store.save_node(&owned("/r/a", 1)).await.unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation { .. }));

        // Updating the same record in place is fine
        let mut existing = store.get_node_by_path("/r/a").await?.unwrap();
        existing.content = "changed".to_string();
        store.save_node(&existing).await?;
        assert!(store.path_exists("/r/a").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_children_and_subgraph_scopes() -> Result<()> {
        let (store, _temp) = create_test_store().await?;
        for (i, path) in ["/p", "/p/a", "/p/b", "/p/a/x", "/p-q", "/pz/a", "/p.b/c"]
            .iter()
            .enumerate()
        {
            store.save_node(&owned(path, i as i64)).await?;
        }

        let children = store.find_nodes(&NodeQuery::children_of("/p")).await?;
        let paths: Vec<&str> = children.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/p/a", "/p/b"]);

        let subgraph = store.find_nodes(&NodeQuery::subgraph_of("/p")).await?;
        assert_eq!(subgraph.len(), 3);
        assert!(subgraph.iter().all(|n| n.path.starts_with("/p/")));

        let roots = store.find_nodes(&NodeQuery::children_of("")).await?;
        let paths: Vec<&str> = roots.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["/p", "/p-q"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_sorted_limited_queries() -> Result<()> {
        let (store, _temp) = create_test_store().await?;
        store.save_node(&owned("/p", 0)).await?;
        for i in 0..4 {
            store.save_node(&owned(&format!("/p/c{}", i), i)).await?;
        }

        let below = store
            .find_one(
                &NodeQuery::children_of("/p")
                    .with_ordinal(OrdinalFilter::Gt(1))
                    .sorted_by(Sort::asc(SortField::Ordinal)),
            )
            .await?
            .unwrap();
        assert_eq!(below.path, "/p/c2");

        let max = store
            .find_one(&NodeQuery::children_of("/p").sorted_by(Sort::desc(SortField::Ordinal)))
            .await?
            .unwrap();
        assert_eq!(max.ordinal, Some(3));

        assert_eq!(store.count_nodes(&NodeQuery::children_of("/p")).await?, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_subgraph_leaves_prefix_siblings() -> Result<()> {
        let (store, _temp) = create_test_store().await?;
        for path in ["/r/usr/alice/posts", "/r/usr/alice/posts/1", "/r/usr/alice/posts/1/2", "/r/usr/alice/postscript"] {
            store.save_node(&owned(path, 0)).await?;
        }

        let removed = store
            .delete_nodes(&NodeQuery::subgraph_of("/r/usr/alice/posts"))
            .await?;
        assert_eq!(removed, 2);
        assert!(store.path_exists("/r/usr/alice/posts").await?);
        assert!(store.path_exists("/r/usr/alice/postscript").await?);

        let parent = store.get_node_by_path("/r/usr/alice/posts").await?.unwrap();
        assert_eq!(store.delete_node(parent.id_str().unwrap()).await?, 1);
        assert!(!store.path_exists("/r/usr/alice/posts").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_acl_principal_filter() -> Result<()> {
        let (store, _temp) = create_test_store().await?;
        let mut shared = owned("/p/shared", 0);
        let mut acl = Acl::new();
        acl.insert("acct-bob".to_string(), PrivilegeSet::read_write());
        shared.ac = Some(acl);
        store.save_node(&shared).await?;
        store.save_node(&owned("/p/private", 1)).await?;

        let found = store
            .find_nodes(&NodeQuery::subgraph_of("/p").shared_with_any(["acct-bob"]))
            .await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/p/shared");

        let with_acl = store
            .count_nodes(&NodeQuery::subgraph_of("/p").requiring_acl())
            .await?;
        assert_eq!(with_acl, 1);
        Ok(())
    }
}
