//! Process-Wide Node Cache
//!
//! Shared by every session. Holds the two lookups the authorization walk
//! and sharing helpers hit hardest:
//!
//! - ancestor nodes by path
//! - user names by account node id
//!
//! Saves, deletes and ACL changes invalidate the affected paths before they
//! return, so a reader never sees an ACL older than the last completed write.
//! A reader that loaded a node from the store stores it through
//! [`NodeCache::put_if_current`], which refuses the entry if any
//! invalidation ran since the read started.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::models::{node_path, Node};

/// Shared lookup cache. Construct once and share through `Arc`.
#[derive(Debug, Default)]
pub struct NodeCache {
    nodes_by_path: RwLock<HashMap<String, Node>>,
    user_names_by_account_id: RwLock<HashMap<String, String>>,
    /// Bumped under the path map's write lock by every invalidation.
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_by_path(&self, path: &str) -> Option<Node> {
        let found = self.nodes_by_path.read().await.get(path).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Token to take before reading a node from the store.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cache `node` only if nothing was invalidated since `generation` was
    /// taken. Returns whether the entry was stored.
    pub async fn put_if_current(&self, node: &Node, generation: u64) -> bool {
        let mut nodes = self.nodes_by_path.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::trace!("Skipped caching {}: invalidated during load", node.path);
            return false;
        }
        nodes.insert(node.path.clone(), node.clone());
        true
    }

    pub async fn invalidate_path(&self, path: &str) {
        let mut nodes = self.nodes_by_path.write().await;
        nodes.remove(path);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop `path` and everything beneath it.
    pub async fn invalidate_subgraph(&self, path: &str) {
        let path = node_path::strip_trailing_delimiter(path);
        let prefix = format!("{}/", path);
        let mut nodes = self.nodes_by_path.write().await;
        nodes.retain(|cached, _| cached != path && !cached.starts_with(&prefix));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn user_name(&self, account_id: &str) -> Option<String> {
        self.user_names_by_account_id
            .read()
            .await
            .get(account_id)
            .cloned()
    }

    pub async fn put_user_name(&self, account_id: &str, user_name: &str) {
        self.user_names_by_account_id
            .write()
            .await
            .insert(account_id.to_string(), user_name.to_string());
    }

    pub async fn forget_account(&self, account_id: &str) {
        self.user_names_by_account_id.write().await.remove(account_id);
    }

    pub async fn clear(&self) {
        let mut nodes = self.nodes_by_path.write().await;
        nodes.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(nodes);
        self.user_names_by_account_id.write().await.clear();
        tracing::debug!("Node cache cleared");
    }

    pub async fn stats(&self) -> NodeCacheStats {
        NodeCacheStats {
            cached_paths: self.nodes_by_path.read().await.len(),
            cached_user_names: self.user_names_by_account_id.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the node cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCacheStats {
    pub cached_paths: usize,
    pub cached_user_names: usize,
    /// Path lookups answered from the cache
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalidate_subgraph_spares_prefix_siblings() {
        let cache = NodeCache::new();
        for path in ["/r/usr/a/posts", "/r/usr/a/posts/1", "/r/usr/a/postscript"] {
            cache.put_if_current(&Node::new(path, "u"), cache.generation()).await;
        }

        cache.invalidate_subgraph("/r/usr/a/posts").await;

        assert!(cache.get_by_path("/r/usr/a/posts").await.is_none());
        assert!(cache.get_by_path("/r/usr/a/posts/1").await.is_none());
        assert!(cache.get_by_path("/r/usr/a/postscript").await.is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.cached_paths, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_load_racing_an_invalidation_is_not_cached() {
        let cache = NodeCache::new();
        let stale = Node::new("/r/usr/a/team", "u");

        let generation = cache.generation();
        // A save lands between the store read and the cache fill
        cache.invalidate_path("/r/usr/a/team").await;
        assert!(!cache.put_if_current(&stale, generation).await);
        assert!(cache.get_by_path("/r/usr/a/team").await.is_none());

        let generation = cache.generation();
        assert!(cache.put_if_current(&stale, generation).await);
        assert!(cache.get_by_path("/r/usr/a/team").await.is_some());
    }

    #[tokio::test]
    async fn test_user_name_cache() {
        let cache = NodeCache::new();
        cache.put_user_name("acct-1", "alice").await;
        assert_eq!(cache.user_name("acct-1").await.as_deref(), Some("alice"));
        cache.forget_account("acct-1").await;
        assert!(cache.user_name("acct-1").await.is_none());
    }
}
