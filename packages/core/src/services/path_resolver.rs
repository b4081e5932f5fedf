//! Placeholder Path Resolution
//!
//! A path ending in `?` asks for a fresh unique leaf under its parent. The
//! resolver draws short random ids and point-queries the store until one is
//! free.

use std::sync::Arc;
use uuid::Uuid;

use super::NodeServiceError;
use crate::db::NodeStore;
use crate::models::node_path;

#[derive(Clone)]
pub struct PathResolver {
    store: Arc<dyn NodeStore>,
    id_length: usize,
    max_attempts: usize,
}

impl PathResolver {
    pub fn new(store: Arc<dyn NodeStore>, id_length: usize, max_attempts: usize) -> Self {
        Self {
            store,
            id_length,
            max_attempts,
        }
    }

    /// Random leaf candidate: the first `id_length` hex digits of a v4 UUID.
    pub fn random_leaf(&self) -> String {
        let mut leaf = Uuid::new_v4().simple().to_string();
        leaf.truncate(self.id_length);
        leaf
    }

    /// Resolve a trailing `?` to an unused leaf. Paths without a placeholder
    /// are returned unchanged.
    ///
    /// # Errors
    ///
    /// `StructuralCorruption` once `max_attempts` candidates have all collided.
    pub async fn resolve_placeholder_path(&self, candidate: &str) -> Result<String, NodeServiceError> {
        if !node_path::has_placeholder_leaf(candidate) {
            return Ok(candidate.to_string());
        }

        for attempt in 1..=self.max_attempts {
            let path = node_path::replace_leaf(candidate, &self.random_leaf());
            if !self.store.path_exists(&path).await? {
                return Ok(path);
            }
            tracing::debug!("Placeholder candidate {} taken (attempt {})", path, attempt);
        }

        Err(NodeServiceError::structural_corruption(format!(
            "no free path for {} after {} attempts",
            candidate, self.max_attempts
        )))
    }
}
