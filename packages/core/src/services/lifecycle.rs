//! Lifecycle Hooks
//!
//! Normalization that runs on every record just before it reaches the store,
//! and the bookkeeping that runs around deletes. These are the only places
//! defaults are filled in.

use chrono::Utc;
use std::sync::Arc;

use super::{AuthService, NodeCache, NodeServiceError, PathResolver, Session, SessionIdentity};
use crate::behaviors::NodeBehaviorRegistry;
use crate::db::{NodeQuery, NodeStore};
use crate::models::{node_path, Node, ValidationError};

#[derive(Clone)]
pub struct LifecycleHooks {
    store: Arc<dyn NodeStore>,
    cache: Arc<NodeCache>,
    auth: AuthService,
    behaviors: Arc<NodeBehaviorRegistry>,
    resolver: PathResolver,
    max_content_length: usize,
}

impl LifecycleHooks {
    pub fn new(
        store: Arc<dyn NodeStore>,
        cache: Arc<NodeCache>,
        auth: AuthService,
        behaviors: Arc<NodeBehaviorRegistry>,
        resolver: PathResolver,
        max_content_length: usize,
    ) -> Self {
        Self {
            store,
            cache,
            auth,
            behaviors,
            resolver,
            max_content_length,
        }
    }

    /// Pre-save hook.
    ///
    /// Assigns the id, resolves a placeholder leaf, defaults ordinal and
    /// owner, checks the parent exists, stamps timestamps, sanitizes the
    /// name, runs the type behavior, enforces the content limit and
    /// normalizes the ACL.
    pub async fn before_save(&self, session: &Session, node: &mut Node) -> Result<(), NodeServiceError> {
        node.ensure_id();

        if node_path::has_placeholder_leaf(&node.path) {
            node.path = self.resolver.resolve_placeholder_path(&node.path).await?;
        }

        if node.ordinal.is_none() {
            node.ordinal = Some(0);
        }

        if node.owner.is_none() {
            let owner = self.default_owner(session, node).await?;
            node.owner = Some(owner);
        }

        if session.parent_check_enabled() {
            if let Some(parent) = node.parent_path() {
                if !self.store.path_exists(parent).await? {
                    return Err(NodeServiceError::structural_corruption(format!(
                        "attempted to add {} before its parent exists",
                        node.path
                    )));
                }
            }
        }

        let now = Utc::now();
        node.create_time.get_or_insert(now);
        node.modify_time.get_or_insert(now);

        node.sanitize_name();
        self.check_name_unique(node).await?;
        self.behaviors.validate_node(node)?;
        self.behaviors.before_save(node);

        if node.content.len() > self.max_content_length {
            return Err(ValidationError::ContentTooLarge {
                len: node.content.len(),
                max: self.max_content_length,
            }
            .into());
        }

        node.normalize_acl();
        Ok(())
    }

    /// Post-save bookkeeping: attach to the session and drop stale process
    /// cache entries for the old and new location.
    pub async fn after_save(&self, session: &Session, node: &Node, previous_path: Option<&str>) {
        if let Some(previous) = previous_path.filter(|p| *p != node.path) {
            session.evict_subgraph(previous).await;
            self.cache.invalidate_subgraph(previous).await;
        }
        self.cache.invalidate_path(&node.path).await;
        if node.is_account_node() {
            if let Some(id) = node.id_str() {
                self.cache.forget_account(id).await;
            }
        }
        session.cache_node(node).await;
    }

    /// Pre-delete hook: owner only, then every cached entry for the node and
    /// its subgraph is dropped.
    pub async fn before_delete(&self, session: &Session, node: &Node) -> Result<(), NodeServiceError> {
        self.auth.require_owner(session, node)?;

        session.evict_subgraph(&node.path).await;
        self.cache.invalidate_subgraph(&node.path).await;
        if let Some(id) = node.id_str() {
            self.cache.forget_account(id).await;
        }
        Ok(())
    }

    /// Names are unique among the nodes of one owner.
    async fn check_name_unique(&self, node: &Node) -> Result<(), NodeServiceError> {
        let (Some(name), Some(owner)) = (node.name.as_deref(), node.owner.as_deref()) else {
            return Ok(());
        };
        let query = NodeQuery::all().with_name(name).with_owner(owner).limit(2);
        let taken = self
            .store
            .find_nodes(&query)
            .await?
            .into_iter()
            .any(|other| other.id != node.id);
        if taken {
            return Err(NodeServiceError::constraint_violation(format!(
                "node name is already in use: {}",
                name
            )));
        }
        Ok(())
    }

    /// `/r` owns itself; everything else defaults to the admin account.
    async fn default_owner(&self, session: &Session, node: &Node) -> Result<String, NodeServiceError> {
        if node.path == node_path::ROOT_PATH {
            if let Some(id) = node.id_str() {
                return Ok(id.to_string());
            }
        }

        if let SessionIdentity::Admin {
            account_id: Some(account_id),
        } = session.identity()
        {
            return Ok(account_id.clone());
        }

        match self.store.get_node_by_path(node_path::ROOT_PATH).await? {
            Some(root) => root.owner.ok_or_else(|| {
                NodeServiceError::structural_corruption("repository root has no owner")
            }),
            None => Err(NodeServiceError::structural_corruption(format!(
                "no admin account to own {}",
                node.path
            ))),
        }
    }
}
