//! Session: Identity and Unit of Work
//!
//! A `Session` is passed by reference into every service call. It carries:
//!
//! - the acting identity (admin, anonymous or a user account)
//! - the dirty set: nodes mutated in this session and not yet persisted,
//!   keyed by id (an id is assigned the first time a node is marked dirty)
//! - a session-local node cache by id and by path, filled on every load
//! - the `saving` flag that turns a re-entrant flush into a no-op
//! - the parent-existence switch used during bootstrap and bulk loads
//!
//! The dirty set sits behind a `tokio::sync::Mutex`; holding that lock is
//! what serializes flushes within a session.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::models::Node;

/// User name reserved for the repository administrator.
pub const ADMIN_USER_NAME: &str = "admin";
/// User name reported for sessions with no account.
pub const ANONYMOUS_USER_NAME: &str = "anonymous";

/// Who is acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    /// The repository administrator. `account_id` is the id of `/r`, absent
    /// only before bootstrap.
    Admin { account_id: Option<String> },
    Anonymous,
    User {
        user_name: String,
        account_id: String,
    },
}

#[derive(Debug)]
pub struct Session {
    identity: SessionIdentity,
    dirty: Mutex<BTreeMap<String, Node>>,
    saving: AtomicBool,
    nodes_by_id: RwLock<HashMap<String, Node>>,
    nodes_by_path: RwLock<HashMap<String, Node>>,
    parent_check: AtomicBool,
}

impl Session {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            dirty: Mutex::new(BTreeMap::new()),
            saving: AtomicBool::new(false),
            nodes_by_id: RwLock::new(HashMap::new()),
            nodes_by_path: RwLock::new(HashMap::new()),
            parent_check: AtomicBool::new(true),
        }
    }

    pub fn admin(account_id: Option<String>) -> Self {
        Self::new(SessionIdentity::Admin { account_id })
    }

    pub fn anonymous() -> Self {
        Self::new(SessionIdentity::Anonymous)
    }

    pub fn for_user(user_name: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self::new(SessionIdentity::User {
            user_name: user_name.into(),
            account_id: account_id.into(),
        })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.identity, SessionIdentity::Admin { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.identity, SessionIdentity::Anonymous)
    }

    /// Account node id of the acting identity, if it has one.
    pub fn account_id(&self) -> Option<&str> {
        match &self.identity {
            SessionIdentity::Admin { account_id } => account_id.as_deref(),
            SessionIdentity::Anonymous => None,
            SessionIdentity::User { account_id, .. } => Some(account_id),
        }
    }

    pub fn user_name(&self) -> &str {
        match &self.identity {
            SessionIdentity::Admin { .. } => ADMIN_USER_NAME,
            SessionIdentity::Anonymous => ANONYMOUS_USER_NAME,
            SessionIdentity::User { user_name, .. } => user_name,
        }
    }

    //
    // Dirty set
    //

    /// Record `node` as pending. Assigns an id to a node that has none so it
    /// can be keyed; a later mark of the same id replaces the earlier copy.
    pub async fn mark_dirty(&self, node: &mut Node) {
        let id = node.ensure_id().to_string();
        tracing::trace!("Marking node {} dirty at {}", id, node.path);
        self.dirty.lock().await.insert(id, node.clone());
    }

    pub async fn has_dirty_nodes(&self) -> bool {
        !self.dirty.lock().await.is_empty()
    }

    pub async fn dirty_count(&self) -> usize {
        self.dirty.lock().await.len()
    }

    /// Drop a pending node without persisting it.
    pub async fn discard_dirty(&self, id: &str) -> Option<Node> {
        self.dirty.lock().await.remove(id)
    }

    pub(crate) async fn lock_dirty(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.dirty.lock().await
    }

    /// Claim the `saving` flag. `None` means a flush is already running in
    /// this session and the caller must not start another.
    pub(crate) fn try_begin_save(&self) -> Option<SavingGuard<'_>> {
        self.saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SavingGuard { flag: &self.saving })
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    //
    // Session-local node cache
    //

    /// Attach a loaded or saved node to the session cache by id and path.
    pub async fn cache_node(&self, node: &Node) {
        if let Some(id) = &node.id {
            self.nodes_by_id
                .write()
                .await
                .insert(id.clone(), node.clone());
        }
        self.nodes_by_path
            .write()
            .await
            .insert(node.path.clone(), node.clone());
    }

    pub async fn cached_by_id(&self, id: &str) -> Option<Node> {
        self.nodes_by_id.read().await.get(id).cloned()
    }

    pub async fn cached_by_path(&self, path: &str) -> Option<Node> {
        self.nodes_by_path.read().await.get(path).cloned()
    }

    /// Forget `path` and every cached path beneath it.
    pub async fn evict_subgraph(&self, path: &str) {
        let prefix = format!("{}/", path);
        let in_scope = |p: &str| p == path || p.starts_with(&prefix);

        self.nodes_by_path
            .write()
            .await
            .retain(|p, _| !in_scope(p));
        self.nodes_by_id
            .write()
            .await
            .retain(|_, node| !in_scope(&node.path));
    }

    pub async fn clear_cached_nodes(&self) {
        self.nodes_by_id.write().await.clear();
        self.nodes_by_path.write().await.clear();
    }

    //
    // Parent existence switch
    //

    pub fn set_parent_check(&self, enabled: bool) {
        self.parent_check.store(enabled, Ordering::Release);
    }

    pub fn parent_check_enabled(&self) -> bool {
        self.parent_check.load(Ordering::Acquire)
    }
}

/// Resets the session's `saving` flag when dropped.
#[derive(Debug)]
pub(crate) struct SavingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_dirty_assigns_id_and_dedupes() {
        let session = Session::anonymous();
        let mut node = Node::new("/r/x", "u");
        session.mark_dirty(&mut node).await;
        assert!(node.id.is_some());

        node.content = "second".to_string();
        session.mark_dirty(&mut node).await;
        assert_eq!(session.dirty_count().await, 1);

        let pending = session.discard_dirty(node.id_str().unwrap()).await.unwrap();
        assert_eq!(pending.content, "second");
        assert!(!session.has_dirty_nodes().await);
    }

    #[test]
    fn test_saving_guard_blocks_reentry_until_dropped() {
        let session = Session::admin(None);
        let guard = session.try_begin_save();
        assert!(guard.is_some());
        assert!(session.is_saving());
        assert!(session.try_begin_save().is_none());

        drop(guard);
        assert!(!session.is_saving());
        assert!(session.try_begin_save().is_some());
    }

    #[tokio::test]
    async fn test_evict_subgraph() {
        let session = Session::for_user("alice", "acct-a");
        for path in ["/a", "/a/b", "/ab"] {
            let mut node = Node::new(path, "u");
            node.ensure_id();
            session.cache_node(&node).await;
        }

        session.evict_subgraph("/a").await;
        assert!(session.cached_by_path("/a").await.is_none());
        assert!(session.cached_by_path("/a/b").await.is_none());
        assert!(session.cached_by_path("/ab").await.is_some());
    }

    #[test]
    fn test_identity_accessors() {
        let session = Session::for_user("alice", "acct-a");
        assert_eq!(session.account_id(), Some("acct-a"));
        assert_eq!(session.user_name(), "alice");
        assert!(!session.is_admin());
        assert_eq!(Session::anonymous().user_name(), ANONYMOUS_USER_NAME);
        assert!(Session::admin(None).account_id().is_none());
    }
}
