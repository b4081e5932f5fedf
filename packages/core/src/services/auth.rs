//! Authorization Engine
//!
//! Decides whether a session may exercise a set of privileges on a node.
//! Checks short-circuit in this order:
//!
//! 1. admin sessions are always authorized
//! 2. the public landing node may always be read
//! 3. an empty request is a caller bug; an ownerless node is corruption
//! 4. the owner is authorized
//! 5. walk the path from the top down to the node itself (skipping `/r` and
//!    `/r/usr`): owning any ancestor authorizes, and any ancestor ACL that
//!    grants the request (user entry ∪ public entry) authorizes
//! 6. otherwise `Unauthorized`
//!
//! A non-granting ACL does not stop the walk; a deeper ancestor may still
//! grant.

use std::sync::Arc;

use super::{NodeCache, NodeServiceError, Session};
use crate::db::NodeStore;
use crate::models::{acl_grants, node_path, Node, PrivilegeSet};

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn NodeStore>,
    cache: Arc<NodeCache>,
    public_landing_name: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn NodeStore>, cache: Arc<NodeCache>, public_landing_name: impl Into<String>) -> Self {
        Self {
            store,
            cache,
            public_landing_name: public_landing_name.into(),
        }
    }

    /// Authorize `privileges` on `node` for `session`.
    pub async fn authorize(
        &self,
        session: &Session,
        node: &Node,
        privileges: &PrivilegeSet,
    ) -> Result<(), NodeServiceError> {
        if session.is_admin() {
            return Ok(());
        }

        if node.name.as_deref() == Some(self.public_landing_name.as_str())
            && *privileges == PrivilegeSet::read()
        {
            return Ok(());
        }

        if privileges.is_empty() {
            return Err(NodeServiceError::constraint_violation(
                "privileges to check are empty",
            ));
        }

        let owner = node.owner.as_deref().ok_or_else(|| {
            NodeServiceError::structural_corruption(format!("node {} has no owner", node.path))
        })?;

        let account_id = session.account_id();
        if account_id == Some(owner) {
            return Ok(());
        }

        if self.ancestor_auth(session, node, privileges).await? {
            return Ok(());
        }

        tracing::debug!(
            "Denied {} on {} for {}",
            privileges,
            node.path,
            session.user_name()
        );
        Err(NodeServiceError::unauthorized(format!(
            "{} lacks {} on {}",
            session.user_name(),
            privileges,
            node.path
        )))
    }

    /// Non-failing form of [`authorize`](Self::authorize) for callers that
    /// only need the answer. Corruption is still an error.
    pub async fn is_authorized(
        &self,
        session: &Session,
        node: &Node,
        privileges: &PrivilegeSet,
    ) -> Result<bool, NodeServiceError> {
        match self.authorize(session, node, privileges).await {
            Ok(()) => Ok(true),
            Err(NodeServiceError::Unauthorized(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// A new node needs WRITE on its parent. Root-level nodes have no parent
    /// node and may only be created by the admin.
    pub async fn authorize_create(&self, session: &Session, node: &Node) -> Result<(), NodeServiceError> {
        if session.is_admin() {
            return Ok(());
        }

        let parent_path = node.parent_path().ok_or_else(|| {
            NodeServiceError::unauthorized(format!(
                "only the admin may create root-level node {}",
                node.path
            ))
        })?;

        let parent = self.resolve_ancestor(session, parent_path).await?;
        self.authorize(session, &parent, &PrivilegeSet::write()).await
    }

    /// Admin or exact owner.
    pub fn require_owner(&self, session: &Session, node: &Node) -> Result<(), NodeServiceError> {
        if session.is_admin() {
            return Ok(());
        }

        match (session.account_id(), node.owner.as_deref()) {
            (Some(account), Some(owner)) if account == owner => Ok(()),
            (_, None) => Err(NodeServiceError::structural_corruption(format!(
                "node {} has no owner",
                node.path
            ))),
            _ => Err(NodeServiceError::unauthorized(format!(
                "{} does not own {}",
                session.user_name(),
                node.path
            ))),
        }
    }

    pub fn require_admin(&self, session: &Session) -> Result<(), NodeServiceError> {
        if session.is_admin() {
            Ok(())
        } else {
            Err(NodeServiceError::unauthorized(format!(
                "{} is not the admin",
                session.user_name()
            )))
        }
    }

    async fn ancestor_auth(
        &self,
        session: &Session,
        node: &Node,
        privileges: &PrivilegeSet,
    ) -> Result<bool, NodeServiceError> {
        let account_id = session.account_id();

        for path in node_path::ancestor_paths(&node.path) {
            if path == node_path::ROOT_PATH || path == node_path::USERS_ROOT_PATH {
                continue;
            }

            let ancestor = if path == node.path {
                node.clone()
            } else {
                self.resolve_ancestor(session, &path).await?
            };

            if let (Some(account), Some(owner)) = (account_id, ancestor.owner.as_deref()) {
                if account == owner {
                    return Ok(true);
                }
            }

            if acl_grants(ancestor.ac.as_ref(), account_id, privileges) {
                tracing::trace!("{} granted {} via ACL on {}", session.user_name(), privileges, path);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Session cache, then process cache, then store. A miss in all three is
    /// a hole in the tree.
    async fn resolve_ancestor(&self, session: &Session, path: &str) -> Result<Node, NodeServiceError> {
        if let Some(node) = session.cached_by_path(path).await {
            return Ok(node);
        }
        if let Some(node) = self.cache.get_by_path(path).await {
            session.cache_node(&node).await;
            return Ok(node);
        }

        let generation = self.cache.generation();
        match self.store.get_node_by_path(path).await? {
            Some(node) => {
                self.cache.put_if_current(&node, generation).await;
                session.cache_node(&node).await;
                Ok(node)
            }
            None => Err(NodeServiceError::structural_corruption(format!(
                "ancestor path not found: {}",
                path
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Acl, PUBLIC_PRINCIPAL};
    use tokio_test::{assert_err, assert_ok};

    fn owned(path: &str, owner: &str) -> Node {
        let mut node = Node::new(path, "u").with_owner(owner);
        node.ensure_id();
        node
    }

    async fn service_with(nodes: &[Node]) -> AuthService {
        let store = Arc::new(MemoryStore::new());
        for node in nodes {
            store.save_node(node).await.unwrap();
        }
        AuthService::new(store, Arc::new(NodeCache::new()), "home")
    }

    #[tokio::test]
    async fn test_public_acl_on_ancestor_grants_read() {
        let mut posts = owned("/r/usr/alice/posts", "alice");
        let mut acl = Acl::new();
        acl.insert(PUBLIC_PRINCIPAL.to_string(), PrivilegeSet::read());
        posts.ac = Some(acl);

        let auth = service_with(&[owned("/r/usr/alice", "alice"), posts]).await;
        let target = owned("/r/usr/alice/posts/x", "alice");

        let bob = Session::for_user("bob", "bob");
        assert_ok!(auth.authorize(&bob, &target, &PrivilegeSet::read()).await);
        assert_ok!(auth.authorize(&Session::anonymous(), &target, &PrivilegeSet::read()).await);

        let err = auth
            .authorize(&bob, &target, &PrivilegeSet::write())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_walk_continues_past_non_granting_acl() {
        let mut alice = owned("/r/usr/alice", "alice");
        let mut acl = Acl::new();
        acl.insert("carol".to_string(), PrivilegeSet::read());
        alice.ac = Some(acl);

        let mut shared = owned("/r/usr/alice/shared", "alice");
        let mut acl = Acl::new();
        acl.insert("bob".to_string(), PrivilegeSet::read_write());
        shared.ac = Some(acl);

        let auth = service_with(&[alice, shared]).await;
        let target = owned("/r/usr/alice/shared/doc", "alice");
        let bob = Session::for_user("bob", "bob");
        assert!(auth.authorize(&bob, &target, &PrivilegeSet::read_write()).await.is_ok());
    }

    #[tokio::test]
    async fn test_ancestor_owner_is_authorized() {
        let auth = service_with(&[owned("/r/usr/alice", "alice")]).await;
        // Node owned by someone else but living in alice's tree
        let target = owned("/r/usr/alice/guest-post", "bob");
        let alice = Session::for_user("alice", "alice");
        assert!(auth.authorize(&alice, &target, &PrivilegeSet::write()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_ancestor_is_structural_corruption() {
        let auth = service_with(&[]).await;
        let target = owned("/r/usr/ghost/doc", "ghost");
        let bob = Session::for_user("bob", "bob");
        let err = auth
            .authorize(&bob, &target, &PrivilegeSet::read())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeServiceError::StructuralCorruption(_)));
    }

    #[tokio::test]
    async fn test_short_circuits() {
        let auth = service_with(&[]).await;
        let bob = Session::for_user("bob", "bob");

        // Landing node, read only
        let home = owned("/r/usr/alice/home", "alice").with_name("home");
        assert!(auth.authorize(&bob, &home, &PrivilegeSet::read()).await.is_ok());

        // Admin needs no walk
        let deep = owned("/r/usr/nobody/x/y", "nobody");
        assert!(auth.authorize(&Session::admin(None), &deep, &PrivilegeSet::write()).await.is_ok());

        // Empty request
        let err = auth.authorize(&bob, &deep, &PrivilegeSet::new()).await.unwrap_err();
        assert!(matches!(err, NodeServiceError::ConstraintViolation(_)));

        // Ownerless node
        let mut orphan = owned("/r/usr/x", "x");
        orphan.owner = None;
        let err = auth.authorize(&bob, &orphan, &PrivilegeSet::read()).await.unwrap_err();
        assert!(matches!(err, NodeServiceError::StructuralCorruption(_)));
    }

    #[tokio::test]
    async fn test_require_owner_and_admin() {
        let auth = service_with(&[]).await;
        let node = owned("/r/usr/alice/x", "alice");
        assert_ok!(auth.require_owner(&Session::for_user("alice", "alice"), &node));
        assert_err!(auth.require_owner(&Session::for_user("bob", "bob"), &node));
        assert_ok!(auth.require_owner(&Session::admin(None), &node));
        assert_err!(auth.require_admin(&Session::anonymous()));
    }
}
