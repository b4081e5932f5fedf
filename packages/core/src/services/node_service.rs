//! Node Service - Tree Operations over the Flat Store
//!
//! This module provides the service every caller goes through:
//!
//! - Creation with sibling placement (`First`, `Last`, explicit ordinal)
//! - Lookup by path, id, name and `~type` shorthand
//! - Children, siblings, subgraph and ACL searches
//! - Immediate saves and deferred (dirty-set) saves with session flush
//! - Cascading deletes
//!
//! Every operation takes the acting [`Session`] explicitly. Reads that could
//! observe pending writes flush the session first.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{
    AuthService, LifecycleHooks, NodeCache, NodeServiceError, PathResolver, Session,
    SessionIdentity,
};
use crate::behaviors::NodeBehaviorRegistry;
use crate::config::StoreConfig;
use crate::db::{NodeQuery, NodeStore, OrdinalFilter, Sort, SortField};
use crate::models::{node_path, Node, PrivilegeSet, DEFAULT_NODE_TYPE, PUBLIC_PRINCIPAL};

/// Where a new node goes among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateNodeLocation {
    /// Ordinal 0; existing children shift down by one.
    First,
    /// One past the current highest child ordinal.
    #[default]
    Last,
    /// Exactly this ordinal; children at or after it shift down by one.
    Ordinal(i64),
}

/// Parameters for node creation (avoids too-many-arguments lint)
///
/// # Examples
///
/// ```rust
/// use subnode_core::services::{CreateNodeLocation, CreateNodeParams};
///
/// let params = CreateNodeParams {
///     rel_path: Some("posts".to_string()),
///     location: CreateNodeLocation::First,
///     ..Default::default()
/// };
/// assert!(params.node_type.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CreateNodeParams {
    /// Path relative to the parent; `None` means a generated leaf (`?`)
    pub rel_path: Option<String>,
    /// Node type; `None` means plain content
    pub node_type: Option<String>,
    pub location: CreateNodeLocation,
    pub content: String,
    pub properties: Map<String, Value>,
}

/// Content search within a subgraph.
#[derive(Debug, Clone, Default)]
pub struct SubgraphSearch {
    /// Text to look for; `None` matches every node
    pub text: Option<String>,
    /// Treat `text` as a regular expression instead of a literal
    pub regex: bool,
    pub case_sensitive: bool,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

/// Core service for node tree operations
#[derive(Clone)]
pub struct NodeService {
    pub(crate) store: Arc<dyn NodeStore>,
    pub(crate) cache: Arc<NodeCache>,
    pub(crate) auth: AuthService,
    hooks: LifecycleHooks,
    behaviors: Arc<NodeBehaviorRegistry>,
    config: StoreConfig,
    /// Held across the existence check and save of a new account.
    pub(crate) account_lock: Arc<Mutex<()>>,
}

impl NodeService {
    /// Create a service with its own process-wide cache.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use subnode_core::config::StoreConfig;
    /// # use subnode_core::db::MemoryStore;
    /// # use subnode_core::services::NodeService;
    /// # use std::sync::Arc;
    /// let service = NodeService::new(Arc::new(MemoryStore::new()), StoreConfig::default())?;
    /// # Ok::<(), subnode_core::services::NodeServiceError>(())
    /// ```
    pub fn new(store: Arc<dyn NodeStore>, config: StoreConfig) -> Result<Self, NodeServiceError> {
        Self::with_cache(store, Arc::new(NodeCache::new()), config)
    }

    /// Create a service sharing an existing cache.
    pub fn with_cache(
        store: Arc<dyn NodeStore>,
        cache: Arc<NodeCache>,
        config: StoreConfig,
    ) -> Result<Self, NodeServiceError> {
        Self::with_behaviors(store, cache, Arc::new(NodeBehaviorRegistry::new()), config)
    }

    /// Create a service with a custom behavior registry.
    pub fn with_behaviors(
        store: Arc<dyn NodeStore>,
        cache: Arc<NodeCache>,
        behaviors: Arc<NodeBehaviorRegistry>,
        config: StoreConfig,
    ) -> Result<Self, NodeServiceError> {
        config.validate().map_err(|e| {
            NodeServiceError::constraint_violation(format!("invalid store configuration: {}", e))
        })?;

        let auth = AuthService::new(store.clone(), cache.clone(), config.public_landing_name.clone());
        let resolver = PathResolver::new(
            store.clone(),
            config.placeholder_id_length,
            config.max_path_attempts,
        );
        let hooks = LifecycleHooks::new(
            store.clone(),
            cache.clone(),
            auth.clone(),
            behaviors.clone(),
            resolver,
            config.max_content_length,
        );

        Ok(Self {
            store,
            cache,
            auth,
            hooks,
            behaviors,
            config,
            account_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<NodeCache> {
        &self.cache
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn behaviors(&self) -> &Arc<NodeBehaviorRegistry> {
        &self.behaviors
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    //
    // SAVING
    //

    /// Persist every dirty node in the session.
    ///
    /// WRITE is re-checked on every dirty node before any of them is written,
    /// then nodes are persisted parents-first. A flush started while another
    /// is running in the same session returns `Ok(0)` immediately. If a save
    /// fails part way, nodes already written stay written and the rest stay
    /// dirty.
    pub async fn flush(&self, session: &Session) -> Result<usize, NodeServiceError> {
        let Some(_saving) = session.try_begin_save() else {
            tracing::trace!("Flush already in progress for {}", session.user_name());
            return Ok(0);
        };

        let mut dirty = session.lock_dirty().await;
        if dirty.is_empty() {
            return Ok(0);
        }

        let mut batch: Vec<Node> = dirty.values().cloned().collect();
        batch.sort_by(|a, b| {
            node_path::depth(&a.path)
                .cmp(&node_path::depth(&b.path))
                .then_with(|| a.path.cmp(&b.path))
        });

        let mut previous_paths = Vec::with_capacity(batch.len());
        for node in &batch {
            previous_paths.push(self.authorize_save(session, node, &batch).await?);
        }

        let mut saved = 0;
        for (mut node, previous_path) in batch.into_iter().zip(previous_paths) {
            let id = node.ensure_id().to_string();
            self.persist(session, &mut node, previous_path.as_deref()).await?;
            dirty.remove(&id);
            saved += 1;
        }

        tracing::debug!("Flushed {} node(s) for {}", saved, session.user_name());
        Ok(saved)
    }

    /// Authorize and persist `node` now. On return the node carries its
    /// resolved path, id, owner and timestamps.
    pub async fn save(&self, session: &Session, node: &mut Node) -> Result<(), NodeServiceError> {
        let previous_path = self.authorize_save(session, node, &[]).await?;
        self.persist(session, node, previous_path.as_deref()).await?;
        if let Some(id) = node.id_str() {
            session.discard_dirty(id).await;
        }
        Ok(())
    }

    /// Record a mutation for the next flush. Stamps the modification time.
    pub async fn update(&self, session: &Session, node: &mut Node) {
        node.touch();
        session.mark_dirty(node).await;
    }

    /// WRITE on the stored record for existing nodes, WRITE on the parent for
    /// new (or moved) ones. Returns the stored path of an existing node.
    ///
    /// `batch` holds the other nodes of a flush so a new child can be
    /// authorized against a parent that is being created alongside it.
    async fn authorize_save(
        &self,
        session: &Session,
        node: &Node,
        batch: &[Node],
    ) -> Result<Option<String>, NodeServiceError> {
        let stored = match node.id_str() {
            Some(id) => self.store.get_node_by_id(id).await?,
            None => None,
        };

        let write = PrivilegeSet::write();
        match stored {
            Some(stored) => {
                self.auth.authorize(session, &stored, &write).await?;
                if stored.owner != node.owner || Self::acl_changed(&stored, node) {
                    self.auth.require_owner(session, &stored)?;
                }
                if stored.path != node.path {
                    self.authorize_new_location(session, node, batch).await?;
                }
                Ok(Some(stored.path))
            }
            None => {
                self.authorize_new_location(session, node, batch).await?;
                Ok(None)
            }
        }
    }

    /// Compares ACLs after self-share stripping, so a writer echoing back
    /// the stored ACL is not treated as a change.
    fn acl_changed(stored: &Node, node: &Node) -> bool {
        let mut incoming = node.clone();
        incoming.owner = stored.owner.clone();
        incoming.normalize_acl();
        stored.ac != incoming.ac
    }

    async fn authorize_new_location(
        &self,
        session: &Session,
        node: &Node,
        batch: &[Node],
    ) -> Result<(), NodeServiceError> {
        let pending_parent = node
            .parent_path()
            .and_then(|parent| batch.iter().find(|n| n.path == parent));

        match pending_parent {
            Some(parent) => {
                self.auth
                    .authorize(session, parent, &PrivilegeSet::write())
                    .await
            }
            None => self.auth.authorize_create(session, node).await,
        }
    }

    async fn persist(
        &self,
        session: &Session,
        node: &mut Node,
        previous_path: Option<&str>,
    ) -> Result<(), NodeServiceError> {
        self.hooks.before_save(session, node).await?;
        self.store.save_node(node).await?;
        self.hooks.after_save(session, node, previous_path).await;
        tracing::trace!("Saved node {:?} at {}", node.id, node.path);
        Ok(())
    }

    //
    // CREATION AND ORDINALS
    //

    /// Build a new node under `parent` (or at root level) without saving it.
    ///
    /// Sibling ordinals are adjusted immediately for `First` and `Ordinal`
    /// placement; the returned node itself is uncommitted. Root-level nodes
    /// always get ordinal 0.
    pub async fn create_node(
        &self,
        session: &Session,
        parent: Option<&mut Node>,
        params: CreateNodeParams,
    ) -> Result<Node, NodeServiceError> {
        let rel_path = params.rel_path.as_deref().unwrap_or(node_path::PLACEHOLDER);
        let parent_path = parent.as_ref().map(|p| p.path.clone()).unwrap_or_default();
        let path = node_path::join(&parent_path, rel_path);
        node_path::validate(&path)?;

        let ordinal = match parent {
            None => 0,
            Some(parent) => match params.location {
                CreateNodeLocation::First => {
                    self.insert_ordinal(session, parent, 0, 1).await?;
                    0
                }
                CreateNodeLocation::Last => {
                    let ordinal = self.get_max_child_ordinal(session, parent).await? + 1;
                    parent.max_child_ordinal = Some(ordinal);
                    ordinal
                }
                CreateNodeLocation::Ordinal(ordinal) => {
                    self.insert_ordinal(session, parent, ordinal, 1).await?;
                    ordinal
                }
            },
        };

        let mut node = Node::new(
            path,
            params
                .node_type
                .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
        );
        node.ordinal = Some(ordinal);
        node.owner = self.session_owner(session)?;
        node.content = params.content;
        node.properties = params.properties;

        tracing::debug!("Created node at {} (ordinal {})", node.path, ordinal);
        Ok(node)
    }

    /// Account that owns nodes created by this session. Admin sessions
    /// created before bootstrap leave the owner for the save hook to fill.
    fn session_owner(&self, session: &Session) -> Result<Option<String>, NodeServiceError> {
        match session.identity() {
            SessionIdentity::Admin { account_id } => Ok(account_id.clone()),
            SessionIdentity::User { account_id, .. } => Ok(Some(account_id.clone())),
            SessionIdentity::Anonymous => Err(NodeServiceError::unauthorized(
                "anonymous sessions cannot create nodes",
            )),
        }
    }

    /// Shift every child of `parent` with ordinal `>= at` down by `range`,
    /// persist the shifted children, and record the new highest child
    /// ordinal on `parent`. Returns that ordinal.
    pub async fn insert_ordinal(
        &self,
        session: &Session,
        parent: &mut Node,
        at: i64,
        range: i64,
    ) -> Result<i64, NodeServiceError> {
        self.flush(session).await?;

        let children = self
            .store
            .find_nodes(&NodeQuery::children_of(&parent.path))
            .await?;

        let mut max_ordinal = 0;
        for mut child in children {
            let ordinal = child.ordinal.unwrap_or(0);
            let shifted = if ordinal >= at { ordinal + range } else { ordinal };
            if shifted != ordinal {
                child.ordinal = Some(shifted);
                session.mark_dirty(&mut child).await;
            }
            max_ordinal = max_ordinal.max(shifted);
        }

        self.flush(session).await?;
        parent.max_child_ordinal = Some(max_ordinal);
        Ok(max_ordinal)
    }

    /// Highest child ordinal of `node`, 0 when it has no children.
    pub async fn get_max_child_ordinal(&self, session: &Session, node: &Node) -> Result<i64, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let highest = self
            .store
            .find_one(&NodeQuery::children_of(&node.path).sorted_by(Sort::desc(SortField::Ordinal)))
            .await?;
        Ok(highest.and_then(|n| n.ordinal).unwrap_or(0))
    }

    //
    // LOOKUP
    //

    /// Resolve an identifier by its sigil:
    ///
    /// - `/a/b` path (a trailing `/` is ignored)
    /// - `:name` or `:user:name` name lookup
    /// - `~type` well-known node under the session's account (`~inbox` means
    ///   type `sn:inbox`), created if missing
    /// - anything else is an id
    pub async fn get_node(
        &self,
        session: &Session,
        identifier: &str,
        require_auth: bool,
    ) -> Result<Option<Node>, NodeServiceError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || identifier == "/" {
            return Err(NodeServiceError::constraint_violation(format!(
                "'{}' does not address a node; the root is implicit",
                identifier
            )));
        }

        if let Some(type_name) = identifier.strip_prefix('~') {
            let node_type = format!("sn:{}", type_name);
            return self.get_user_node_by_type(session, &node_type).await;
        }
        if let Some(name) = identifier.strip_prefix(':') {
            return self.get_node_by_name(session, name, require_auth).await;
        }
        if !identifier.starts_with(node_path::PATH_DELIMITER) {
            return self.get_node_by_id(session, identifier, require_auth).await;
        }
        self.get_node_by_path(session, node_path::strip_trailing_delimiter(identifier), require_auth)
            .await
    }

    pub async fn get_node_by_id(
        &self,
        session: &Session,
        id: &str,
        require_auth: bool,
    ) -> Result<Option<Node>, NodeServiceError> {
        self.flush(session).await?;
        let found = self.store.get_node_by_id(id).await?;
        self.attach(session, found, require_auth).await
    }

    pub async fn get_node_by_path(
        &self,
        session: &Session,
        path: &str,
        require_auth: bool,
    ) -> Result<Option<Node>, NodeServiceError> {
        self.flush(session).await?;
        let found = self.store.get_node_by_path(path).await?;
        self.attach(session, found, require_auth).await
    }

    /// `name` finds an admin-owned node; `user:name` one owned by that user.
    pub async fn get_node_by_name(
        &self,
        session: &Session,
        name: &str,
        require_auth: bool,
    ) -> Result<Option<Node>, NodeServiceError> {
        let (owner, name) = match name.split_once(':') {
            Some((user_name, name)) => match self.get_user_node_by_user_name(user_name).await? {
                Some(account) => (account.owner, name),
                None => return Ok(None),
            },
            None => {
                let root = self.store.get_node_by_path(node_path::ROOT_PATH).await?;
                (root.and_then(|r| r.owner), name)
            }
        };
        let Some(owner) = owner else {
            return Ok(None);
        };

        self.flush(session).await?;
        let found = self
            .store
            .find_one(&NodeQuery::all().with_name(name).with_owner(owner))
            .await?;
        self.attach(session, found, require_auth).await
    }

    /// Cache a loaded node in the session and, if asked, check READ.
    async fn attach(
        &self,
        session: &Session,
        node: Option<Node>,
        require_auth: bool,
    ) -> Result<Option<Node>, NodeServiceError> {
        let Some(node) = node else {
            return Ok(None);
        };
        if require_auth {
            self.auth.authorize(session, &node, &PrivilegeSet::read()).await?;
        }
        session.cache_node(&node).await;
        Ok(Some(node))
    }

    async fn attach_all(&self, session: &Session, nodes: &[Node]) {
        for node in nodes {
            session.cache_node(node).await;
        }
    }

    pub async fn get_parent(&self, session: &Session, node: &Node) -> Result<Option<Node>, NodeServiceError> {
        match node.parent_path() {
            Some(parent) => self.get_node_by_path(session, parent, true).await,
            None => Ok(None),
        }
    }

    //
    // CHILDREN AND SIBLINGS
    //

    /// Direct children of `node`, optionally in ordinal order.
    pub async fn get_children(
        &self,
        session: &Session,
        node: &Node,
        ordered: bool,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let mut query = NodeQuery::children_of(&node.path).published_only();
        if ordered {
            query = query.sorted_by(Sort::asc(SortField::Ordinal));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let children = self.store.find_nodes(&query).await?;
        self.attach_all(session, &children).await;
        Ok(children)
    }

    pub async fn get_child_count(&self, session: &Session, node: &Node) -> Result<u64, NodeServiceError> {
        self.flush(session).await?;
        Ok(self
            .store
            .count_nodes(&NodeQuery::children_of(&node.path))
            .await?)
    }

    /// Child whose ordinal is exactly `ordinal`.
    pub async fn get_child_at(
        &self,
        session: &Session,
        node: &Node,
        ordinal: i64,
    ) -> Result<Option<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let found = self
            .store
            .find_one(&NodeQuery::children_of(&node.path).with_ordinal(OrdinalFilter::Eq(ordinal)))
            .await?;
        self.attach(session, found, false).await
    }

    /// Nearest sibling with a lower ordinal.
    pub async fn get_sibling_above(&self, session: &Session, node: &Node) -> Result<Option<Node>, NodeServiceError> {
        let ordinal = self.sibling_ordinal(node)?;
        self.find_sibling(
            session,
            node,
            OrdinalFilter::Lt(ordinal),
            Sort::desc(SortField::Ordinal),
        )
        .await
    }

    /// Nearest sibling with a higher ordinal.
    pub async fn get_sibling_below(&self, session: &Session, node: &Node) -> Result<Option<Node>, NodeServiceError> {
        let ordinal = self.sibling_ordinal(node)?;
        self.find_sibling(
            session,
            node,
            OrdinalFilter::Gt(ordinal),
            Sort::asc(SortField::Ordinal),
        )
        .await
    }

    fn sibling_ordinal(&self, node: &Node) -> Result<i64, NodeServiceError> {
        node.ordinal.ok_or_else(|| {
            NodeServiceError::constraint_violation(format!(
                "cannot find siblings of {} without an ordinal",
                node.path
            ))
        })
    }

    async fn find_sibling(
        &self,
        session: &Session,
        node: &Node,
        filter: OrdinalFilter,
        sort: Sort,
    ) -> Result<Option<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let parent = node.parent_path().unwrap_or("");
        let found = self
            .store
            .find_one(&NodeQuery::children_of(parent).with_ordinal(filter).sorted_by(sort))
            .await?;
        self.attach(session, found, false).await
    }

    /// Most recently modified child.
    pub async fn get_newest_child(&self, session: &Session, node: &Node) -> Result<Option<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let found = self
            .store
            .find_one(
                &NodeQuery::children_of(&node.path)
                    .published_only()
                    .sorted_by(Sort::desc(SortField::ModifyTime)),
            )
            .await?;
        self.attach(session, found, false).await
    }

    //
    // SUBGRAPH SEARCH
    //

    /// Every descendant of `node` at any depth (never `node` itself).
    pub async fn get_subgraph(&self, session: &Session, node: &Node) -> Result<Vec<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let nodes = self
            .store
            .find_nodes(&NodeQuery::subgraph_of(&node.path))
            .await?;
        self.attach_all(session, &nodes).await;
        Ok(nodes)
    }

    pub async fn search_subgraph(
        &self,
        session: &Session,
        node: &Node,
        search: &SubgraphSearch,
    ) -> Result<Vec<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let mut query = NodeQuery::subgraph_of(&node.path).published_only();
        if let Some(text) = search.text.as_deref().filter(|t| !t.is_empty()) {
            query = if search.regex {
                query.with_content_regex(text, search.case_sensitive)?
            } else {
                query.with_content_text(text, search.case_sensitive)?
            };
        }
        if let Some(sort) = search.sort {
            query = query.sorted_by(sort);
        }
        if let Some(limit) = search.limit {
            query = query.limit(limit);
        }

        let nodes = self.store.find_nodes(&query).await?;
        self.attach_all(session, &nodes).await;
        Ok(nodes)
    }

    /// Descendants of `node` that carry an ACL.
    pub async fn search_subgraph_by_acl(
        &self,
        session: &Session,
        node: &Node,
        sort: Option<Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, NodeServiceError> {
        self.auth.authorize(session, node, &PrivilegeSet::read()).await?;
        self.flush(session).await?;

        let mut query = NodeQuery::subgraph_of(&node.path).requiring_acl();
        if let Some(sort) = sort {
            query = query.sorted_by(sort);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(self.store.find_nodes(&query).await?)
    }

    /// Nodes under `path` (default `/r/usr`) shared with any of `principals`,
    /// optionally restricted to one owner.
    pub async fn search_subgraph_by_acl_user(
        &self,
        session: &Session,
        path: Option<&str>,
        principals: &[String],
        owner: Option<&str>,
        sort: Option<Sort>,
        limit: Option<usize>,
    ) -> Result<Vec<Node>, NodeServiceError> {
        self.authorize_principals(session, principals)?;
        self.flush(session).await?;

        let mut query = Self::acl_user_query(path, principals, owner);
        if let Some(sort) = sort {
            query = query.sorted_by(sort);
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(self.store.find_nodes(&query).await?)
    }

    pub async fn count_subgraph_by_acl_user(
        &self,
        session: &Session,
        path: Option<&str>,
        principals: &[String],
        owner: Option<&str>,
    ) -> Result<u64, NodeServiceError> {
        self.authorize_principals(session, principals)?;
        self.flush(session).await?;
        Ok(self
            .store
            .count_nodes(&Self::acl_user_query(path, principals, owner))
            .await?)
    }

    /// Non-admin sessions may only ask about their own account and `public`.
    fn authorize_principals(&self, session: &Session, principals: &[String]) -> Result<(), NodeServiceError> {
        if session.is_admin() {
            return Ok(());
        }
        let account_id = session.account_id();
        match principals
            .iter()
            .find(|p| p.as_str() != PUBLIC_PRINCIPAL && Some(p.as_str()) != account_id)
        {
            Some(other) => Err(NodeServiceError::unauthorized(format!(
                "{} may not search nodes shared with {}",
                session.user_name(),
                other
            ))),
            None => Ok(()),
        }
    }

    fn acl_user_query(path: Option<&str>, principals: &[String], owner: Option<&str>) -> NodeQuery {
        let mut query = NodeQuery::subgraph_of(path.unwrap_or(node_path::USERS_ROOT_PATH))
            .shared_with_any(principals.iter().cloned());
        if let Some(owner) = owner {
            query = query.with_owner(owner);
        }
        query
    }

    /// First direct child of `path` with the given type.
    pub async fn find_typed_node_under_path(
        &self,
        session: &Session,
        path: &str,
        node_type: &str,
    ) -> Result<Option<Node>, NodeServiceError> {
        self.flush(session).await?;
        let found = self
            .store
            .find_one(
                &NodeQuery::children_of(path)
                    .with_type(node_type)
                    .sorted_by(Sort::asc(SortField::Ordinal)),
            )
            .await?;
        self.attach(session, found, true).await
    }

    /// First direct child of `path` whose property `key` equals `value`.
    pub async fn find_node_by_prop(
        &self,
        session: &Session,
        path: &str,
        key: &str,
        value: Value,
    ) -> Result<Option<Node>, NodeServiceError> {
        self.flush(session).await?;
        let found = self
            .store
            .find_one(&NodeQuery::children_of(path).with_property(key, value))
            .await?;
        self.attach(session, found, true).await
    }

    //
    // DELETION
    //

    /// Delete `node` and its whole subgraph. Owner (or admin) only.
    ///
    /// Returns the number of records removed.
    pub async fn delete(&self, session: &Session, node: &Node) -> Result<u64, NodeServiceError> {
        let id = node
            .id_str()
            .ok_or_else(|| NodeServiceError::not_found(format!("unsaved node at {}", node.path)))?;
        let stored = self
            .store
            .get_node_by_id(id)
            .await?
            .ok_or_else(|| NodeServiceError::not_found(format!("node {}", id)))?;

        self.flush(session).await?;
        self.hooks.before_delete(session, &stored).await?;

        let descendants = self
            .store
            .delete_nodes(&NodeQuery::subgraph_of(&stored.path))
            .await?;
        let removed = self.store.delete_node(id).await?;

        tracing::info!(
            "Deleted {} and {} descendant(s)",
            stored.path,
            descendants
        );
        Ok(descendants + removed)
    }
}

#[cfg(test)]
#[path = "node_service_tree_test.rs"]
mod node_service_tree_test;
