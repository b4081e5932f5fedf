//! Accounts, Well-Known Nodes and Bootstrap
//!
//! The repository root `/r` is the admin's account node. Every other user has
//! one self-owned account node directly under `/r/usr`, identified by its
//! `sn:user` property. Per-account containers (inbox, feed, ...) are typed
//! children of the account node, created the first time they are asked for.

use serde_json::json;

use super::{CreateNodeLocation, CreateNodeParams, NodeService, NodeServiceError, Session};
use crate::behaviors::{ACCOUNT_TYPE, REPO_ROOT_TYPE, USER_FEED_TYPE, USER_PROP};
use crate::db::NodeQuery;
use crate::models::{node_path, Acl, Node, PrivilegeSet, ValidationError, DEFAULT_NODE_TYPE, PUBLIC_PRINCIPAL};

use super::session::{ADMIN_USER_NAME, ANONYMOUS_USER_NAME};

/// Names no account may take, compared case-insensitively.
pub const RESERVED_USER_NAMES: [&str; 3] = [ADMIN_USER_NAME, PUBLIC_PRINCIPAL, ANONYMOUS_USER_NAME];

/// Counts gathered by [`NodeService::node_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub total_nodes: u64,
    pub accounts: u64,
}

/// Reject reserved names and names that would collide with lookup sigils.
pub fn validate_user_name(user_name: &str) -> Result<(), ValidationError> {
    let trimmed = user_name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidUserName("user name is empty".to_string()));
    }
    if RESERVED_USER_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(trimmed))
    {
        return Err(ValidationError::InvalidUserName(format!(
            "'{}' is reserved",
            trimmed
        )));
    }
    if trimmed != user_name || user_name.contains(['/', ':', '~', '@', '?']) {
        return Err(ValidationError::InvalidUserName(format!(
            "'{}' contains reserved characters",
            user_name
        )));
    }
    Ok(())
}

impl NodeService {
    /// Create `/r`, `/r/usr` and `/r/public` if they are missing.
    ///
    /// Runs with the parent-existence check suppressed; safe to call on an
    /// already bootstrapped store. Returns the root node.
    pub async fn bootstrap(&self, session: &Session) -> Result<Node, NodeServiceError> {
        self.auth.require_admin(session)?;

        let parent_check = session.parent_check_enabled();
        session.set_parent_check(false);
        let result = self.bootstrap_tree(session).await;
        session.set_parent_check(parent_check);
        result
    }

    async fn bootstrap_tree(&self, session: &Session) -> Result<Node, NodeServiceError> {
        let root = match self.store.get_node_by_path(node_path::ROOT_PATH).await? {
            Some(root) => root,
            None => {
                let mut root = Node::new(node_path::ROOT_PATH, REPO_ROOT_TYPE)
                    .with_content("Repository Root");
                root.set_property(USER_PROP, json!(ADMIN_USER_NAME));
                let id = root.ensure_id().to_string();
                root.owner = Some(id);
                self.save(session, &mut root).await?;
                tracing::info!("Created repository root {}", node_path::ROOT_PATH);
                root
            }
        };

        // Nodes created below must be owned by the admin account even when
        // the session predates the root.
        let admin = Session::admin(root.id.clone());
        admin.set_parent_check(false);

        self.ensure_system_node(&admin, node_path::USERS_ROOT_PATH, None).await?;

        let mut public_acl = Acl::new();
        public_acl.insert(PUBLIC_PRINCIPAL.to_string(), PrivilegeSet::read());
        self.ensure_system_node(&admin, node_path::PUBLIC_ROOT_PATH, Some(public_acl))
            .await?;

        Ok(root)
    }

    async fn ensure_system_node(
        &self,
        session: &Session,
        path: &str,
        ac: Option<Acl>,
    ) -> Result<(), NodeServiceError> {
        if self.store.path_exists(path).await? {
            return Ok(());
        }
        let mut node = Node::new(path, DEFAULT_NODE_TYPE);
        node.ac = ac;
        self.save(session, &mut node).await?;
        tracing::info!("Created system node {}", path);
        Ok(())
    }

    /// Admin-only: create an account node at a generated path under `/r/usr`.
    pub async fn create_user(&self, session: &Session, user_name: &str) -> Result<Node, NodeServiceError> {
        self.auth.require_admin(session)?;
        validate_user_name(user_name)?;

        let _creating = self.account_lock.lock().await;
        if self.get_user_node_by_user_name(user_name).await?.is_some() {
            return Err(NodeServiceError::constraint_violation(format!(
                "user already exists: {}",
                user_name
            )));
        }

        let mut account = Node::new(
            node_path::join(node_path::USERS_ROOT_PATH, node_path::PLACEHOLDER),
            ACCOUNT_TYPE,
        )
        .with_content(format!("### Account: {}", user_name));
        account.set_property(USER_PROP, json!(user_name));
        let id = account.ensure_id().to_string();
        account.owner = Some(id.clone());

        self.save(session, &mut account).await?;
        self.cache.put_user_name(&id, user_name).await;
        tracing::info!("Created user {} at {}", user_name, account.path);
        Ok(account)
    }

    /// `admin` resolves to `/r`; anyone else to their account under `/r/usr`.
    pub async fn get_user_node_by_user_name(&self, user_name: &str) -> Result<Option<Node>, NodeServiceError> {
        if user_name.eq_ignore_ascii_case(ADMIN_USER_NAME) {
            return Ok(self.store.get_node_by_path(node_path::ROOT_PATH).await?);
        }

        Ok(self
            .store
            .find_one(
                &NodeQuery::children_of(node_path::USERS_ROOT_PATH)
                    .with_property(USER_PROP, json!(user_name)),
            )
            .await?)
    }

    /// User name recorded on an account node, via the process-wide cache.
    pub async fn user_name_for_account(&self, account_id: &str) -> Result<Option<String>, NodeServiceError> {
        if let Some(name) = self.cache.user_name(account_id).await {
            return Ok(Some(name));
        }

        let name = self
            .store
            .get_node_by_id(account_id)
            .await?
            .and_then(|account| account.string_property(USER_PROP).map(str::to_string));
        if let Some(name) = &name {
            self.cache.put_user_name(account_id, name).await;
        }
        Ok(name)
    }

    /// Session acting as an existing user.
    pub async fn session_for_user(&self, user_name: &str) -> Result<Session, NodeServiceError> {
        let account = self
            .get_user_node_by_user_name(user_name)
            .await?
            .ok_or_else(|| NodeServiceError::not_found(format!("user {}", user_name)))?;

        if user_name.eq_ignore_ascii_case(ADMIN_USER_NAME) {
            return Ok(Session::admin(account.id));
        }

        let account_id = account.id.ok_or_else(|| {
            NodeServiceError::structural_corruption(format!("account {} has no id", user_name))
        })?;
        Ok(Session::for_user(user_name, account_id))
    }

    /// Admin session bound to the root account, if the store is bootstrapped.
    pub async fn admin_session(&self) -> Result<Session, NodeServiceError> {
        let root = self.store.get_node_by_path(node_path::ROOT_PATH).await?;
        Ok(Session::admin(root.and_then(|r| r.id)))
    }

    /// First child of the session's account node with `node_type`, created
    /// last among its siblings if missing. Anonymous sessions have no
    /// account and get `None`.
    pub async fn get_user_node_by_type(
        &self,
        session: &Session,
        node_type: &str,
    ) -> Result<Option<Node>, NodeServiceError> {
        if session.is_anonymous() {
            return Ok(None);
        }

        let account = if session.is_admin() {
            self.store.get_node_by_path(node_path::ROOT_PATH).await?
        } else {
            match session.account_id() {
                Some(id) => self.store.get_node_by_id(id).await?,
                None => None,
            }
        };
        let mut account = account.ok_or_else(|| {
            NodeServiceError::not_found(format!("account node for {}", session.user_name()))
        })?;

        if let Some(existing) = self
            .find_typed_node_under_path(session, &account.path, node_type)
            .await?
        {
            return Ok(Some(existing));
        }

        let params = CreateNodeParams {
            node_type: Some(node_type.to_string()),
            location: CreateNodeLocation::Last,
            ..Default::default()
        };
        let mut node = self.create_node(session, Some(&mut account), params).await?;
        node.owner = account.id.clone();
        node.content = node_type.to_string();

        if node_type == USER_FEED_TYPE {
            let mut acl = Acl::new();
            acl.insert(PUBLIC_PRINCIPAL.to_string(), PrivilegeSet::read_write());
            node.ac = Some(acl);
        }

        self.save(session, &mut node).await?;
        tracing::debug!("Created {} node for {} at {}", node_type, session.user_name(), node.path);
        Ok(Some(node))
    }

    /// Walk `rel_path` under `parent_path`, creating each missing segment.
    /// Returns the deepest node.
    pub async fn ensure_node_exists(
        &self,
        session: &Session,
        parent_path: &str,
        rel_path: &str,
        node_type: Option<&str>,
    ) -> Result<Node, NodeServiceError> {
        let mut current_path = node_path::strip_trailing_delimiter(parent_path).to_string();
        if current_path == "/" {
            current_path.clear();
        }

        let mut current: Option<Node> = None;
        for segment in rel_path.split(node_path::PATH_DELIMITER).filter(|s| !s.is_empty()) {
            let path = node_path::join(&current_path, segment);

            let node = match self.store.get_node_by_path(&path).await? {
                Some(existing) => existing,
                None => {
                    let mut created = Node::new(path.clone(), node_type.unwrap_or(DEFAULT_NODE_TYPE));
                    created.owner = match session.account_id() {
                        Some(id) => Some(id.to_string()),
                        None => current.as_ref().and_then(|parent| parent.owner.clone()),
                    };
                    self.save(session, &mut created).await?;
                    tracing::debug!("Created missing node {}", path);
                    created
                }
            };

            current_path = path;
            current = Some(node);
        }

        current.ok_or_else(|| {
            NodeServiceError::constraint_violation(format!("empty relative path under {}", parent_path))
        })
    }

    /// Admin-only: total and account node counts, logged at info.
    pub async fn node_report(&self, session: &Session) -> Result<NodeReport, NodeServiceError> {
        self.auth.require_admin(session)?;
        self.flush(session).await?;

        let report = NodeReport {
            total_nodes: self.store.count_nodes(&NodeQuery::all()).await?,
            accounts: self
                .store
                .count_nodes(&NodeQuery::children_of(node_path::USERS_ROOT_PATH).with_type(ACCOUNT_TYPE))
                .await?,
        };
        tracing::info!(
            "Node report: {} node(s), {} account(s)",
            report.total_nodes,
            report.accounts
        );
        Ok(report)
    }
}
