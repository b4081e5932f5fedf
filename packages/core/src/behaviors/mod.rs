//! Node Behavior System
//!
//! This module provides the trait-based behavior system for different node types:
//!
//! - `NodeBehavior` trait - Defines type-specific validation and save-time normalization
//! - Built-in behaviors for plain content, accounts, the repository root and
//!   the well-known per-account containers
//! - `NodeBehaviorRegistry` - Behavior lookup by `node_type`
//!
//! Unknown node types fall back to the plain-content behavior, so new types
//! can be stored without registering anything.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Node, ValidationError, DEFAULT_NODE_TYPE};

/// Property naming the user an account node belongs to.
pub const USER_PROP: &str = "sn:user";

pub const ACCOUNT_TYPE: &str = "sn:account";
pub const REPO_ROOT_TYPE: &str = "sn:repoRoot";
pub const INBOX_TYPE: &str = "sn:inbox";
pub const USER_FEED_TYPE: &str = "sn:userFeed";
pub const FRIEND_LIST_TYPE: &str = "sn:friendList";
pub const TRASH_BIN_TYPE: &str = "sn:trashBin";

/// Properties dropped at save time when they hold their default value.
const DEFAULT_VALUED_PROPS: [(&str, &str); 2] = [("layout", "v"), ("priority", "0")];

/// Remove properties whose value is the implied default.
pub fn remove_default_props(node: &mut Node) {
    for (key, default) in DEFAULT_VALUED_PROPS {
        if node.string_property(key) == Some(default) {
            node.remove_property(key);
        }
    }
}

/// Type-specific hooks consulted on every save.
pub trait NodeBehavior: Send + Sync {
    /// The `node_type` this behavior handles.
    fn type_name(&self) -> &str;

    fn validate(&self, _node: &Node) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Normalize the record just before it is persisted.
    fn before_save(&self, node: &mut Node) {
        remove_default_props(node);
    }
}

/// Plain content (`u`).
pub struct ContentNodeBehavior;

impl NodeBehavior for ContentNodeBehavior {
    fn type_name(&self) -> &str {
        DEFAULT_NODE_TYPE
    }
}

/// Account nodes must say which user they belong to.
pub struct AccountNodeBehavior;

impl NodeBehavior for AccountNodeBehavior {
    fn type_name(&self) -> &str {
        ACCOUNT_TYPE
    }

    fn validate(&self, node: &Node) -> Result<(), ValidationError> {
        match node.string_property(USER_PROP) {
            Some(user) if !user.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::MissingField(format!(
                "account node at {} requires property '{}'",
                node.path, USER_PROP
            ))),
        }
    }
}

/// The repository root at `/r`. It doubles as the admin account.
pub struct RepoRootBehavior;

impl NodeBehavior for RepoRootBehavior {
    fn type_name(&self) -> &str {
        REPO_ROOT_TYPE
    }

    fn validate(&self, node: &Node) -> Result<(), ValidationError> {
        if node.path != crate::models::node_path::ROOT_PATH {
            return Err(ValidationError::InvalidNodeType(format!(
                "{} is only valid at {}, not {}",
                REPO_ROOT_TYPE,
                crate::models::node_path::ROOT_PATH,
                node.path
            )));
        }
        Ok(())
    }
}

/// Well-known container directly under an account node (inbox, feed, ...).
pub struct ContainerNodeBehavior {
    type_name: &'static str,
}

impl ContainerNodeBehavior {
    pub fn new(type_name: &'static str) -> Self {
        Self { type_name }
    }
}

impl NodeBehavior for ContainerNodeBehavior {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn before_save(&self, node: &mut Node) {
        remove_default_props(node);
        if node.content.is_empty() {
            node.content = self.type_name.to_string();
        }
    }
}

/// Behavior lookup by node type.
pub struct NodeBehaviorRegistry {
    behaviors: HashMap<String, Arc<dyn NodeBehavior>>,
    fallback: Arc<dyn NodeBehavior>,
}

impl Default for NodeBehaviorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeBehaviorRegistry {
    /// Registry with every built-in behavior.
    pub fn new() -> Self {
        let fallback: Arc<dyn NodeBehavior> = Arc::new(ContentNodeBehavior);
        let mut registry = Self {
            behaviors: HashMap::new(),
            fallback: fallback.clone(),
        };

        registry.register(fallback);
        registry.register(Arc::new(AccountNodeBehavior));
        registry.register(Arc::new(RepoRootBehavior));
        for type_name in [INBOX_TYPE, USER_FEED_TYPE, FRIEND_LIST_TYPE, TRASH_BIN_TYPE] {
            registry.register(Arc::new(ContainerNodeBehavior::new(type_name)));
        }
        registry
    }

    /// Register (or replace) the behavior for its type.
    pub fn register(&mut self, behavior: Arc<dyn NodeBehavior>) {
        self.behaviors
            .insert(behavior.type_name().to_string(), behavior);
    }

    pub fn has(&self, node_type: &str) -> bool {
        self.behaviors.contains_key(node_type)
    }

    /// Behavior for `node_type`, or the plain-content behavior.
    pub fn get(&self, node_type: &str) -> Arc<dyn NodeBehavior> {
        self.behaviors
            .get(node_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn get_all_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.behaviors.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn validate_node(&self, node: &Node) -> Result<(), ValidationError> {
        node.validate()?;
        self.get(&node.node_type).validate(node)
    }

    pub fn before_save(&self, node: &mut Node) {
        self.get(&node.node_type).before_save(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_types_registered() {
        let registry = NodeBehaviorRegistry::new();
        for t in [DEFAULT_NODE_TYPE, ACCOUNT_TYPE, REPO_ROOT_TYPE, INBOX_TYPE, USER_FEED_TYPE, FRIEND_LIST_TYPE, TRASH_BIN_TYPE] {
            assert!(registry.has(t), "missing behavior for {}", t);
        }
        assert_eq!(registry.get("custom:thing").type_name(), DEFAULT_NODE_TYPE);
    }

    #[test]
    fn test_account_requires_user_property() {
        let registry = NodeBehaviorRegistry::new();
        let mut account = Node::new("/r/usr/abc", ACCOUNT_TYPE);
        assert!(registry.validate_node(&account).is_err());

        account.set_property(USER_PROP, json!("alice"));
        assert!(registry.validate_node(&account).is_ok());
    }

    #[test]
    fn test_repo_root_only_at_root_path() {
        let registry = NodeBehaviorRegistry::new();
        assert!(registry.validate_node(&Node::new("/r", REPO_ROOT_TYPE)).is_ok());
        assert!(registry.validate_node(&Node::new("/r/x", REPO_ROOT_TYPE)).is_err());
    }

    #[test]
    fn test_before_save_removes_default_props() {
        let registry = NodeBehaviorRegistry::new();
        let mut node = Node::new("/r/x", DEFAULT_NODE_TYPE);
        node.set_property("layout", json!("v"));
        node.set_property("priority", json!("0"));
        node.set_property("color", json!("red"));

        registry.before_save(&mut node);
        assert!(node.property("layout").is_none());
        assert!(node.property("priority").is_none());
        assert_eq!(node.string_property("color"), Some("red"));

        let mut inbox = Node::new("/r/usr/abc/in", INBOX_TYPE);
        inbox.set_property("layout", json!("c"));
        registry.before_save(&mut inbox);
        assert_eq!(inbox.string_property("layout"), Some("c"));
        assert_eq!(inbox.content, INBOX_TYPE);
    }
}
