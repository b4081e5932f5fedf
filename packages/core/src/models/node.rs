//! Node Data Structures
//!
//! This module defines the `Node` record every piece of SubNode content is
//! stored as. All nodes live in one flat collection; their place in the tree
//! is carried entirely by `path`, their order among siblings by `ordinal`.
//!
//! # Architecture
//!
//! - **Path-addressed**: `/r/usr/<acct>/...`, no parent pointers
//! - **Owner + ACL**: every saved node has an owning account; sharing is an
//!   optional principal-to-privileges map that children inherit by lookup
//! - **Open properties**: type-specific data lives in a JSON map consulted by
//!   the registered [`NodeBehavior`](crate::behaviors::NodeBehavior)
//!
//! # Examples
//!
//! ```rust
//! use subnode_core::models::Node;
//! use serde_json::json;
//!
//! let mut note = Node::new("/r/usr/a1b2/notes/?", "u");
//! note.content = "first note".to_string();
//! note.set_property("priority", json!("1"));
//! assert!(note.id.is_none());
//! assert_eq!(note.parent_path(), Some("/r/usr/a1b2/notes"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::acl::{Acl, PrivilegeSet, PUBLIC_PRINCIPAL};
use super::node_path;

/// Default node type for plain content.
pub const DEFAULT_NODE_TYPE: &str = "u";

/// Validation errors for Node operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid privilege code: {0}")]
    InvalidPrivilege(String),

    #[error("Invalid user name: {0}")]
    InvalidUserName(String),

    #[error("Properties validation failed: {0}")]
    InvalidProperties(String),

    #[error("Content too large: {len} bytes exceeds limit of {max}")]
    ContentTooLarge { len: usize, max: usize },
}

/// A single unit of content.
///
/// # Fields
///
/// - `id`: Globally unique, assigned on first save when absent
/// - `path`: Position in the tree; a trailing `?` is resolved at save time
/// - `ordinal`: Display order among siblings, defaulted to 0 at save
/// - `owner`: Id of the owning account node; an account node owns itself
/// - `ac`: Optional sharing map, principal id (or `public`) to privileges
/// - `properties`: Open map of type-specific values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub path: String,

    #[serde(default)]
    pub ordinal: Option<i64>,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<Acl>,

    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default)]
    pub create_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub modify_time: Option<DateTime<Utc>>,

    /// Highest child ordinal seen by the last ordinal operation on this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_child_ordinal: Option<i64>,
}

fn default_node_type() -> String {
    DEFAULT_NODE_TYPE.to_string()
}

impl Node {
    /// Create an unsaved node at `path`. Id, owner, ordinal and timestamps
    /// are filled in by the save hooks.
    pub fn new(path: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: None,
            path: path.into(),
            ordinal: None,
            owner: None,
            node_type: node_type.into(),
            content: String::new(),
            name: None,
            tags: None,
            ac: None,
            properties: Map::new(),
            create_time: None,
            modify_time: None,
            max_child_ordinal: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Id as a string slice, if assigned.
    pub fn id_str(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Assign a fresh UUID if this node has none yet and return the id.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(|| Uuid::new_v4().to_string())
    }

    pub fn parent_path(&self) -> Option<&str> {
        node_path::parent_path(&self.path)
    }

    pub fn leaf_name(&self) -> &str {
        node_path::leaf_name(&self.path)
    }

    /// Account nodes are exactly the nodes that own themselves.
    pub fn is_account_node(&self) -> bool {
        matches!((&self.id, &self.owner), (Some(id), Some(owner)) if id == owner)
    }

    pub fn is_owned_by(&self, account_id: &str) -> bool {
        self.owner.as_deref() == Some(account_id)
    }

    /// Stamp the modification time. Called on every mutation.
    pub fn touch(&mut self) {
        self.modify_time = Some(Utc::now());
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn string_property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.properties.remove(key)
    }

    /// Privileges granted to `principal` by this node's own ACL.
    pub fn privileges_for(&self, principal: &str) -> Option<&PrivilegeSet> {
        self.ac.as_ref().and_then(|acl| acl.get(principal))
    }

    pub fn is_public(&self) -> bool {
        self.privileges_for(PUBLIC_PRINCIPAL).is_some()
    }

    /// Rewrite `name` so it cannot collide with path or name-lookup sigils.
    pub fn sanitize_name(&mut self) {
        if let Some(name) = self.name.as_mut() {
            if name.contains([':', '~', '/']) {
                *name = sanitize_name(name);
            }
        }
    }

    /// Drop any self-share and collapse an empty ACL to absent.
    pub fn normalize_acl(&mut self) {
        if let Some(acl) = self.ac.as_mut() {
            if let Some(owner) = self.owner.as_deref() {
                acl.remove(owner);
            }
            acl.retain(|_, privileges| !privileges.is_empty());
            if acl.is_empty() {
                self.ac = None;
            }
        }
    }

    /// Validate the fields the store relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        node_path::validate(&self.path)?;

        if self.node_type.trim().is_empty() {
            return Err(ValidationError::MissingField("node_type".to_string()));
        }
        if let Some(id) = &self.id {
            if id.is_empty() || id.starts_with(node_path::PATH_DELIMITER) || id.contains([':', '~'])
            {
                return Err(ValidationError::InvalidProperties(format!(
                    "node id '{}' collides with lookup sigils",
                    id
                )));
            }
        }
        Ok(())
    }
}

/// Replace `:`, `~` and `/` with `-`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, ':' | '~' | '/') { '-' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my:notes/2024~draft"), "my-notes-2024-draft");

        let mut node = Node::new("/r/x", DEFAULT_NODE_TYPE).with_name("a/b");
        node.sanitize_name();
        assert_eq!(node.name.as_deref(), Some("a-b"));
    }

    #[test]
    fn test_account_node_is_self_owned() {
        let mut node = Node::new("/r/usr/abc", "sn:account");
        assert!(!node.is_account_node());
        let id = node.ensure_id().to_string();
        node.owner = Some(id);
        assert!(node.is_account_node());
    }

    #[test]
    fn test_normalize_acl_strips_owner_and_collapses_empty() {
        let mut node = Node::new("/r/x", DEFAULT_NODE_TYPE).with_owner("alice");
        let mut acl = Acl::new();
        acl.insert("alice".to_string(), PrivilegeSet::read_write());
        node.ac = Some(acl);

        node.normalize_acl();
        assert!(node.ac.is_none());

        let mut acl = Acl::new();
        acl.insert("alice".to_string(), PrivilegeSet::read());
        acl.insert("bob".to_string(), PrivilegeSet::read());
        node.ac = Some(acl);
        node.normalize_acl();
        let acl = node.ac.as_ref().unwrap();
        assert_eq!(acl.len(), 1);
        assert!(acl.contains_key("bob"));
    }

    #[test]
    fn test_json_shape() {
        let mut node = Node::new("/r/x", DEFAULT_NODE_TYPE).with_content("hi");
        node.set_property("layout", json!("v"));
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "u");
        assert_eq!(value["properties"]["layout"], "v");
        assert!(value.get("id").is_none());

        let back: Node = serde_json::from_value(json!({ "path": "/r/y" })).unwrap();
        assert_eq!(back.node_type, DEFAULT_NODE_TYPE);
        assert!(back.properties.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(Node::new("/r/x", "u").validate().is_ok());
        assert!(Node::new("r/x", "u").validate().is_err());
        assert!(Node::new("/r/x", " ").validate().is_err());

        let mut node = Node::new("/r/x", "u");
        node.id = Some("bad:id".to_string());
        assert!(node.validate().is_err());
    }
}
