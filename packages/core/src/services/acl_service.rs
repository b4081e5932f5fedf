//! ACL Mutation and Sharing
//!
//! Owner-only operations that change who can see a node, plus helpers the
//! sharing layer builds on: default ACLs for replies, resolving an ACL back
//! to user names, and sharing a node with the users it `@mentions`.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{NodeService, NodeServiceError, Session};
use crate::models::{Acl, Node, PrivilegeSet, PUBLIC_PRINCIPAL};

/// Pull `@name` mentions out of free text.
///
/// A mention is a whitespace-separated token starting with a single `@` and
/// containing at most two `@` in total (`@bob` or `@bob@remote.host`).
/// Trailing punctuation is ignored.
pub fn parse_mentions(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .filter(|token| token.starts_with('@') && !token.starts_with("@@"))
        .filter(|token| token.matches('@').count() <= 2)
        .map(|token| {
            token[1..]
                .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'))
                .to_string()
        })
        .filter(|name| !name.is_empty() && !name.ends_with('@'))
        .collect()
}

pub struct AclService {
    nodes: Arc<NodeService>,
}

impl AclService {
    pub fn new(nodes: Arc<NodeService>) -> Self {
        Self { nodes }
    }

    /// Give `principal` (a user name, or `public`) the listed privileges on
    /// `node`, saving the node if anything changed.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` unless the session owns the node
    /// - `NotFound` if `principal` names no user
    pub async fn grant(
        &self,
        session: &Session,
        node: &mut Node,
        principal: &str,
        privileges: &PrivilegeSet,
    ) -> Result<bool, NodeServiceError> {
        self.nodes.auth().require_owner(session, node)?;
        if privileges.is_empty() {
            return Err(NodeServiceError::constraint_violation("no privileges to grant"));
        }

        let principal_id = self.principal_id(principal).await?;
        if node.owner.as_deref() == Some(principal_id.as_str()) {
            tracing::debug!("Ignoring self-share of {} to its owner", node.path);
            return Ok(false);
        }

        let entry = node
            .ac
            .get_or_insert_with(Acl::new)
            .entry(principal_id)
            .or_default();
        let mut changed = false;
        for privilege in privileges.iter() {
            changed |= entry.insert(privilege);
        }

        if changed {
            self.nodes.save(session, node).await?;
            tracing::debug!("Granted {} on {} to {}", privileges, node.path, principal);
        }
        Ok(changed)
    }

    /// Remove the listed privileges for `principal_id` (an account id, or
    /// `public`). Entries left empty are dropped; an empty ACL becomes absent.
    pub async fn revoke(
        &self,
        session: &Session,
        node: &mut Node,
        principal_id: &str,
        privileges: &PrivilegeSet,
    ) -> Result<bool, NodeServiceError> {
        self.nodes.auth().require_owner(session, node)?;

        let Some(acl) = node.ac.as_mut() else {
            return Ok(false);
        };
        let Some(entry) = acl.get_mut(principal_id) else {
            return Ok(false);
        };

        let mut changed = false;
        for privilege in privileges.iter() {
            changed |= entry.remove(privilege);
        }
        if entry.is_empty() {
            acl.remove(principal_id);
        }
        if acl.is_empty() {
            node.ac = None;
        }

        if changed {
            self.nodes.save(session, node).await?;
            tracing::debug!("Revoked {} on {} from {}", privileges, node.path, principal_id);
        }
        Ok(changed)
    }

    /// ACL for a reply: the parent's ACL minus the replier, plus read/write
    /// for the parent's owner. `None` when that leaves nothing.
    pub fn default_reply_acl(parent: &Node, child: &Node) -> Option<Acl> {
        let mut acl = parent.ac.clone().unwrap_or_default();

        if let Some(child_owner) = child.owner.as_deref() {
            acl.remove(child_owner);
        }
        if let Some(parent_owner) = parent.owner.as_deref() {
            if child.owner.as_deref() != Some(parent_owner) {
                let entry = acl.entry(parent_owner.to_string()).or_default();
                *entry = entry.union(&PrivilegeSet::read_write());
            }
        }

        (!acl.is_empty()).then_some(acl)
    }

    /// User names (or `public`) the node is shared with.
    pub async fn users_shared_to(&self, node: &Node) -> Result<Vec<String>, NodeServiceError> {
        let Some(acl) = &node.ac else {
            return Ok(Vec::new());
        };

        let mut names = Vec::with_capacity(acl.len());
        for principal in acl.keys() {
            if principal == PUBLIC_PRINCIPAL {
                names.push(PUBLIC_PRINCIPAL.to_string());
                continue;
            }
            match self.nodes.user_name_for_account(principal).await? {
                Some(name) => names.push(name),
                None => tracing::warn!("ACL on {} names unknown account {}", node.path, principal),
            }
        }
        Ok(names)
    }

    /// Share `node` read/write with every local user its content mentions.
    /// Returns the user names newly shared with.
    pub async fn share_to_mentions(
        &self,
        session: &Session,
        node: &mut Node,
    ) -> Result<BTreeSet<String>, NodeServiceError> {
        self.nodes.auth().require_owner(session, node)?;

        let mut shared = BTreeSet::new();
        for name in parse_mentions(&node.content) {
            if name.contains('@') {
                tracing::debug!("Skipping remote mention @{}", name);
                continue;
            }

            let account_id = match self.nodes.get_user_node_by_user_name(&name).await? {
                Some(account) => account.id,
                None => {
                    tracing::warn!("Mentioned user {} not found", name);
                    continue;
                }
            };
            let Some(account_id) = account_id else {
                continue;
            };
            if node.owner.as_deref() == Some(account_id.as_str()) {
                continue;
            }

            let entry = node
                .ac
                .get_or_insert_with(Acl::new)
                .entry(account_id)
                .or_default();
            let before = entry.clone();
            *entry = entry.union(&PrivilegeSet::read_write());
            if *entry != before {
                shared.insert(name);
            }
        }

        if !shared.is_empty() {
            self.nodes.save(session, node).await?;
        }
        Ok(shared)
    }

    pub fn is_public(node: &Node) -> bool {
        node.is_public()
    }

    async fn principal_id(&self, principal: &str) -> Result<String, NodeServiceError> {
        if principal == PUBLIC_PRINCIPAL {
            return Ok(PUBLIC_PRINCIPAL.to_string());
        }
        self.nodes
            .get_user_node_by_user_name(principal)
            .await?
            .and_then(|account| account.id)
            .ok_or_else(|| NodeServiceError::not_found(format!("user {}", principal)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mentions() {
        let found = parse_mentions("hi @bob and @carol, also @@nobody and @dave@remote.example @x@y@z");
        let expected: BTreeSet<String> = ["bob", "carol", "dave@remote.example"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(found, expected);
        assert!(parse_mentions("no mentions here, just an email a@b.c").is_empty());
    }

    #[test]
    fn test_default_reply_acl() {
        let mut parent = Node::new("/r/usr/a/post", "u").with_owner("alice");
        let mut acl = Acl::new();
        acl.insert("bob".to_string(), PrivilegeSet::read());
        acl.insert("carol".to_string(), PrivilegeSet::read());
        parent.ac = Some(acl);

        let reply = Node::new("/r/usr/a/post/reply", "u").with_owner("bob");
        let acl = AclService::default_reply_acl(&parent, &reply).unwrap();
        assert!(!acl.contains_key("bob"));
        assert_eq!(acl["carol"], PrivilegeSet::read());
        assert_eq!(acl["alice"], PrivilegeSet::read_write());

        // Owner replying to their own post with nothing else shared
        let plain_parent = Node::new("/r/usr/a/p2", "u").with_owner("alice");
        let own_reply = Node::new("/r/usr/a/p2/r", "u").with_owner("alice");
        assert!(AclService::default_reply_acl(&plain_parent, &own_reply).is_none());
    }
}
