//! Node Queries
//!
//! The store keeps every node in one flat collection, so "children of P" and
//! "everything under P" are pattern queries over the `path` field:
//!
//! - direct children of `P`: `^<P>/[^/]*$`
//! - recursive subgraph of `P`: `^<P>/.+$` (never matches `P` itself)
//!
//! `P` is escaped before it is embedded, and both patterns anchor at the
//! start and end, so `/ab` never matches under `/a` and `/a.b` never matches
//! under `/axb`.
//!
//! [`NodeQuery`] composes a path scope with the other filters the services
//! need. [`NodeQuery::compile`] yields a [`QueryMatcher`], the single
//! definition of "this node matches" that every backend applies.

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;

use super::DatabaseError;
use crate::models::{node_path, Node};

/// Pattern matching the direct children of `path`.
pub fn regex_direct_children_of_path(path: &str) -> String {
    let path = node_path::strip_trailing_delimiter(path);
    let path = if path == "/" { "" } else { path };
    format!("^{}/[^/]*$", regex::escape(path))
}

/// Pattern matching every descendant of `path` at any depth.
pub fn regex_recursive_children_of_path(path: &str) -> String {
    let path = node_path::strip_trailing_delimiter(path);
    let path = if path == "/" { "" } else { path };
    format!("^{}/.+$", regex::escape(path))
}

/// Which paths a query covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PathScope {
    #[default]
    Any,
    Exact(String),
    DirectChildren(String),
    Subgraph(String),
}

impl PathScope {
    /// Anchored pattern for this scope, `None` when the scope needs no regex.
    pub fn pattern(&self) -> Option<String> {
        match self {
            PathScope::Any | PathScope::Exact(_) => None,
            PathScope::DirectChildren(path) => Some(regex_direct_children_of_path(path)),
            PathScope::Subgraph(path) => Some(regex_recursive_children_of_path(path)),
        }
    }

    /// Base path the scope is anchored at.
    pub fn base_path(&self) -> Option<&str> {
        match self {
            PathScope::Any => None,
            PathScope::Exact(path) | PathScope::DirectChildren(path) | PathScope::Subgraph(path) => {
                Some(node_path::strip_trailing_delimiter(path))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrdinalFilter {
    Eq(i64),
    Lt(i64),
    Gt(i64),
    Gte(i64),
}

impl OrdinalFilter {
    pub fn accepts(&self, ordinal: i64) -> bool {
        match *self {
            OrdinalFilter::Eq(v) => ordinal == v,
            OrdinalFilter::Lt(v) => ordinal < v,
            OrdinalFilter::Gt(v) => ordinal > v,
            OrdinalFilter::Gte(v) => ordinal >= v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Ordinal,
    CreateTime,
    ModifyTime,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Ordinal => "ordinal",
            SortField::CreateTime => "create_time",
            SortField::ModifyTime => "modify_time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }

    /// Total order used by every backend; ties break on path.
    pub fn compare(&self, a: &Node, b: &Node) -> Ordering {
        let primary = match self.field {
            SortField::Ordinal => a.ordinal.unwrap_or(0).cmp(&b.ordinal.unwrap_or(0)),
            SortField::CreateTime => a.create_time.cmp(&b.create_time),
            SortField::ModifyTime => a.modify_time.cmp(&b.modify_time),
        };
        let primary = match self.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.path.cmp(&b.path))
    }
}

/// Content filter: a compiled pattern applied to `Node::content`.
#[derive(Debug, Clone)]
pub struct ContentFilter(Regex);

impl ContentFilter {
    pub fn is_match(&self, content: &str) -> bool {
        self.0.is_match(content)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Composable node query.
///
/// ```rust
/// use subnode_core::db::{NodeQuery, OrdinalFilter, Sort, SortField};
///
/// // Nearest sibling above ordinal 3 under /r/usr/a1
/// let query = NodeQuery::children_of("/r/usr/a1")
///     .with_ordinal(OrdinalFilter::Lt(3))
///     .sorted_by(Sort::desc(SortField::Ordinal))
///     .limit(1);
/// assert_eq!(query.limit, Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    pub scope: PathScope,
    pub ordinal: Option<OrdinalFilter>,
    pub node_type: Option<String>,
    pub name: Option<String>,
    pub owner: Option<String>,
    pub property: Option<(String, Value)>,
    pub content: Option<ContentFilter>,
    pub has_acl: bool,
    pub acl_principals: Vec<String>,
    pub published_only: bool,
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
}

impl NodeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn at_path(path: &str) -> Self {
        Self {
            scope: PathScope::Exact(node_path::strip_trailing_delimiter(path).to_string()),
            ..Self::default()
        }
    }

    pub fn children_of(path: &str) -> Self {
        Self {
            scope: PathScope::DirectChildren(path.to_string()),
            ..Self::default()
        }
    }

    pub fn subgraph_of(path: &str) -> Self {
        Self {
            scope: PathScope::Subgraph(path.to_string()),
            ..Self::default()
        }
    }

    pub fn with_ordinal(mut self, filter: OrdinalFilter) -> Self {
        self.ordinal = Some(filter);
        self
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.property = Some((key.into(), value));
        self
    }

    /// Filter content by a regular expression.
    pub fn with_content_regex(mut self, pattern: &str, case_sensitive: bool) -> Result<Self, DatabaseError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()?;
        self.content = Some(ContentFilter(regex));
        Ok(self)
    }

    /// Filter content by a literal substring.
    pub fn with_content_text(self, text: &str, case_sensitive: bool) -> Result<Self, DatabaseError> {
        self.with_content_regex(&regex::escape(text), case_sensitive)
    }

    pub fn requiring_acl(mut self) -> Self {
        self.has_acl = true;
        self
    }

    /// Only nodes whose ACL names at least one of `principals`.
    pub fn shared_with_any<I, S>(mut self, principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acl_principals = principals.into_iter().map(Into::into).collect();
        self
    }

    /// Skip records that were never stamped with a modification time.
    pub fn published_only(mut self) -> Self {
        self.published_only = true;
        self
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn compile(&self) -> Result<QueryMatcher<'_>, DatabaseError> {
        let path_pattern = match self.scope.pattern() {
            Some(pattern) => Some(Regex::new(&pattern)?),
            None => None,
        };
        Ok(QueryMatcher {
            query: self,
            path_pattern,
        })
    }
}

/// A query with its path pattern compiled.
#[derive(Debug)]
pub struct QueryMatcher<'q> {
    query: &'q NodeQuery,
    path_pattern: Option<Regex>,
}

impl QueryMatcher<'_> {
    pub fn matches(&self, node: &Node) -> bool {
        let q = self.query;

        let path_ok = match (&q.scope, &self.path_pattern) {
            (PathScope::Any, _) => true,
            (PathScope::Exact(path), _) => node.path == *path,
            (_, Some(pattern)) => pattern.is_match(&node.path),
            (_, None) => false,
        };
        if !path_ok {
            return false;
        }

        if let Some(filter) = q.ordinal {
            if !filter.accepts(node.ordinal.unwrap_or(0)) {
                return false;
            }
        }
        if let Some(node_type) = &q.node_type {
            if node.node_type != *node_type {
                return false;
            }
        }
        if let Some(name) = &q.name {
            if node.name.as_deref() != Some(name.as_str()) {
                return false;
            }
        }
        if let Some(owner) = &q.owner {
            if node.owner.as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        if let Some((key, value)) = &q.property {
            if node.properties.get(key) != Some(value) {
                return false;
            }
        }
        if let Some(content) = &q.content {
            if !content.is_match(&node.content) {
                return false;
            }
        }
        if q.has_acl && node.ac.as_ref().map_or(true, |acl| acl.is_empty()) {
            return false;
        }
        if !q.acl_principals.is_empty() {
            let shared = node.ac.as_ref().is_some_and(|acl| {
                q.acl_principals.iter().any(|principal| acl.contains_key(principal))
            });
            if !shared {
                return false;
            }
        }
        if q.published_only && node.modify_time.is_none() {
            return false;
        }
        true
    }

    /// Filter, sort and limit an unordered candidate set.
    pub fn apply(&self, candidates: impl IntoIterator<Item = Node>) -> Vec<Node> {
        let mut out: Vec<Node> = candidates.into_iter().filter(|n| self.matches(n)).collect();
        match self.query.sort {
            Some(sort) => out.sort_by(|a, b| sort.compare(a, b)),
            None => out.sort_by(|a, b| a.path.cmp(&b.path)),
        }
        if let Some(limit) = self.query.limit {
            out.truncate(limit);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Acl, PrivilegeSet};
    use serde_json::json;

    fn node(path: &str, ordinal: i64) -> Node {
        let mut n = Node::new(path, "u");
        n.ordinal = Some(ordinal);
        n
    }

    #[test]
    fn test_direct_children_pattern_is_anchored() {
        let query = NodeQuery::children_of("/r/usr/alice");
        let m = query.compile().unwrap();
        assert!(m.matches(&node("/r/usr/alice/posts", 0)));
        assert!(!m.matches(&node("/r/usr/alice/posts/1", 0)));
        assert!(!m.matches(&node("/r/usr/alice", 0)));
        assert!(!m.matches(&node("/r/usr/alicex/posts", 0)));
    }

    #[test]
    fn test_subgraph_excludes_prefix_collisions() {
        let query = NodeQuery::subgraph_of("/r/usr/alice/posts/");
        let m = query.compile().unwrap();
        assert!(m.matches(&node("/r/usr/alice/posts/a", 0)));
        assert!(m.matches(&node("/r/usr/alice/posts/a/b/c", 0)));
        assert!(!m.matches(&node("/r/usr/alice/posts", 0)));
        assert!(!m.matches(&node("/r/usr/alice/postscript", 0)));
    }

    #[test]
    fn test_path_metacharacters_are_escaped() {
        let query = NodeQuery::subgraph_of("/a.b");
        let m = query.compile().unwrap();
        assert!(m.matches(&node("/a.b/c", 0)));
        assert!(!m.matches(&node("/axb/c", 0)));
    }

    #[test]
    fn test_sibling_style_query() {
        let nodes = vec![node("/p/a", 0), node("/p/b", 1), node("/p/c", 2), node("/p/d", 3)];
        let query = NodeQuery::children_of("/p")
            .with_ordinal(OrdinalFilter::Lt(3))
            .sorted_by(Sort::desc(SortField::Ordinal))
            .limit(1);
        let found = query.compile().unwrap().apply(nodes);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/p/c");
    }

    #[test]
    fn test_content_and_acl_filters() {
        let mut shared = node("/p/a", 0);
        shared.content = "Hello World".to_string();
        let mut acl = Acl::new();
        acl.insert("bob".to_string(), PrivilegeSet::read());
        shared.ac = Some(acl);
        shared.set_property("kind", json!("note"));

        let query = NodeQuery::subgraph_of("/p")
            .with_content_text("hello", false)
            .unwrap()
            .requiring_acl()
            .shared_with_any(["carol", "bob"])
            .with_property("kind", json!("note"));
        let m = query.compile().unwrap();
        assert!(m.matches(&shared));

        let query = NodeQuery::subgraph_of("/p").with_content_text("hello", true).unwrap();
        assert!(!query.compile().unwrap().matches(&shared));
    }

    #[test]
    fn test_published_only_skips_unstamped() {
        let mut stamped = node("/p/a", 0);
        stamped.touch();
        let unstamped = node("/p/b", 1);
        let query = NodeQuery::children_of("/p").published_only();
        let found = query.compile().unwrap().apply(vec![stamped, unstamped]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/p/a");
    }
}
