//! Path Algebra
//!
//! Every node carries its position in the tree as a `/`-delimited string.
//! Nothing in the store understands hierarchy natively, so parent lookup,
//! ancestor walks and child-path construction are all plain string work.
//!
//! # Reserved Layout
//!
//! - `/r` holds the repository root (the administrator's account node)
//! - `/r/usr` holds one account node per user
//! - `/r/public` holds publicly shared content
//!
//! A trailing `?` segment is the placeholder sigil: "give me a fresh unique
//! leaf under this parent". It is resolved when the node is saved.
//!
//! ```rust
//! use subnode_core::models::node_path;
//!
//! assert_eq!(node_path::parent_path("/r/usr/alice"), Some("/r/usr"));
//! assert_eq!(node_path::leaf_name("/r/usr/alice"), "alice");
//! assert!(node_path::has_placeholder_leaf("/r/usr/alice/?"));
//! ```

use super::ValidationError;

pub const PATH_DELIMITER: char = '/';
pub const PLACEHOLDER: &str = "?";

pub const ROOT_NAME: &str = "r";
pub const USERS_NAME: &str = "usr";
pub const PUBLIC_NAME: &str = "public";

/// Repository root. Owned by (and identical to) the admin account node.
pub const ROOT_PATH: &str = "/r";
/// Parent of every non-admin account node.
pub const USERS_ROOT_PATH: &str = "/r/usr";
pub const PUBLIC_ROOT_PATH: &str = "/r/public";

/// Strip a single trailing delimiter, keeping a bare `/` intact.
pub fn strip_trailing_delimiter(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix(PATH_DELIMITER).unwrap_or(path)
    } else {
        path
    }
}

/// Parent path of `path`, or `None` for root-level paths (whose parent is the
/// implicit root and has no node).
pub fn parent_path(path: &str) -> Option<&str> {
    let path = strip_trailing_delimiter(path);
    match path.rfind(PATH_DELIMITER) {
        Some(0) | None => None,
        Some(idx) => Some(&path[..idx]),
    }
}

/// Last segment of the path.
pub fn leaf_name(path: &str) -> &str {
    let path = strip_trailing_delimiter(path);
    match path.rfind(PATH_DELIMITER) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn is_root_level(path: &str) -> bool {
    parent_path(path).is_none()
}

pub fn has_placeholder_leaf(path: &str) -> bool {
    leaf_name(path) == PLACEHOLDER
}

/// Append `rel_path` under `parent`. An empty parent yields a root-level path.
pub fn join(parent: &str, rel_path: &str) -> String {
    let parent = parent.trim_end_matches(PATH_DELIMITER);
    let rel_path = rel_path.trim_start_matches(PATH_DELIMITER);
    format!("{}{}{}", parent, PATH_DELIMITER, rel_path)
}

/// Replace the last segment of `path` with `leaf`.
pub fn replace_leaf(path: &str, leaf: &str) -> String {
    match parent_path(path) {
        Some(parent) => join(parent, leaf),
        None => join("", leaf),
    }
}

/// Every prefix path from the top of the tree down to and including `path`.
///
/// `/a/b/c` yields `["/a", "/a/b", "/a/b/c"]`.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    let path = strip_trailing_delimiter(path);
    let mut out = Vec::new();
    let mut current = String::with_capacity(path.len());
    for segment in path.split(PATH_DELIMITER).filter(|s| !s.is_empty()) {
        current.push(PATH_DELIMITER);
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

/// Number of segments in the path.
pub fn depth(path: &str) -> usize {
    strip_trailing_delimiter(path)
        .split(PATH_DELIMITER)
        .filter(|s| !s.is_empty())
        .count()
}

/// Structural validation applied before any path reaches the store.
///
/// Paths must be absolute, must not be the bare root, must not contain empty
/// segments, and may only use the placeholder as their final segment.
pub fn validate(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with(PATH_DELIMITER) {
        return Err(ValidationError::InvalidPath(format!(
            "path must be absolute: '{}'",
            path
        )));
    }
    let trimmed = strip_trailing_delimiter(path);
    if trimmed == "/" {
        return Err(ValidationError::InvalidPath(
            "the root path is implicit and cannot address a node".to_string(),
        ));
    }

    let segments: Vec<&str> = trimmed[1..].split(PATH_DELIMITER).collect();
    let last = segments.len() - 1;
    for (idx, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            return Err(ValidationError::InvalidPath(format!(
                "empty path segment in '{}'",
                path
            )));
        }
        if *segment == PLACEHOLDER && idx != last {
            return Err(ValidationError::InvalidPath(format!(
                "placeholder may only be the final segment: '{}'",
                path
            )));
        }
    }
    Ok(())
}
