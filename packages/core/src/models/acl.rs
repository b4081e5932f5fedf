//! Privileges and Access Control Lists
//!
//! An ACL maps a principal (an account node id, or the literal `public`) to
//! the set of privileges that principal holds on a node. Privilege sets are
//! stored in their compact text form, e.g. `"rd,wr"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::ValidationError;

/// Principal name that stands for "everyone, signed in or not".
pub const PUBLIC_PRINCIPAL: &str = "public";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Read,
    Write,
}

impl Privilege {
    pub fn code(&self) -> &'static str {
        match self {
            Privilege::Read => "rd",
            Privilege::Write => "wr",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Privilege {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rd" | "read" => Ok(Privilege::Read),
            "wr" | "write" => Ok(Privilege::Write),
            other => Err(ValidationError::InvalidPrivilege(other.to_string())),
        }
    }
}

/// Ordered set of privileges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PrivilegeSet(BTreeSet<Privilege>);

impl PrivilegeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read() -> Self {
        [Privilege::Read].into_iter().collect()
    }

    pub fn write() -> Self {
        [Privilege::Write].into_iter().collect()
    }

    pub fn read_write() -> Self {
        [Privilege::Read, Privilege::Write].into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, privilege: Privilege) -> bool {
        self.0.contains(&privilege)
    }

    /// True when every privilege in `other` is also in `self`.
    pub fn is_superset(&self, other: &PrivilegeSet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// Returns true if the privilege was not already present.
    pub fn insert(&mut self, privilege: Privilege) -> bool {
        self.0.insert(privilege)
    }

    pub fn remove(&mut self, privilege: Privilege) -> bool {
        self.0.remove(&privilege)
    }

    pub fn union(&self, other: &PrivilegeSet) -> PrivilegeSet {
        PrivilegeSet(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Privilege> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Privilege> for PrivilegeSet {
    fn from_iter<I: IntoIterator<Item = Privilege>>(iter: I) -> Self {
        PrivilegeSet(iter.into_iter().collect())
    }
}

impl From<Privilege> for PrivilegeSet {
    fn from(privilege: Privilege) -> Self {
        [privilege].into_iter().collect()
    }
}

impl fmt::Display for PrivilegeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.0.iter().map(Privilege::code).collect();
        f.write_str(&codes.join(","))
    }
}

impl FromStr for PrivilegeSet {
    type Err = ValidationError;

    /// Parses `"rd,wr"`. Blank entries are skipped, unknown codes are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(Privilege::from_str)
            .collect()
    }
}

impl Serialize for PrivilegeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PrivilegeSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Principal id to privilege set.
pub type Acl = BTreeMap<String, PrivilegeSet>;

/// Whether `acl` grants every requested privilege to `principal` or to the
/// public principal, taking the union of both entries.
///
/// `principal` is `None` for anonymous sessions, which only ever see the
/// public entry.
pub fn acl_grants(acl: Option<&Acl>, principal: Option<&str>, requested: &PrivilegeSet) -> bool {
    let Some(acl) = acl else {
        return false;
    };

    let mut granted = PrivilegeSet::new();
    if let Some(id) = principal {
        if let Some(privileges) = acl.get(id) {
            granted = granted.union(privileges);
        }
    }
    if let Some(public) = acl.get(PUBLIC_PRINCIPAL) {
        granted = granted.union(public);
    }

    !granted.is_empty() && granted.is_superset(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_set_text_form() {
        let set: PrivilegeSet = "wr, rd".parse().unwrap();
        assert_eq!(set.to_string(), "rd,wr");
        assert_eq!("".parse::<PrivilegeSet>().unwrap(), PrivilegeSet::new());
        assert!("rd,admin".parse::<PrivilegeSet>().is_err());
    }

    #[test]
    fn test_privilege_set_serde_as_string() {
        let mut acl = Acl::new();
        acl.insert(PUBLIC_PRINCIPAL.to_string(), PrivilegeSet::read());
        let json = serde_json::to_string(&acl).unwrap();
        assert_eq!(json, r#"{"public":"rd"}"#);

        let back: Acl = serde_json::from_str(r#"{"acct-1":"rd,wr"}"#).unwrap();
        assert_eq!(back["acct-1"], PrivilegeSet::read_write());
    }

    #[test]
    fn test_acl_grants_unions_user_and_public() {
        let mut acl = Acl::new();
        acl.insert("bob".to_string(), PrivilegeSet::write());
        acl.insert(PUBLIC_PRINCIPAL.to_string(), PrivilegeSet::read());

        assert!(acl_grants(Some(&acl), Some("bob"), &PrivilegeSet::read_write()));
        assert!(acl_grants(Some(&acl), None, &PrivilegeSet::read()));
        assert!(!acl_grants(Some(&acl), None, &PrivilegeSet::write()));
        assert!(!acl_grants(Some(&acl), Some("carol"), &PrivilegeSet::read_write()));
        assert!(!acl_grants(None, Some("bob"), &PrivilegeSet::read()));
    }
}
