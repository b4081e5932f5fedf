/// Configuration for the node store and its services
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder leaves are cut from a simple-format UUID, which has 32 hex digits.
const MAX_PLACEHOLDER_ID_LENGTH: usize = 32;
const MIN_PLACEHOLDER_ID_LENGTH: usize = 4;

pub const ENV_DB_PATH: &str = "SUBNODE_DB_PATH";
pub const ENV_PLACEHOLDER_LEN: &str = "SUBNODE_PLACEHOLDER_LEN";
pub const ENV_MAX_PATH_ATTEMPTS: &str = "SUBNODE_MAX_PATH_ATTEMPTS";
pub const ENV_MAX_CONTENT_LEN: &str = "SUBNODE_MAX_CONTENT_LEN";

/// Configuration for the node store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// libsql database file. `None` selects the in-memory store.
    pub database_path: Option<PathBuf>,

    /// Length of the random leaf generated for a `?` placeholder path
    pub placeholder_id_length: usize,

    /// Placeholder candidates tried before the tree is declared corrupt
    pub max_path_attempts: usize,

    /// Node name that anyone may read regardless of ACL
    pub public_landing_name: String,

    /// Upper bound on `Node::content`, in bytes
    pub max_content_length: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            placeholder_id_length: 12,
            max_path_attempts: 32,
            public_landing_name: "home".to_string(),
            max_content_length: 256 * 1024,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `SUBNODE_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(ENV_PLACEHOLDER_LEN) {
            config.placeholder_id_length = parse_usize(ENV_PLACEHOLDER_LEN, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PATH_ATTEMPTS) {
            config.max_path_attempts = parse_usize(ENV_MAX_PATH_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_CONTENT_LEN) {
            config.max_content_length = parse_usize(ENV_MAX_CONTENT_LEN, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(MIN_PLACEHOLDER_ID_LENGTH..=MAX_PLACEHOLDER_ID_LENGTH)
            .contains(&self.placeholder_id_length)
        {
            return Err(format!(
                "placeholder_id_length must be between {} and {}",
                MIN_PLACEHOLDER_ID_LENGTH, MAX_PLACEHOLDER_ID_LENGTH
            ));
        }

        if self.max_path_attempts == 0 {
            return Err("max_path_attempts must be greater than 0".to_string());
        }

        if self.public_landing_name.is_empty() {
            return Err("public_landing_name cannot be empty".to_string());
        }

        if self.max_content_length == 0 {
            return Err("max_content_length must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize, String> {
    raw.trim()
        .parse()
        .map_err(|e| format!("{} must be a non-negative integer, got '{}': {}", key, raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.placeholder_id_length, 12);
        assert_eq!(config.public_landing_name, "home");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_DB_PATH, "/tmp/subnode.db"),
            (ENV_PLACEHOLDER_LEN, "8"),
            (ENV_MAX_PATH_ATTEMPTS, "5"),
        ]
        .into_iter()
        .collect();

        let config = StoreConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/subnode.db")));
        assert_eq!(config.placeholder_id_length, 8);
        assert_eq!(config.max_path_attempts, 5);
        assert_eq!(config.max_content_length, StoreConfig::default().max_content_length);
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let bad_number = StoreConfig::from_lookup(|k| (k == ENV_MAX_PATH_ATTEMPTS).then(|| "lots".to_string()));
        assert!(bad_number.is_err());

        let too_long = StoreConfig::from_lookup(|k| (k == ENV_PLACEHOLDER_LEN).then(|| "64".to_string()));
        assert!(too_long.is_err());
    }
}
