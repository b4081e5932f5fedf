//! Database Connection Management
//!
//! This module provides the libsql connection and schema for the SQL node
//! store.
//!
//! # Architecture
//!
//! - **Single table**: every node is one row of `nodes`
//! - **Path uniqueness**: enforced by a UNIQUE index on `path_hash`, the
//!   SHA-256 hex digest of the path
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **JSON columns**: `ac` and `properties` are stored as JSON text
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** The 5-second
//! busy timeout lets concurrent operations wait for the lock instead of
//! failing immediately with `SQLITE_BUSY`.
//!
//! ```no_run
//! # use subnode_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/subnode.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::params::Params;
use libsql::{Builder, Database, Value};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

/// Column list shared by every SELECT against `nodes`.
pub(crate) const NODE_COLUMNS: &str = "id, path, ordinal, owner, node_type, content, name, tags, ac, properties, create_time, modify_time, max_child_ordinal";

/// Database service for managing libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database connection (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Row values for a node upsert (avoids too-many-arguments lint)
pub struct DbNodeRecord<'a> {
    pub id: &'a str,
    pub path: &'a str,
    pub ordinal: i64,
    pub owner: &'a str,
    pub node_type: &'a str,
    pub content: &'a str,
    pub name: Option<&'a str>,
    pub tags: Option<&'a str>,
    pub ac: Option<String>,
    pub properties: String,
    pub create_time: Option<String>,
    pub modify_time: Option<String>,
    pub max_child_ordinal: Option<i64>,
}

/// SHA-256 hex digest used as the unique key for a path.
pub fn path_hash(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;
        tracing::info!("Opened node database at {}", service.db_path.display());

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: safe to call on an existing database.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await
            .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                path_hash TEXT NOT NULL,
                ordinal INTEGER NOT NULL DEFAULT 0,
                owner TEXT NOT NULL,
                node_type TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                name TEXT,
                tags TEXT,
                ac TEXT,
                properties TEXT NOT NULL DEFAULT '{}',
                create_time TEXT,
                modify_time TEXT,
                max_child_ordinal INTEGER
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create nodes table: {}", e))
        })?;

        self.create_core_indexes(&conn).await?;

        // Flush schema to disk so a freshly created file is immediately usable
        // by other connections.
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Create core indexes for the nodes table
    async fn create_core_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let indexes = [
            ("idx_nodes_path_hash", "CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_path_hash ON nodes(path_hash)"),
            ("idx_nodes_path", "CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path)"),
            ("idx_nodes_name", "CREATE INDEX IF NOT EXISTS idx_nodes_name ON nodes(name)"),
            ("idx_nodes_ordinal", "CREATE INDEX IF NOT EXISTS idx_nodes_ordinal ON nodes(ordinal)"),
            ("idx_nodes_owner", "CREATE INDEX IF NOT EXISTS idx_nodes_owner ON nodes(owner)"),
            ("idx_nodes_create_time", "CREATE INDEX IF NOT EXISTS idx_nodes_create_time ON nodes(create_time)"),
            ("idx_nodes_modify_time", "CREATE INDEX IF NOT EXISTS idx_nodes_modify_time ON nodes(modify_time)"),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create index '{}': {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Get a raw connection. Prefer `connect_with_timeout()` in async code.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        Ok(conn)
    }

    //
    // NODE STORE OPERATIONS
    // Raw SQL wrapped by the NodeStore implementation in turso_store.rs.
    //

    /// Insert or replace the row with `record.id`.
    ///
    /// A conflict on `path_hash` means another row already holds the path and
    /// surfaces as `UniqueViolation`.
    pub async fn db_upsert_node(&self, record: DbNodeRecord<'_>) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let params = Params::Positional(vec![
            Value::Text(record.id.to_string()),
            Value::Text(record.path.to_string()),
            Value::Text(path_hash(record.path)),
            Value::Integer(record.ordinal),
            Value::Text(record.owner.to_string()),
            Value::Text(record.node_type.to_string()),
            Value::Text(record.content.to_string()),
            opt_text(record.name),
            opt_text(record.tags),
            opt_text(record.ac.as_deref()),
            Value::Text(record.properties),
            opt_text(record.create_time.as_deref()),
            opt_text(record.modify_time.as_deref()),
            record.max_child_ordinal.map_or(Value::Null, Value::Integer),
        ]);

        conn.execute(
            "INSERT INTO nodes (id, path, path_hash, ordinal, owner, node_type, content, name, tags, ac, properties, create_time, modify_time, max_child_ordinal)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                path_hash = excluded.path_hash,
                ordinal = excluded.ordinal,
                owner = excluded.owner,
                node_type = excluded.node_type,
                content = excluded.content,
                name = excluded.name,
                tags = excluded.tags,
                ac = excluded.ac,
                properties = excluded.properties,
                create_time = excluded.create_time,
                modify_time = excluded.modify_time,
                max_child_ordinal = excluded.max_child_ordinal",
            params,
        )
        .await
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint failed") {
                DatabaseError::unique_violation(record.path)
            } else {
                DatabaseError::sql_execution(format!("Failed to save node {}: {}", record.id, e))
            }
        })?;

        Ok(())
    }

    /// Delete rows by id inside a single transaction.
    pub async fn db_delete_nodes(&self, ids: &[String]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let conn = self.connect_with_timeout().await?;
        conn.execute("BEGIN TRANSACTION", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        let mut removed = 0u64;
        for id in ids {
            match conn.execute("DELETE FROM nodes WHERE id = ?", [id.as_str()]).await {
                Ok(count) => removed += count,
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", ()).await;
                    return Err(DatabaseError::sql_execution(format!(
                        "Failed to delete node {}: {}",
                        id, e
                    )));
                }
            }
        }

        conn.execute("COMMIT", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_hash_is_stable_hex() {
        let hash = path_hash("/r/usr");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, path_hash("/r/usr"));
        assert_ne!(hash, path_hash("/r/usr/"));
    }

    #[tokio::test]
    async fn test_open_non_database_file_fails_initialization() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("garbage.db");
        std::fs::write(&db_path, vec![0x5a_u8; 4096]).unwrap();

        let err = DatabaseService::new(db_path).await.err().unwrap();
        assert!(matches!(err, DatabaseError::InitializationFailed(_)), "{err}");
    }
}
