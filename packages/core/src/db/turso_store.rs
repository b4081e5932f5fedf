//! TursoStore - NodeStore Implementation for Turso/libsql Backend
//!
//! SQL has no anchored-regex operator, so queries are evaluated in two steps:
//!
//! 1. **Narrow in SQL**: exact path equality, or the byte range
//!    `[P + "/", P + "0")` for child and subgraph scopes (`'0'` is the byte
//!    after `'/'`), plus ordinal/type/name/owner/ACL/modify-time predicates
//!    and ORDER BY. All of these hit indexes.
//! 2. **Re-check in Rust**: every candidate row goes through the same
//!    [`QueryMatcher`](crate::db::QueryMatcher) the in-memory store uses,
//!    which applies the anchored path patterns and the remaining filters,
//!    then the limit is applied.
//!
//! # Examples
//!
//! ```rust,no_run
//! use subnode_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/subnode.db")).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!     let root = store.get_node_by_path("/r").await?;
//!     println!("root present: {}", root.is_some());
//!     Ok(())
//! }
//! ```

use crate::db::database::{DbNodeRecord, NODE_COLUMNS};
use crate::db::node_store::NodeStore;
use crate::db::query::{OrdinalFilter, PathScope, SortDirection};
use crate::db::{DatabaseError, DatabaseService, NodeQuery};
use crate::models::{Acl, Node};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::params::Params;
use libsql::{Row, Value};
use std::sync::Arc;

/// TursoStore implements NodeStore for the libsql backend
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    fn format_timestamp(ts: &DateTime<Utc>) -> String {
        // Fixed-width nanosecond form sorts lexicographically in time order.
        ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        Err(DatabaseError::invalid_record(format!(
            "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
            s
        )))
    }

    fn column_err(column: &str, e: libsql::Error) -> DatabaseError {
        DatabaseError::invalid_record(format!("Failed to get {}: {}", column, e))
    }

    /// Convert libsql::Row to Node model
    ///
    /// Expects the columns of `NODE_COLUMNS`, in order.
    fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
        let id: String = row.get(0).map_err(|e| Self::column_err("id", e))?;
        let path: String = row.get(1).map_err(|e| Self::column_err("path", e))?;
        let ordinal: i64 = row.get(2).map_err(|e| Self::column_err("ordinal", e))?;
        let owner: String = row.get(3).map_err(|e| Self::column_err("owner", e))?;
        let node_type: String = row.get(4).map_err(|e| Self::column_err("node_type", e))?;
        let content: String = row.get(5).map_err(|e| Self::column_err("content", e))?;
        let name: Option<String> = row.get(6).map_err(|e| Self::column_err("name", e))?;
        let tags: Option<String> = row.get(7).map_err(|e| Self::column_err("tags", e))?;
        let ac_json: Option<String> = row.get(8).map_err(|e| Self::column_err("ac", e))?;
        let properties_json: String = row.get(9).map_err(|e| Self::column_err("properties", e))?;
        let create_time: Option<String> =
            row.get(10).map_err(|e| Self::column_err("create_time", e))?;
        let modify_time: Option<String> =
            row.get(11).map_err(|e| Self::column_err("modify_time", e))?;
        let max_child_ordinal: Option<i64> =
            row.get(12).map_err(|e| Self::column_err("max_child_ordinal", e))?;

        let ac: Option<Acl> = match ac_json {
            Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
                DatabaseError::invalid_record(format!("Failed to parse ac JSON for {}: {}", id, e))
            })?),
            None => None,
        };
        let properties = serde_json::from_str(&properties_json).map_err(|e| {
            DatabaseError::invalid_record(format!("Failed to parse properties JSON for {}: {}", id, e))
        })?;

        Ok(Node {
            id: Some(id),
            path,
            ordinal: Some(ordinal),
            owner: Some(owner),
            node_type,
            content,
            name,
            tags,
            ac,
            properties,
            create_time: create_time.as_deref().map(Self::parse_timestamp).transpose()?,
            modify_time: modify_time.as_deref().map(Self::parse_timestamp).transpose()?,
            max_child_ordinal,
        })
    }

    /// Translate the index-friendly part of a query into SQL.
    fn build_select(query: &NodeQuery, select: &str) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        match &query.scope {
            PathScope::Any => {}
            PathScope::Exact(path) => {
                clauses.push("path = ?".to_string());
                params.push(Value::Text(path.clone()));
            }
            PathScope::DirectChildren(_) | PathScope::Subgraph(_) => {
                let base = match query.scope.base_path() {
                    Some("/") | None => "",
                    Some(base) => base,
                };
                clauses.push("path >= ? AND path < ?".to_string());
                params.push(Value::Text(format!("{}/", base)));
                params.push(Value::Text(format!("{}0", base)));
            }
        }

        if let Some(filter) = query.ordinal {
            let (op, value) = match filter {
                OrdinalFilter::Eq(v) => ("=", v),
                OrdinalFilter::Lt(v) => ("<", v),
                OrdinalFilter::Gt(v) => (">", v),
                OrdinalFilter::Gte(v) => (">=", v),
            };
            clauses.push(format!("ordinal {} ?", op));
            params.push(Value::Integer(value));
        }
        if let Some(node_type) = &query.node_type {
            clauses.push("node_type = ?".to_string());
            params.push(Value::Text(node_type.clone()));
        }
        if let Some(name) = &query.name {
            clauses.push("name = ?".to_string());
            params.push(Value::Text(name.clone()));
        }
        if let Some(owner) = &query.owner {
            clauses.push("owner = ?".to_string());
            params.push(Value::Text(owner.clone()));
        }
        if query.has_acl || !query.acl_principals.is_empty() {
            clauses.push("ac IS NOT NULL".to_string());
        }
        if query.published_only {
            clauses.push("modify_time IS NOT NULL".to_string());
        }

        let mut sql = format!("SELECT {} FROM nodes", select);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        if let Some(sort) = query.sort {
            let direction = match sort.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {} {}, path ASC", sort.field.column(), direction));
        } else {
            sql.push_str(" ORDER BY path ASC");
        }

        (sql, params)
    }

    async fn select_nodes(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Node>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;
        let mut rows = stmt
            .query(Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read row: {}", e)))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    /// Candidates from SQL, then the canonical predicate, then the limit.
    async fn query_candidates(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        let matcher = query.compile()?;
        let (sql, params) = Self::build_select(query, NODE_COLUMNS);
        let candidates = self.select_nodes(&sql, params).await?;

        let mut out: Vec<Node> = candidates.into_iter().filter(|n| matcher.matches(n)).collect();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn save_node(&self, node: &Node) -> Result<(), DatabaseError> {
        let id = node
            .id
            .as_deref()
            .ok_or_else(|| DatabaseError::invalid_record(format!("node at {} has no id", node.path)))?;
        let owner = node
            .owner
            .as_deref()
            .ok_or_else(|| DatabaseError::invalid_record(format!("node {} has no owner", id)))?;

        let ac = match &node.ac {
            Some(acl) => Some(serde_json::to_string(acl).map_err(|e| {
                DatabaseError::invalid_record(format!("Failed to serialize ac for {}: {}", id, e))
            })?),
            None => None,
        };
        let properties = serde_json::to_string(&node.properties).map_err(|e| {
            DatabaseError::invalid_record(format!("Failed to serialize properties for {}: {}", id, e))
        })?;

        self.db
            .db_upsert_node(DbNodeRecord {
                id,
                path: &node.path,
                ordinal: node.ordinal.unwrap_or(0),
                owner,
                node_type: &node.node_type,
                content: &node.content,
                name: node.name.as_deref(),
                tags: node.tags.as_deref(),
                ac,
                properties,
                create_time: node.create_time.as_ref().map(Self::format_timestamp),
                modify_time: node.modify_time.as_ref().map(Self::format_timestamp),
                max_child_ordinal: node.max_child_ordinal,
            })
            .await
    }

    async fn get_node_by_id(&self, id: &str) -> Result<Option<Node>, DatabaseError> {
        let sql = format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS);
        let nodes = self
            .select_nodes(&sql, vec![Value::Text(id.to_string())])
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn get_node_by_path(&self, path: &str) -> Result<Option<Node>, DatabaseError> {
        let sql = format!("SELECT {} FROM nodes WHERE path = ?", NODE_COLUMNS);
        let nodes = self
            .select_nodes(&sql, vec![Value::Text(path.to_string())])
            .await?;
        Ok(nodes.into_iter().next())
    }

    async fn path_exists(&self, path: &str) -> Result<bool, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare("SELECT 1 FROM nodes WHERE path_hash = ? LIMIT 1")
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;
        let mut rows = stmt
            .query([crate::db::database::path_hash(path)])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let found = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read row: {}", e)))?
            .is_some();
        Ok(found)
    }

    async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        self.query_candidates(query).await
    }

    async fn count_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError> {
        let mut unlimited = query.clone();
        unlimited.limit = None;
        unlimited.sort = None;
        Ok(self.query_candidates(&unlimited).await?.len() as u64)
    }

    async fn delete_node(&self, id: &str) -> Result<u64, DatabaseError> {
        self.db.db_delete_nodes(&[id.to_string()]).await
    }

    async fn delete_nodes(&self, query: &NodeQuery) -> Result<u64, DatabaseError> {
        let mut unlimited = query.clone();
        unlimited.sort = None;
        let ids: Vec<String> = self
            .query_candidates(&unlimited)
            .await?
            .into_iter()
            .filter_map(|n| n.id)
            .collect();
        self.db.db_delete_nodes(&ids).await
    }
}

#[cfg(test)]
#[path = "turso_store_test.rs"]
mod turso_store_test;
