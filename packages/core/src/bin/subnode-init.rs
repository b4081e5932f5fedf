//! Store Bootstrap Binary
//!
//! Creates the system nodes (`/r`, `/r/usr`, `/r/public`) in a node store,
//! optionally creates user accounts, and prints a node report.
//!
//! # Usage
//!
//! ```bash
//! # Bootstrap the database named by SUBNODE_DB_PATH
//! SUBNODE_DB_PATH=./data/subnode.db cargo run --bin subnode-init
//!
//! # Bootstrap and create two users
//! SUBNODE_DB_PATH=./data/subnode.db cargo run --bin subnode-init -- alice bob
//! ```
//!
//! # Environment Variables
//!
//! - `SUBNODE_DB_PATH`: libsql database file (unset: in-memory store)
//! - `SUBNODE_PLACEHOLDER_LEN`, `SUBNODE_MAX_PATH_ATTEMPTS`,
//!   `SUBNODE_MAX_CONTENT_LEN`: see `StoreConfig`
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::sync::Arc;

use subnode_core::db::{DatabaseService, MemoryStore, NodeStore, TursoStore};
use subnode_core::{NodeService, Session, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = StoreConfig::from_env().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let store: Arc<dyn NodeStore> = match &config.database_path {
        Some(db_path) => {
            tracing::info!("Database: {}", db_path.display());
            let db = DatabaseService::new(db_path.clone()).await?;
            Arc::new(TursoStore::new(Arc::new(db)))
        }
        None => {
            tracing::warn!("SUBNODE_DB_PATH not set, using an in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let service = NodeService::new(store, config)?;
    service.bootstrap(&Session::admin(None)).await?;
    let admin = service.admin_session().await?;

    for user_name in env::args().skip(1) {
        match service.get_user_node_by_user_name(&user_name).await? {
            Some(account) => tracing::info!("User {} already exists at {}", user_name, account.path),
            None => {
                service.create_user(&admin, &user_name).await?;
            }
        }
    }

    let report = service.node_report(&admin).await?;
    println!("nodes: {}", report.total_nodes);
    println!("accounts: {}", report.accounts);

    Ok(())
}
