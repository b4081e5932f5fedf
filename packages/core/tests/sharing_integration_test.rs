//! Integration tests for sharing over the libsql backend
//!
//! Tests cover:
//! - Grant and revoke through AclService, and their effect on reads
//! - Mention sharing and ACL-to-user-name resolution
//! - ACL-user searches narrowed in SQL
//! - Reopening a bootstrapped database file

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use subnode_core::db::{DatabaseService, NodeQuery, TursoStore};
use subnode_core::models::{node_path, Node, PrivilegeSet, PUBLIC_PRINCIPAL};
use subnode_core::services::{AclService, CreateNodeParams, NodeService, NodeServiceError, Session};
use subnode_core::StoreConfig;
use tempfile::TempDir;

/// Test helper: open a service over the database file at `db_path`
async fn open_service(db_path: &Path) -> Result<Arc<NodeService>> {
    let db = Arc::new(DatabaseService::new(db_path.to_path_buf()).await?);
    let store = Arc::new(TursoStore::new(db));
    let service = NodeService::new(store, StoreConfig::default())?;
    service.bootstrap(&Session::admin(None)).await?;
    Ok(Arc::new(service))
}

struct TestEnv {
    service: Arc<NodeService>,
    acl: AclService,
    alice: Session,
    bob: Session,
    alice_account: Node,
    bob_account: Node,
    _temp_dir: TempDir,
}

/// Test helper: bootstrapped database with users alice, bob and carol
async fn create_test_env() -> Result<TestEnv> {
    let temp_dir = TempDir::new()?;
    let service = open_service(&temp_dir.path().join("test.db")).await?;
    let admin = service.admin_session().await?;

    let alice_account = service.create_user(&admin, "alice").await?;
    let bob_account = service.create_user(&admin, "bob").await?;
    service.create_user(&admin, "carol").await?;

    Ok(TestEnv {
        acl: AclService::new(service.clone()),
        alice: service.session_for_user("alice").await?,
        bob: service.session_for_user("bob").await?,
        service,
        alice_account,
        bob_account,
        _temp_dir: temp_dir,
    })
}

async fn create_post(env: &mut TestEnv, rel_path: &str, content: &str) -> Result<Node> {
    let params = CreateNodeParams {
        rel_path: Some(rel_path.to_string()),
        content: content.to_string(),
        ..Default::default()
    };
    let mut node = env
        .service
        .create_node(&env.alice, Some(&mut env.alice_account), params)
        .await?;
    env.service.save(&env.alice, &mut node).await?;
    Ok(node)
}

// =========================================================================
// Grant / Revoke
// =========================================================================

#[tokio::test]
async fn test_grant_then_revoke_controls_reads() -> Result<()> {
    let mut env = create_test_env().await?;
    let mut post = create_post(&mut env, "post", "for bob").await?;

    let err = env.service.get_node_by_path(&env.bob, &post.path, true).await.unwrap_err();
    assert!(err.is_unauthorized());

    assert!(env.acl.grant(&env.alice, &mut post, "bob", &PrivilegeSet::read()).await?);
    // Granting again changes nothing
    assert!(!env.acl.grant(&env.alice, &mut post, "bob", &PrivilegeSet::read()).await?);

    let seen = env.service.get_node_by_path(&env.bob, &post.path, true).await?;
    assert_eq!(seen.map(|n| n.id), Some(post.id.clone()));

    let bob_id = env.bob_account.id.clone().unwrap();
    assert!(env.acl.revoke(&env.alice, &mut post, &bob_id, &PrivilegeSet::read()).await?);
    assert!(post.ac.is_none());

    let stored = env.service.store().get_node_by_path(&post.path).await?.unwrap();
    assert!(stored.ac.is_none());

    let err = env.service.get_node_by_path(&env.bob, &post.path, true).await.unwrap_err();
    assert!(err.is_unauthorized());
    Ok(())
}

#[tokio::test]
async fn test_grant_requires_owner_and_known_user() -> Result<()> {
    let mut env = create_test_env().await?;
    let mut post = create_post(&mut env, "post", "").await?;

    let err = env
        .acl
        .grant(&env.bob, &mut post, "bob", &PrivilegeSet::read())
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());

    let err = env
        .acl
        .grant(&env.alice, &mut post, "nobody", &PrivilegeSet::read())
        .await
        .unwrap_err();
    assert!(matches!(err, NodeServiceError::NotFound(_)));

    // Sharing with yourself is a no-op
    assert!(!env.acl.grant(&env.alice, &mut post, "alice", &PrivilegeSet::read()).await?);
    assert!(post.ac.is_none());
    Ok(())
}

#[tokio::test]
async fn test_public_grant_opens_subtree_to_anonymous() -> Result<()> {
    let mut env = create_test_env().await?;
    let mut blog = create_post(&mut env, "blog", "").await?;

    let params = CreateNodeParams {
        rel_path: Some("entry".to_string()),
        ..Default::default()
    };
    let mut entry = env.service.create_node(&env.alice, Some(&mut blog), params).await?;
    env.service.save(&env.alice, &mut entry).await?;

    let anonymous = Session::anonymous();
    assert!(env.service.get_node(&anonymous, &entry.path, true).await.is_err());

    env.acl
        .grant(&env.alice, &mut blog, PUBLIC_PRINCIPAL, &PrivilegeSet::read())
        .await?;
    assert!(AclService::is_public(&blog));
    // The earlier session cached the pre-grant ancestor; a new request sees the grant
    let anonymous = Session::anonymous();
    assert!(env.service.get_node(&anonymous, &entry.path, true).await?.is_some());
    Ok(())
}

// =========================================================================
// Mentions and shared-with lookups
// =========================================================================

#[tokio::test]
async fn test_share_to_mentions() -> Result<()> {
    let mut env = create_test_env().await?;
    let mut post = create_post(&mut env, "post", "hey @bob, @carol and @ghost. cc @dave@remote.example").await?;

    let shared = env.acl.share_to_mentions(&env.alice, &mut post).await?;
    let expected: BTreeSet<String> = ["bob", "carol"].into_iter().map(String::from).collect();
    assert_eq!(shared, expected);

    let mut names = env.acl.users_shared_to(&post).await?;
    names.sort();
    assert_eq!(names, vec!["bob", "carol"]);

    // Bob now holds write and can edit through a deferred save
    let mut edited = env
        .service
        .get_node_by_path(&env.bob, &post.path, true)
        .await?
        .unwrap();
    edited.content = "edited by bob".to_string();
    env.service.update(&env.bob, &mut edited).await;
    assert_eq!(env.service.flush(&env.bob).await?, 1);

    let stored = env.service.store().get_node_by_path(&post.path).await?.unwrap();
    assert_eq!(stored.content, "edited by bob");
    assert_eq!(stored.owner, env.alice_account.id);
    Ok(())
}

#[tokio::test]
async fn test_acl_user_search_over_sql() -> Result<()> {
    let mut env = create_test_env().await?;
    let mut shared = create_post(&mut env, "shared", "").await?;
    create_post(&mut env, "private", "").await?;
    env.acl.grant(&env.alice, &mut shared, "bob", &PrivilegeSet::read_write()).await?;

    let bob_id = env.bob_account.id.clone().unwrap();
    let principals = vec![bob_id, PUBLIC_PRINCIPAL.to_string()];
    let found = env
        .service
        .search_subgraph_by_acl_user(&env.bob, None, &principals, None, None, None)
        .await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, shared.path);

    let count = env
        .service
        .count_subgraph_by_acl_user(&env.bob, None, &principals, env.bob_account.id.as_deref())
        .await?;
    assert_eq!(count, 0);
    Ok(())
}

// =========================================================================
// Persistence
// =========================================================================

#[tokio::test]
async fn test_reopen_keeps_accounts_and_tree() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("reopen.db");

    let account_path = {
        let service = open_service(&db_path).await?;
        let admin = service.admin_session().await?;
        let account = service.create_user(&admin, "alice").await?;
        let alice = service.session_for_user("alice").await?;
        service
            .ensure_node_exists(&alice, &account.path, "notes/2026", None)
            .await?;
        account.path
    };

    let service = open_service(&db_path).await?;
    let alice = service.session_for_user("alice").await?;
    let notes = service
        .get_node(&alice, &format!("{}/notes/2026", account_path), true)
        .await?;
    assert!(notes.is_some());

    let store = service.store();
    assert_eq!(store.count_nodes(&NodeQuery::all()).await?, 6);
    assert!(store.path_exists(node_path::PUBLIC_ROOT_PATH).await?);
    Ok(())
}
