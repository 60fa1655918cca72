//! Persistence facade integration tests: cascades, guards, key rotation
//! and expiry.

mod common;

use chrono::{Duration, Utc};
use common::{TestIdp, ADMIN_NAME, ADMIN_PASSWORD};
use idp_service::{
    db::MemoryBackend,
    models::{AccessType, Client, CustomRole, Project, Session, User, MASTER_PROJECT},
    services::{jwt, Database, ErrorKind, MemoryAuditSink, Reaper, RoleKind, ServiceError},
    utils::{hash_password, Password},
};
use std::sync::Arc;

async fn tenant(idp: &TestIdp, name: &str) -> anyhow::Result<User> {
    idp.db.project_add(Project::new(name)).await?;
    let user = User::new(name, "alice", hash_password(&Password::new("alice-password")))
        .with_system_roles(vec!["read-user".to_string()]);
    let mut tx = idp.db.begin().await?;
    tx.user_add(user.clone()).await?;
    tx.client_add(Client::new("webapp", name, AccessType::Public, "", vec!["https://app.example/cb".to_string()]))
        .await?;
    tx.session_add(Session::new(name, &user.id, 3600, vec![user.id.clone()])).await?;
    tx.settle(Ok(())).await?;
    Ok(user)
}

// ============================================================================
// Projects
// ============================================================================

#[tokio::test]
async fn master_cannot_be_deleted() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;

    let err = idp.db.project_delete(MASTER_PROJECT).await.unwrap_err();
    assert_eq!(err, ErrorKind::DeleteBlocked);

    let mut tx = idp.db.begin().await?;
    assert_eq!(tx.user_list(MASTER_PROJECT, Some(ADMIN_NAME)).await?.len(), 1);
    assert!(!tx.client_list(MASTER_PROJECT).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn project_delete_cascades_to_children() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let user = tenant(&idp, "tenant-a").await?;

    idp.db.project_delete("tenant-a").await?;

    let mut tx = idp.db.begin().await?;
    assert_eq!(tx.project_get("tenant-a").await.unwrap_err(), ErrorKind::ProjectNotFound);
    assert!(tx.user_list("tenant-a", None).await?.is_empty());
    assert!(tx.client_list("tenant-a").await?.is_empty());
    assert!(tx.session_list_by_user("tenant-a", &user.id).await?.is_empty());
    // Other tenants are untouched.
    assert_eq!(tx.user_list(MASTER_PROJECT, None).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn secret_reset_invalidates_existing_tokens() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let res = idp.password_grant(ADMIN_NAME, ADMIN_PASSWORD).await?;
    let issuer = idp.issuer(MASTER_PROJECT);

    {
        let mut tx = idp.db.begin().await?;
        jwt::validate_access_token(&mut tx, &res.access_token, &issuer).await?;
    }

    idp.db.project_secret_reset(MASTER_PROJECT).await?;

    let mut tx = idp.db.begin().await?;
    let err = jwt::validate_access_token(&mut tx, &res.access_token, &issuer)
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::InvalidToken);
    Ok(())
}

#[tokio::test]
async fn mutations_are_audited() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let _ = idp.db.project_delete(MASTER_PROJECT).await;

    // The sink is fed from spawned tasks.
    let mut entries = Vec::new();
    for _ in 0..50 {
        entries = idp.audit.entries();
        if entries.iter().any(|e| e.method == "DELETE") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let delete = entries
        .iter()
        .find(|e| e.resource == "PROJECT" && e.method == "DELETE")
        .expect("delete was audited");
    assert!(!delete.success);
    assert!(entries.iter().any(|e| e.resource == "PROJECT" && e.method == "POST" && e.success));
    Ok(())
}

async fn audit_entry_for(idp: &TestIdp, path: &str) -> Option<idp_service::services::AuditEntry> {
    for _ in 0..50 {
        if let Some(entry) = idp.audit.entries().into_iter().find(|e| e.path == path) {
            return Some(entry);
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn rolled_back_writes_are_audited_as_failures() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;

    let mut tx = idp.db.begin().await?;
    tx.project_add(Project::new("ghost-tenant")).await?;
    let aborted: Result<(), ServiceError> = tx.settle(Err(ServiceError::validation("abort"))).await;
    assert!(aborted.is_err());

    let mut tx = idp.db.begin().await?;
    assert_eq!(tx.project_get("ghost-tenant").await.unwrap_err(), ErrorKind::ProjectNotFound);
    drop(tx);

    let entry = audit_entry_for(&idp, "ghost-tenant").await.expect("rolled back write was audited");
    assert_eq!((entry.resource, entry.method), ("PROJECT", "POST"));
    assert!(!entry.success);
    assert!(entry.message.contains("abort"));
    Ok(())
}

#[tokio::test]
async fn abandoned_transactions_are_audited_as_failures() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;

    let mut tx = idp.db.begin().await?;
    tx.project_add(Project::new("dropped-tenant")).await?;
    drop(tx);

    let entry = audit_entry_for(&idp, "dropped-tenant").await.expect("abandoned write was audited");
    assert!(!entry.success);
    Ok(())
}

#[tokio::test]
async fn committed_writes_are_audited_after_commit() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;

    let mut tx = idp.db.begin().await?;
    tx.project_add(Project::new("kept-tenant")).await?;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert!(idp.audit.entries().iter().all(|e| e.path != "kept-tenant"));
    tx.settle(Ok(())).await?;

    let entry = audit_entry_for(&idp, "kept-tenant").await.expect("committed write was audited");
    assert!(entry.success);
    Ok(())
}

// ============================================================================
// Users and roles
// ============================================================================

#[tokio::test]
async fn duplicate_user_names_are_rejected() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let dup = User::new(MASTER_PROJECT, ADMIN_NAME, hash_password(&Password::new("x")));

    let mut tx = idp.db.begin().await?;
    let err = tx.user_add(dup).await.unwrap_err();
    assert_eq!(err, ErrorKind::AlreadyExists);
    Ok(())
}

#[tokio::test]
async fn role_guards_keep_read_with_write() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let user = tenant(&idp, "tenant-a").await?;
    let mut tx = idp.db.begin().await?;

    tx.user_add_role("tenant-a", &user.id, RoleKind::System, "write-user").await?;
    let err = tx
        .user_add_role("tenant-a", &user.id, RoleKind::System, "write-user")
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::AlreadyExists);

    let err = tx
        .user_delete_role("tenant-a", &user.id, RoleKind::System, "read-user")
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::ValidationFailed);

    // Cluster roles only exist in the master project.
    let err = tx
        .user_add_role("tenant-a", &user.id, RoleKind::System, "read-cluster")
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::ValidationFailed);

    tx.user_delete_role("tenant-a", &user.id, RoleKind::System, "write-user").await?;
    tx.user_delete_role("tenant-a", &user.id, RoleKind::System, "read-user").await?;
    assert!(tx.user_get("tenant-a", &user.id).await?.system_roles.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_a_custom_role_strips_it_from_users() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let user = tenant(&idp, "tenant-a").await?;
    let role = CustomRole::new("auditor", "tenant-a");

    let mut tx = idp.db.begin().await?;
    tx.custom_role_add(role.clone()).await?;
    tx.user_add_role("tenant-a", &user.id, RoleKind::Custom, &role.id).await?;
    assert_eq!(tx.user_get("tenant-a", &user.id).await?.custom_roles, vec![role.id.clone()]);

    tx.custom_role_delete("tenant-a", &role.id).await?;
    assert!(tx.user_get("tenant-a", &user.id).await?.custom_roles.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_a_user_drops_their_sessions() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let user = tenant(&idp, "tenant-a").await?;

    let mut tx = idp.db.begin().await?;
    tx.user_delete("tenant-a", &user.id).await?;
    assert!(tx.session_list_by_user("tenant-a", &user.id).await?.is_empty());
    Ok(())
}

// ============================================================================
// Expiry
// ============================================================================

#[tokio::test]
async fn sweep_removes_only_expired_rows() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let user = tenant(&idp, "tenant-a").await?;

    let mut stale = Session::new("tenant-a", &user.id, 60, vec![]);
    stale.created_at = Utc::now() - Duration::seconds(120);
    let stale_id = stale.session_id.clone();
    let mut tx = idp.db.begin().await?;
    tx.session_add(stale).await?;
    tx.settle(Ok(())).await?;

    let reaper = Reaper::new(idp.db.clone(), std::time::Duration::from_secs(3600));
    let report = reaper.sweep_once().await?;
    assert_eq!(report.sessions, 1);

    let mut tx = idp.db.begin().await?;
    assert_eq!(tx.session_get("tenant-a", &stale_id).await.unwrap_err(), ErrorKind::NotFound);
    assert_eq!(tx.session_list_by_user("tenant-a", &user.id).await?.len(), 1);
    drop(tx);

    assert_eq!(reaper.sweep_once().await?.total(), 0);
    Ok(())
}

// ============================================================================
// Storage deadlines
// ============================================================================

#[tokio::test]
async fn call_timeout_bounds_waiting_for_the_store() -> anyhow::Result<()> {
    let backend = MemoryBackend::new().with_call_timeout(Some(std::time::Duration::from_millis(20)));
    let db = Database::new(Arc::new(backend), Arc::new(MemoryAuditSink::new()));

    let held = db.begin().await?;
    let err = db.begin().await.err().expect("second begin waits past the deadline");
    assert_eq!(err, ErrorKind::ServerError);
    drop(held);

    db.begin().await?;
    Ok(())
}
