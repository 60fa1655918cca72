//! First-start provisioning of the master project.

use crate::config::AdminConfig;
use crate::models::{Project, User, MASTER_PROJECT, PORTAL_CLIENT_ID};
use crate::utils::password::{hash_password, Password};

use super::database::{atomically, Database, Transaction};
use super::{ErrorKind, ServiceError};

async fn master_exists(tx: &mut Transaction) -> Result<bool, ServiceError> {
    match tx.project_get(MASTER_PROJECT).await {
        Ok(_) => Ok(true),
        Err(e) if e.is(ErrorKind::ProjectNotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create the master project, its administrator and the portal callbacks
/// when the master project does not exist yet. Returns whether anything
/// was created.
///
/// All three writes share one transaction: either master comes up complete
/// or it is not created at all.
pub async fn ensure_master(db: &Database, admin: &AdminConfig) -> Result<bool, ServiceError> {
    if atomically!(db, |tx| master_exists(&mut tx).await)? {
        tracing::debug!("Master project already present");
        return Ok(false);
    }

    let mut master = Project::new(MASTER_PROJECT);
    master.permit_delete = false;
    let master = db.prepare_project(master).await?;

    let user = User::new(
        MASTER_PROJECT,
        admin.name.as_str(),
        hash_password(&Password::new(admin.password.as_str())),
    )
    .with_system_roles(db.roles().all_ids());

    atomically!(db, |tx| {
        tx.project_add(master).await?;
        tx.user_add(user).await?;
        let mut portal = tx.client_get(MASTER_PROJECT, PORTAL_CLIENT_ID).await?;
        portal.allowed_callback_urls = admin.portal_callback_urls.clone();
        tx.client_update(portal).await
    })?;

    tracing::info!(project = MASTER_PROJECT, admin = %admin.name, "Master project created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdpConfig;
    use crate::db::MemoryBackend;
    use crate::services::MemoryAuditSink;
    use std::sync::Arc;

    fn database() -> Database {
        Database::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryAuditSink::new()))
    }

    #[tokio::test]
    async fn master_is_created_once() {
        let db = database();
        let admin = IdpConfig::default().admin;

        assert!(ensure_master(&db, &admin).await.unwrap());
        assert!(!ensure_master(&db, &admin).await.unwrap());

        let mut tx = db.begin().await.unwrap();
        assert!(!tx.project_get(MASTER_PROJECT).await.unwrap().permit_delete);
        let portal = tx.client_get(MASTER_PROJECT, PORTAL_CLIENT_ID).await.unwrap();
        assert_eq!(portal.allowed_callback_urls, admin.portal_callback_urls);
    }

    #[tokio::test]
    async fn failed_admin_leaves_no_master_behind() {
        let db = database();
        let mut admin = IdpConfig::default().admin;
        // Too short for a user name; rejected after the project row is written.
        admin.name = "ab".to_string();

        assert!(ensure_master(&db, &admin).await.is_err());

        let mut tx = db.begin().await.unwrap();
        let err = tx.project_get(MASTER_PROJECT).await.unwrap_err();
        assert!(err.is(ErrorKind::ProjectNotFound));
    }
}
