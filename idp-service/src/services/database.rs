//! Persistence facade.
//!
//! [`Database`] is the only way into tenant state. Work happens inside a
//! [`Transaction`] obtained from [`Database::begin`]; the `atomically!` macro
//! wraps a block so it commits on `Ok` and rolls back on `Err`. All entity
//! rules (shape checks, uniqueness, cascades, role guards) live here, never
//! in the storage handlers.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{bounded, StorageBackend, StoreTx};
use crate::models::{Client, CustomRole, Device, LoginSession, Project, Session, User};

use super::audit::{record_async, AuditEntry, AuditSink};
use super::jwt::generate_rs256_key_pair;
use super::role::RoleCatalog;
use super::{ErrorKind, ResultExt, ServiceError};

/// Run `$body` inside a fresh transaction of `$db`, binding it to `$tx`.
/// Commits when the body yields `Ok`, rolls back otherwise.
macro_rules! atomically {
    ($db:expr, |$tx:ident| $body:expr) => {{
        let mut $tx = $db.begin().await?;
        let result: ::std::result::Result<_, $crate::services::ServiceError> = async { $body }.await;
        $tx.settle(result).await
    }};
}
pub(crate) use atomically;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    System,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub login_sessions: usize,
    pub sessions: usize,
    pub devices: usize,
}

impl PurgeReport {
    pub fn total(&self) -> usize {
        self.login_sessions + self.sessions + self.devices
    }
}

#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn StorageBackend>,
    roles: Arc<RoleCatalog>,
    audit: Arc<dyn AuditSink>,
}

impl Database {
    pub fn new(backend: Arc<dyn StorageBackend>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            backend,
            roles: Arc::new(RoleCatalog::new()),
            audit,
        }
    }

    pub fn roles(&self) -> &RoleCatalog {
        &self.roles
    }

    pub async fn begin(&self) -> Result<Transaction, ServiceError> {
        let timeout = self.backend.call_timeout();
        let inner = bounded(timeout, self.backend.begin()).await.note("begin transaction")?;
        Ok(Transaction {
            inner,
            timeout,
            roles: Arc::clone(&self.roles),
            audit: Arc::clone(&self.audit),
            pending: Vec::new(),
        })
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        bounded(self.backend.call_timeout(), self.backend.ping()).await
    }

    /// Validate a new project and give it a fresh key pair, ready for
    /// [`Transaction::project_add`]. Key generation runs off the runtime and
    /// outside any transaction.
    pub async fn prepare_project(&self, mut project: Project) -> Result<Project, ServiceError> {
        project.validate()?;

        let (secret, public) = spawn_keygen().await?;
        project.token_config.sign_secret_key = secret;
        project.token_config.sign_public_key = public;
        Ok(project)
    }

    /// Create a project with a fresh key pair and its portal client.
    pub async fn project_add(&self, project: Project) -> Result<Project, ServiceError> {
        let project = self.prepare_project(project).await?;
        atomically!(self, |tx| {
            tx.project_add(project.clone()).await?;
            Ok(project)
        })
    }

    /// Replace a project's key pair. Tokens signed with the old key stop
    /// validating as soon as this commits.
    pub async fn project_secret_reset(&self, name: &str) -> Result<(), ServiceError> {
        let (secret, public) = spawn_keygen().await?;
        let result = atomically!(self, |tx| {
            let mut project = tx.project_get(name).await?;
            project.token_config.sign_secret_key = secret;
            project.token_config.sign_public_key = public;
            tx.store_project(project).await
        });
        tracing::info!(project = %name, ok = result.is_ok(), "Project signing key reset");
        self.record(AuditEntry::new(name, "PROJECT", "RESET_SECRET", name), &result);
        result
    }

    pub async fn project_delete(&self, name: &str) -> Result<(), ServiceError> {
        atomically!(self, |tx| tx.project_delete(name).await)
    }

    /// Purge expired login sessions, sessions and devices in one transaction.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, ServiceError> {
        atomically!(self, |tx| tx.delete_expired(now).await)
    }

    fn record<T>(&self, entry: AuditEntry, result: &Result<T, ServiceError>) {
        record_async(&self.audit, entry.outcome(result));
    }
}

async fn spawn_keygen() -> Result<(Vec<u8>, Vec<u8>), ServiceError> {
    tokio::task::spawn_blocking(generate_rs256_key_pair)
        .await
        .map_err(ServiceError::internal)?
}

/// An open storage transaction plus the entity rules.
///
/// Dropping it without [`settle`](Transaction::settle) discards its writes.
/// Audit entries are held until the transaction settles, so a write that is
/// rolled back is never reported as a success.
pub struct Transaction {
    inner: Box<dyn StoreTx>,
    timeout: Option<Duration>,
    roles: Arc<RoleCatalog>,
    audit: Arc<dyn AuditSink>,
    pending: Vec<AuditEntry>,
}

impl Transaction {
    /// Commit on `Ok`, roll back on `Err`, and hand the result back.
    pub async fn settle<T>(mut self, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        let t = self.timeout;
        match result {
            Ok(value) => match bounded(t, self.inner.commit()).await.note("commit") {
                Ok(()) => {
                    self.flush_audit(None);
                    Ok(value)
                }
                Err(err) => {
                    self.flush_audit(Some(&err));
                    Err(err)
                }
            },
            Err(err) => {
                if let Err(rollback_err) = bounded(t, self.inner.rollback()).await {
                    tracing::error!(error = %rollback_err.describe(), "Rollback failed");
                }
                self.flush_audit(Some(&err));
                Err(err)
            }
        }
    }

    fn audited<T>(&mut self, entry: AuditEntry, result: Result<T, ServiceError>) -> Result<T, ServiceError> {
        self.pending.push(entry.outcome(&result));
        result
    }

    /// Hand buffered entries to the sink; `abort` marks them rolled back.
    fn flush_audit(&mut self, abort: Option<&ServiceError>) {
        for entry in std::mem::take(&mut self.pending) {
            let entry = match abort {
                Some(err) => entry.rolled_back(err.public_message()),
                None => entry,
            };
            record_async(&self.audit, entry);
        }
    }

    async fn require_project(&mut self, name: &str) -> Result<(), ServiceError> {
        self.project_get(name).await.map(|_| ())
    }

    // ==================== Projects ====================

    pub async fn project_add(&mut self, project: Project) -> Result<(), ServiceError> {
        let name = project.name.clone();
        let result = self.project_add_inner(project).await;
        self.audited(AuditEntry::new(&name, "PROJECT", "POST", &name), result)
    }

    async fn project_add_inner(&mut self, project: Project) -> Result<(), ServiceError> {
        project.validate()?;
        let t = self.timeout;
        if bounded(t, self.inner.projects().get(&project.name)).await?.is_some() {
            return Err(ServiceError::already_exists("Project already exists"));
        }
        let portal = Client::portal(&project.name);
        bounded(t, self.inner.projects().add(project)).await?;
        bounded(t, self.inner.clients().add(portal)).await
    }

    pub async fn project_get(&mut self, name: &str) -> Result<Project, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.projects().get(name))
            .await?
            .ok_or_else(|| {
                ServiceError::new(ErrorKind::ProjectNotFound, "Project not found")
                    .note(format!("project {}", name))
            })
    }

    pub async fn project_list(&mut self) -> Result<Vec<Project>, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.projects().list()).await
    }

    /// Replace a project's settings. The name and creation time are fixed;
    /// empty keys keep the stored pair.
    pub async fn project_update(&mut self, project: Project) -> Result<(), ServiceError> {
        let name = project.name.clone();
        let result = self.project_update_inner(project).await;
        self.audited(AuditEntry::new(&name, "PROJECT", "PUT", &name), result)
    }

    async fn project_update_inner(&mut self, mut project: Project) -> Result<(), ServiceError> {
        project.validate()?;
        let current = self.project_get(&project.name).await?;
        project.created_at = current.created_at;
        if project.token_config.sign_secret_key.is_empty()
            || project.token_config.sign_public_key.is_empty()
        {
            project.token_config.sign_secret_key = current.token_config.sign_secret_key;
            project.token_config.sign_public_key = current.token_config.sign_public_key;
        }
        self.store_project(project).await
    }

    async fn store_project(&mut self, project: Project) -> Result<(), ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.projects().update(project)).await
    }

    pub async fn project_delete(&mut self, name: &str) -> Result<(), ServiceError> {
        let result = self.project_delete_inner(name).await;
        self.audited(AuditEntry::new(name, "PROJECT", "DELETE", name), result)
    }

    async fn project_delete_inner(&mut self, name: &str) -> Result<(), ServiceError> {
        let project = self.project_get(name).await?;
        if !project.permit_delete {
            return Err(ServiceError::new(
                ErrorKind::DeleteBlocked,
                format!("Project {} can not be deleted", name),
            ));
        }

        let t = self.timeout;
        bounded(t, self.inner.login_sessions().delete_all(name)).await.note("purge login sessions")?;
        bounded(t, self.inner.sessions().delete_all(name)).await.note("purge sessions")?;
        bounded(t, self.inner.custom_roles().delete_all(name)).await.note("purge custom roles")?;
        bounded(t, self.inner.clients().delete_all(name)).await.note("purge clients")?;
        bounded(t, self.inner.users().delete_all(name)).await.note("purge users")?;
        bounded(t, self.inner.devices().delete_all(name)).await.note("purge devices")?;
        bounded(t, self.inner.projects().delete(name)).await
    }

    // ==================== Clients ====================

    pub async fn client_add(&mut self, client: Client) -> Result<(), ServiceError> {
        let entry = AuditEntry::new(&client.project_name, "CLIENT", "POST", &client.id);
        let result = self.client_add_inner(client).await;
        self.audited(entry, result)
    }

    async fn client_add_inner(&mut self, client: Client) -> Result<(), ServiceError> {
        self.require_project(&client.project_name).await?;
        client.validate()?;
        let t = self.timeout;
        if bounded(t, self.inner.clients().get(&client.project_name, &client.id))
            .await?
            .is_some()
        {
            return Err(ServiceError::already_exists("Client already exists"));
        }
        bounded(t, self.inner.clients().add(client)).await
    }

    pub async fn client_get(&mut self, project: &str, id: &str) -> Result<Client, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.clients().get(project, id))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such client").note(format!("client {}", id)))
    }

    pub async fn client_list(&mut self, project: &str) -> Result<Vec<Client>, ServiceError> {
        self.require_project(project).await?;
        let t = self.timeout;
        bounded(t, self.inner.clients().list(project)).await
    }

    pub async fn client_update(&mut self, client: Client) -> Result<(), ServiceError> {
        let entry = AuditEntry::new(&client.project_name, "CLIENT", "PUT", &client.id);
        let result = async {
            client.validate()?;
            let t = self.timeout;
            bounded(t, self.inner.clients().update(client)).await
        }
        .await;
        self.audited(entry, result)
    }

    pub async fn client_delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        let result = bounded(t, self.inner.clients().delete(project, id)).await;
        self.audited(AuditEntry::new(project, "CLIENT", "DELETE", id), result)
    }

    // ==================== Users ====================

    async fn check_user_rules(&mut self, user: &User) -> Result<(), ServiceError> {
        user.validate()?;
        self.roles.validate_set(&user.project_name, &user.system_roles)?;

        let t = self.timeout;
        for role_id in &user.custom_roles {
            if bounded(t, self.inner.custom_roles().get(&user.project_name, role_id))
                .await?
                .is_none()
            {
                return Err(ServiceError::validation(format!(
                    "Custom role {} does not exist",
                    role_id
                )));
            }
        }

        let same_name = bounded(t, self.inner.users().list(&user.project_name, Some(&user.name))).await?;
        if same_name.iter().any(|u| u.id != user.id) {
            return Err(ServiceError::already_exists("User name is already used"));
        }
        Ok(())
    }

    pub async fn user_add(&mut self, user: User) -> Result<(), ServiceError> {
        let entry = AuditEntry::new(&user.project_name, "USER", "POST", &user.id);
        let result = async {
            self.require_project(&user.project_name).await?;
            self.check_user_rules(&user).await?;
            let t = self.timeout;
            bounded(t, self.inner.users().add(user)).await
        }
        .await;
        self.audited(entry, result)
    }

    pub async fn user_get(&mut self, project: &str, id: &str) -> Result<User, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.users().get(project, id))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such user").note(format!("user {}", id)))
    }

    /// Users of `project`, optionally filtered to an exact name.
    pub async fn user_list(&mut self, project: &str, name: Option<&str>) -> Result<Vec<User>, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.users().list(project, name)).await
    }

    pub async fn user_update(&mut self, user: User) -> Result<(), ServiceError> {
        let entry = AuditEntry::new(&user.project_name, "USER", "PUT", &user.id);
        let result = async {
            self.check_user_rules(&user).await?;
            let t = self.timeout;
            bounded(t, self.inner.users().update(user)).await
        }
        .await;
        self.audited(entry, result)
    }

    /// Delete a user together with its login sessions and sessions.
    pub async fn user_delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        let result = async {
            bounded(t, self.inner.login_sessions().delete_all_by_user(project, id)).await?;
            bounded(t, self.inner.sessions().delete_all_by_user(project, id)).await?;
            bounded(t, self.inner.users().delete(project, id)).await
        }
        .await;
        self.audited(AuditEntry::new(project, "USER", "DELETE", id), result)
    }

    pub async fn user_add_role(
        &mut self,
        project: &str,
        user_id: &str,
        kind: RoleKind,
        role_id: &str,
    ) -> Result<(), ServiceError> {
        let result = async {
            let mut user = self.user_get(project, user_id).await?;
            match kind {
                RoleKind::System => {
                    self.roles.check_grant(project, &user.system_roles, role_id)?;
                    user.system_roles.push(role_id.to_string());
                }
                RoleKind::Custom => {
                    self.custom_role_get(project, role_id).await?;
                    if user.custom_roles.iter().any(|r| r == role_id) {
                        return Err(ServiceError::already_exists("Role is already assigned"));
                    }
                    user.custom_roles.push(role_id.to_string());
                }
            }
            let t = self.timeout;
            bounded(t, self.inner.users().update(user)).await
        }
        .await;
        self.audited(AuditEntry::new(project, "ROLE", "POST", format!("{}/{}", user_id, role_id)), result)
    }

    pub async fn user_delete_role(
        &mut self,
        project: &str,
        user_id: &str,
        kind: RoleKind,
        role_id: &str,
    ) -> Result<(), ServiceError> {
        let result = async {
            let mut user = self.user_get(project, user_id).await?;
            match kind {
                RoleKind::System => {
                    self.roles.check_revoke(&user.system_roles, role_id)?;
                    user.system_roles.retain(|r| r != role_id);
                }
                RoleKind::Custom => {
                    if !user.custom_roles.iter().any(|r| r == role_id) {
                        return Err(ServiceError::not_found("Role is not assigned"));
                    }
                    user.custom_roles.retain(|r| r != role_id);
                }
            }
            let t = self.timeout;
            bounded(t, self.inner.users().update(user)).await
        }
        .await;
        self.audited(AuditEntry::new(project, "ROLE", "DELETE", format!("{}/{}", user_id, role_id)), result)
    }

    /// Persist a user's lock state and password digest without re-running
    /// the role and uniqueness checks.
    pub async fn user_store_credentials(&mut self, user: &User) -> Result<(), ServiceError> {
        let mut stored = self.user_get(&user.project_name, &user.id).await?;
        stored.lock_state = user.lock_state.clone();
        stored.password_hash = user.password_hash.clone();
        let t = self.timeout;
        bounded(t, self.inner.users().update(stored)).await
    }

    // ==================== Custom roles ====================

    pub async fn custom_role_add(&mut self, role: CustomRole) -> Result<(), ServiceError> {
        let entry = AuditEntry::new(&role.project_name, "CUSTOMROLE", "POST", &role.id);
        let result = async {
            self.require_project(&role.project_name).await?;
            role.validate()?;
            let t = self.timeout;
            let same_name = bounded(t, self.inner.custom_roles().list(&role.project_name, Some(&role.name))).await?;
            if !same_name.is_empty() {
                return Err(ServiceError::already_exists("Custom role already exists"));
            }
            bounded(t, self.inner.custom_roles().add(role)).await
        }
        .await;
        self.audited(entry, result)
    }

    pub async fn custom_role_get(&mut self, project: &str, id: &str) -> Result<CustomRole, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.custom_roles().get(project, id))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such custom role").note(format!("role {}", id)))
    }

    pub async fn custom_role_list(&mut self, project: &str, name: Option<&str>) -> Result<Vec<CustomRole>, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.custom_roles().list(project, name)).await
    }

    pub async fn custom_role_update(&mut self, role: CustomRole) -> Result<(), ServiceError> {
        let entry = AuditEntry::new(&role.project_name, "CUSTOMROLE", "PUT", &role.id);
        let result = async {
            role.validate()?;
            let t = self.timeout;
            let same_name = bounded(t, self.inner.custom_roles().list(&role.project_name, Some(&role.name))).await?;
            if same_name.iter().any(|r| r.id != role.id) {
                return Err(ServiceError::already_exists("Custom role name is already used"));
            }
            bounded(t, self.inner.custom_roles().update(role)).await
        }
        .await;
        self.audited(entry, result)
    }

    /// Delete a custom role and strip it from every user holding it.
    pub async fn custom_role_delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        let result = async {
            bounded(t, self.inner.custom_roles().delete(project, id)).await?;
            bounded(t, self.inner.users().remove_custom_role(project, id)).await
        }
        .await;
        self.audited(AuditEntry::new(project, "CUSTOMROLE", "DELETE", id), result)
    }

    // ==================== Sessions ====================

    pub async fn session_add(&mut self, session: Session) -> Result<(), ServiceError> {
        self.require_project(&session.project_name).await?;
        let t = self.timeout;
        bounded(t, self.inner.sessions().add(session)).await
    }

    pub async fn session_get(&mut self, project: &str, id: &str) -> Result<Session, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.sessions().get(project, id))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such session"))
    }

    pub async fn session_list_by_user(&mut self, project: &str, user_id: &str) -> Result<Vec<Session>, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.sessions().list_by_user(project, user_id)).await
    }

    pub async fn session_delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.sessions().delete(project, id)).await
    }

    /// Revoke every session of a user.
    pub async fn session_delete_all_by_user(&mut self, project: &str, user_id: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        let result = bounded(t, self.inner.sessions().delete_all_by_user(project, user_id)).await;
        self.audited(AuditEntry::new(project, "SESSION", "DELETE", user_id), result)
    }

    // ==================== Login sessions ====================

    pub async fn login_session_add(&mut self, session: LoginSession) -> Result<(), ServiceError> {
        self.require_project(&session.project_name).await?;
        let t = self.timeout;
        bounded(t, self.inner.login_sessions().add(session)).await
    }

    pub async fn login_session_get(&mut self, project: &str, id: &str) -> Result<LoginSession, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.login_sessions().get(project, id))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such login session"))
    }

    pub async fn login_session_get_by_code(&mut self, project: &str, code: &str) -> Result<LoginSession, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.login_sessions().get_by_code(project, code))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such authorization code"))
    }

    pub async fn login_session_update(&mut self, session: LoginSession) -> Result<(), ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.login_sessions().update(session)).await
    }

    pub async fn login_session_delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.login_sessions().delete(project, id)).await
    }

    // ==================== Devices ====================

    pub async fn device_add(&mut self, device: Device) -> Result<(), ServiceError> {
        self.require_project(&device.project_name).await?;
        let t = self.timeout;
        bounded(t, self.inner.devices().add(device)).await
    }

    pub async fn device_get_by_device_code(&mut self, project: &str, code: &str) -> Result<Device, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.devices().get_by_device_code(project, code))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such device code"))
    }

    pub async fn device_get_by_user_code(&mut self, project: &str, code: &str) -> Result<Device, ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.devices().get_by_user_code(project, code))
            .await?
            .ok_or_else(|| ServiceError::not_found("No such user code"))
    }

    pub async fn device_delete(&mut self, project: &str, device_code: &str) -> Result<(), ServiceError> {
        let t = self.timeout;
        bounded(t, self.inner.devices().delete(project, device_code)).await
    }

    // ==================== Expiry ====================

    pub async fn delete_expired(&mut self, now: DateTime<Utc>) -> Result<PurgeReport, ServiceError> {
        let t = self.timeout;
        Ok(PurgeReport {
            login_sessions: bounded(t, self.inner.login_sessions().cleanup(now)).await?,
            sessions: bounded(t, self.inner.sessions().cleanup(now)).await?,
            devices: bounded(t, self.inner.devices().cleanup(now)).await?,
        })
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.flush_audit(Some(&ServiceError::new(
                ErrorKind::ServerError,
                "Transaction abandoned",
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::services::audit::MemoryAuditSink;

    fn database() -> Database {
        Database::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryAuditSink::new()))
    }

    async fn add_then_abort(db: &Database) -> Result<(), ServiceError> {
        atomically!(db, |tx| {
            tx.project_add(Project::new("tenant-a")).await?;
            Err(ServiceError::validation("abort"))
        })
    }

    #[tokio::test]
    async fn failed_block_rolls_back() {
        let db = database();
        assert!(add_then_abort(&db).await.is_err());

        let mut tx = db.begin().await.unwrap();
        assert!(tx.project_get("tenant-a").await.unwrap_err().is(ErrorKind::ProjectNotFound));
    }

    #[tokio::test]
    async fn project_add_provisions_portal() {
        let db = database();
        db.project_add(Project::new("tenant-a")).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let project = tx.project_get("tenant-a").await.unwrap();
        assert!(!project.token_config.sign_secret_key.is_empty());
        assert_eq!(tx.client_get("tenant-a", "portal").await.unwrap().id, "portal");
    }

    #[tokio::test]
    async fn duplicate_project_is_rejected() {
        let db = database();
        db.project_add(Project::new("tenant-a")).await.unwrap();
        let err = db.project_add(Project::new("tenant-a")).await.unwrap_err();
        assert!(err.is(ErrorKind::AlreadyExists));
    }
}
