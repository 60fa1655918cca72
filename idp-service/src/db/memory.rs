//! In-process storage backend.
//!
//! All state sits behind one async mutex. A transaction owns the lock from
//! `begin` until it is committed, rolled back or dropped, so transactions are
//! serializable. Each transaction keeps a snapshot taken at `begin` and puts
//! it back unless it commits. Tables are shared copy-on-write, so the
//! snapshot is a handful of reference bumps and a table is only copied the
//! first time a transaction writes to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    ClientHandler, CustomRoleHandler, DeviceHandler, LoginSessionHandler, ProjectHandler,
    SessionHandler, StorageBackend, StoreTx, UserHandler,
};
use crate::models::{Client, CustomRole, Device, LoginSession, Project, Session, User};
use crate::services::ServiceError;

type Key = (String, String);
type Table<K, V> = Arc<BTreeMap<K, V>>;

fn key(project: &str, id: &str) -> Key {
    (project.to_string(), id.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    projects: Table<String, Project>,
    clients: Table<Key, Client>,
    users: Table<Key, User>,
    custom_roles: Table<Key, CustomRole>,
    sessions: Table<Key, Session>,
    login_sessions: Table<Key, LoginSession>,
    devices: Table<Key, Device>,
}

/// Drop every row of `map` belonging to `project`.
fn retain_outside<V>(map: &mut BTreeMap<Key, V>, project: &str) {
    map.retain(|(p, _), _| p != project);
}

fn insert_new<V>(map: &mut BTreeMap<Key, V>, k: Key, value: V, what: &str) -> Result<(), ServiceError> {
    if map.contains_key(&k) {
        return Err(ServiceError::already_exists(format!("{} already exists", what))
            .note(format!("{}/{}", k.0, k.1)));
    }
    map.insert(k, value);
    Ok(())
}

fn replace<V>(map: &mut BTreeMap<Key, V>, k: Key, value: V, what: &str) -> Result<(), ServiceError> {
    match map.get_mut(&k) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(ServiceError::not_found(format!("No such {}", what))
            .note(format!("{}/{}", k.0, k.1))),
    }
}

fn remove<V>(map: &mut BTreeMap<Key, V>, k: Key, what: &str) -> Result<(), ServiceError> {
    map.remove(&k).map(|_| ()).ok_or_else(|| {
        ServiceError::not_found(format!("No such {}", what)).note(format!("{}/{}", k.0, k.1))
    })
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    call_timeout: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every call, including the wait for the store lock in `begin`.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, ServiceError> {
        let state = self.state.clone().lock_owned().await;
        let snapshot = Some(state.clone());
        Ok(Box::new(MemoryTx { state, snapshot }))
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}

pub struct MemoryTx {
    state: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    fn projects(&mut self) -> &mut dyn ProjectHandler {
        &mut *self.state
    }

    fn clients(&mut self) -> &mut dyn ClientHandler {
        &mut *self.state
    }

    fn users(&mut self) -> &mut dyn UserHandler {
        &mut *self.state
    }

    fn custom_roles(&mut self) -> &mut dyn CustomRoleHandler {
        &mut *self.state
    }

    fn sessions(&mut self) -> &mut dyn SessionHandler {
        &mut *self.state
    }

    fn login_sessions(&mut self) -> &mut dyn LoginSessionHandler {
        &mut *self.state
    }

    fn devices(&mut self) -> &mut dyn DeviceHandler {
        &mut *self.state
    }

    async fn commit(&mut self) -> Result<(), ServiceError> {
        self.snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ServiceError> {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectHandler for MemoryState {
    async fn add(&mut self, project: Project) -> Result<(), ServiceError> {
        if self.projects.contains_key(&project.name) {
            return Err(ServiceError::already_exists("Project already exists"));
        }
        Arc::make_mut(&mut self.projects).insert(project.name.clone(), project);
        Ok(())
    }

    async fn get(&mut self, name: &str) -> Result<Option<Project>, ServiceError> {
        Ok(self.projects.get(name).cloned())
    }

    async fn list(&mut self) -> Result<Vec<Project>, ServiceError> {
        Ok(self.projects.values().cloned().collect())
    }

    async fn update(&mut self, project: Project) -> Result<(), ServiceError> {
        match Arc::make_mut(&mut self.projects).get_mut(&project.name) {
            Some(slot) => {
                *slot = project;
                Ok(())
            }
            None => Err(ServiceError::not_found("No such project")),
        }
    }

    async fn delete(&mut self, name: &str) -> Result<(), ServiceError> {
        Arc::make_mut(&mut self.projects)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("No such project"))
    }
}

#[async_trait]
impl ClientHandler for MemoryState {
    async fn add(&mut self, client: Client) -> Result<(), ServiceError> {
        let k = key(&client.project_name, &client.id);
        insert_new(Arc::make_mut(&mut self.clients), k, client, "client")
    }

    async fn get(&mut self, project: &str, id: &str) -> Result<Option<Client>, ServiceError> {
        Ok(self.clients.get(&key(project, id)).cloned())
    }

    async fn list(&mut self, project: &str) -> Result<Vec<Client>, ServiceError> {
        Ok(self
            .clients
            .values()
            .filter(|c| c.project_name == project)
            .cloned()
            .collect())
    }

    async fn update(&mut self, client: Client) -> Result<(), ServiceError> {
        let k = key(&client.project_name, &client.id);
        replace(Arc::make_mut(&mut self.clients), k, client, "client")
    }

    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        remove(Arc::make_mut(&mut self.clients), key(project, id), "client")
    }

    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError> {
        retain_outside(Arc::make_mut(&mut self.clients), project);
        Ok(())
    }
}

#[async_trait]
impl UserHandler for MemoryState {
    async fn add(&mut self, user: User) -> Result<(), ServiceError> {
        let k = key(&user.project_name, &user.id);
        insert_new(Arc::make_mut(&mut self.users), k, user, "user")
    }

    async fn get(&mut self, project: &str, id: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get(&key(project, id)).cloned())
    }

    async fn list(&mut self, project: &str, name: Option<&str>) -> Result<Vec<User>, ServiceError> {
        Ok(self
            .users
            .values()
            .filter(|u| u.project_name == project && name.is_none_or(|n| u.name == n))
            .cloned()
            .collect())
    }

    async fn update(&mut self, user: User) -> Result<(), ServiceError> {
        let k = key(&user.project_name, &user.id);
        replace(Arc::make_mut(&mut self.users), k, user, "user")
    }

    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        remove(Arc::make_mut(&mut self.users), key(project, id), "user")
    }

    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError> {
        retain_outside(Arc::make_mut(&mut self.users), project);
        Ok(())
    }

    async fn remove_custom_role(&mut self, project: &str, role_id: &str) -> Result<(), ServiceError> {
        for user in Arc::make_mut(&mut self.users).values_mut().filter(|u| u.project_name == project) {
            user.custom_roles.retain(|r| r != role_id);
        }
        Ok(())
    }
}

#[async_trait]
impl CustomRoleHandler for MemoryState {
    async fn add(&mut self, role: CustomRole) -> Result<(), ServiceError> {
        let k = key(&role.project_name, &role.id);
        insert_new(Arc::make_mut(&mut self.custom_roles), k, role, "custom role")
    }

    async fn get(&mut self, project: &str, id: &str) -> Result<Option<CustomRole>, ServiceError> {
        Ok(self.custom_roles.get(&key(project, id)).cloned())
    }

    async fn list(&mut self, project: &str, name: Option<&str>) -> Result<Vec<CustomRole>, ServiceError> {
        Ok(self
            .custom_roles
            .values()
            .filter(|r| r.project_name == project && name.is_none_or(|n| r.name == n))
            .cloned()
            .collect())
    }

    async fn update(&mut self, role: CustomRole) -> Result<(), ServiceError> {
        let k = key(&role.project_name, &role.id);
        replace(Arc::make_mut(&mut self.custom_roles), k, role, "custom role")
    }

    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        remove(Arc::make_mut(&mut self.custom_roles), key(project, id), "custom role")
    }

    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError> {
        retain_outside(Arc::make_mut(&mut self.custom_roles), project);
        Ok(())
    }
}

#[async_trait]
impl SessionHandler for MemoryState {
    async fn add(&mut self, session: Session) -> Result<(), ServiceError> {
        let k = key(&session.project_name, &session.session_id);
        insert_new(Arc::make_mut(&mut self.sessions), k, session, "session")
    }

    async fn get(&mut self, project: &str, id: &str) -> Result<Option<Session>, ServiceError> {
        Ok(self.sessions.get(&key(project, id)).cloned())
    }

    async fn list_by_user(&mut self, project: &str, user_id: &str) -> Result<Vec<Session>, ServiceError> {
        Ok(self
            .sessions
            .values()
            .filter(|s| s.project_name == project && s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        remove(Arc::make_mut(&mut self.sessions), key(project, id), "session")
    }

    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError> {
        retain_outside(Arc::make_mut(&mut self.sessions), project);
        Ok(())
    }

    async fn delete_all_by_user(&mut self, project: &str, user_id: &str) -> Result<(), ServiceError> {
        Arc::make_mut(&mut self.sessions)
            .retain(|(p, _), s| !(p == project && s.user_id == user_id));
        Ok(())
    }

    async fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let before = self.sessions.len();
        Arc::make_mut(&mut self.sessions).retain(|_, s| !s.is_expired(now));
        Ok(before - self.sessions.len())
    }
}

#[async_trait]
impl LoginSessionHandler for MemoryState {
    async fn add(&mut self, session: LoginSession) -> Result<(), ServiceError> {
        let k = key(&session.project_name, &session.session_id);
        insert_new(Arc::make_mut(&mut self.login_sessions), k, session, "login session")
    }

    async fn get(&mut self, project: &str, id: &str) -> Result<Option<LoginSession>, ServiceError> {
        Ok(self.login_sessions.get(&key(project, id)).cloned())
    }

    async fn get_by_code(&mut self, project: &str, code: &str) -> Result<Option<LoginSession>, ServiceError> {
        Ok(self
            .login_sessions
            .values()
            .find(|s| s.project_name == project && s.code.as_deref() == Some(code))
            .cloned())
    }

    async fn update(&mut self, session: LoginSession) -> Result<(), ServiceError> {
        let k = key(&session.project_name, &session.session_id);
        replace(Arc::make_mut(&mut self.login_sessions), k, session, "login session")
    }

    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError> {
        remove(Arc::make_mut(&mut self.login_sessions), key(project, id), "login session")
    }

    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError> {
        retain_outside(Arc::make_mut(&mut self.login_sessions), project);
        Ok(())
    }

    async fn delete_all_by_user(&mut self, project: &str, user_id: &str) -> Result<(), ServiceError> {
        Arc::make_mut(&mut self.login_sessions)
            .retain(|(p, _), s| !(p == project && s.user_id.as_deref() == Some(user_id)));
        Ok(())
    }

    async fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let before = self.login_sessions.len();
        Arc::make_mut(&mut self.login_sessions).retain(|_, s| !s.is_expired(now));
        Ok(before - self.login_sessions.len())
    }
}

#[async_trait]
impl DeviceHandler for MemoryState {
    async fn add(&mut self, device: Device) -> Result<(), ServiceError> {
        if self
            .devices
            .values()
            .any(|d| d.project_name == device.project_name && d.user_code == device.user_code)
        {
            return Err(ServiceError::already_exists("User code already in use"));
        }
        let k = key(&device.project_name, &device.device_code);
        insert_new(Arc::make_mut(&mut self.devices), k, device, "device")
    }

    async fn get_by_device_code(&mut self, project: &str, device_code: &str) -> Result<Option<Device>, ServiceError> {
        Ok(self.devices.get(&key(project, device_code)).cloned())
    }

    async fn get_by_user_code(&mut self, project: &str, user_code: &str) -> Result<Option<Device>, ServiceError> {
        Ok(self
            .devices
            .values()
            .find(|d| d.project_name == project && d.user_code == user_code)
            .cloned())
    }

    async fn delete(&mut self, project: &str, device_code: &str) -> Result<(), ServiceError> {
        remove(Arc::make_mut(&mut self.devices), key(project, device_code), "device")
    }

    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError> {
        retain_outside(Arc::make_mut(&mut self.devices), project);
        Ok(())
    }

    async fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize, ServiceError> {
        let before = self.devices.len();
        Arc::make_mut(&mut self.devices).retain(|_, d| !d.is_expired(now));
        Ok(before - self.devices.len())
    }
}
