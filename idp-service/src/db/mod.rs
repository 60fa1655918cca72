//! Storage contract.
//!
//! One handler trait per entity family, reached through a [`StoreTx`]
//! opened by a [`StorageBackend`]. Every write made through a `StoreTx` is
//! visible to later reads in the same transaction and becomes durable only
//! on [`StoreTx::commit`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crate::models::{Client, CustomRole, Device, LoginSession, Project, Session, User};
use crate::services::{ErrorKind, ServiceError};

pub use memory::MemoryBackend;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, ServiceError>;

    async fn ping(&self) -> Result<(), ServiceError>;

    /// Upper bound for a single handler call, if the backend needs one.
    fn call_timeout(&self) -> Option<Duration> {
        None
    }
}

#[async_trait]
pub trait StoreTx: Send {
    fn projects(&mut self) -> &mut dyn ProjectHandler;
    fn clients(&mut self) -> &mut dyn ClientHandler;
    fn users(&mut self) -> &mut dyn UserHandler;
    fn custom_roles(&mut self) -> &mut dyn CustomRoleHandler;
    fn sessions(&mut self) -> &mut dyn SessionHandler;
    fn login_sessions(&mut self) -> &mut dyn LoginSessionHandler;
    fn devices(&mut self) -> &mut dyn DeviceHandler;

    async fn commit(&mut self) -> Result<(), ServiceError>;
    async fn rollback(&mut self) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ProjectHandler: Send {
    async fn add(&mut self, project: Project) -> Result<(), ServiceError>;
    async fn get(&mut self, name: &str) -> Result<Option<Project>, ServiceError>;
    async fn list(&mut self) -> Result<Vec<Project>, ServiceError>;
    async fn update(&mut self, project: Project) -> Result<(), ServiceError>;
    async fn delete(&mut self, name: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ClientHandler: Send {
    async fn add(&mut self, client: Client) -> Result<(), ServiceError>;
    async fn get(&mut self, project: &str, id: &str) -> Result<Option<Client>, ServiceError>;
    async fn list(&mut self, project: &str) -> Result<Vec<Client>, ServiceError>;
    async fn update(&mut self, client: Client) -> Result<(), ServiceError>;
    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError>;
    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait UserHandler: Send {
    async fn add(&mut self, user: User) -> Result<(), ServiceError>;
    async fn get(&mut self, project: &str, id: &str) -> Result<Option<User>, ServiceError>;
    /// Users whose name equals `name`, or all users when `name` is `None`.
    async fn list(&mut self, project: &str, name: Option<&str>) -> Result<Vec<User>, ServiceError>;
    async fn update(&mut self, user: User) -> Result<(), ServiceError>;
    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError>;
    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError>;
    /// Strip a custom role id from every user of the project.
    async fn remove_custom_role(&mut self, project: &str, role_id: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait CustomRoleHandler: Send {
    async fn add(&mut self, role: CustomRole) -> Result<(), ServiceError>;
    async fn get(&mut self, project: &str, id: &str) -> Result<Option<CustomRole>, ServiceError>;
    async fn list(&mut self, project: &str, name: Option<&str>) -> Result<Vec<CustomRole>, ServiceError>;
    async fn update(&mut self, role: CustomRole) -> Result<(), ServiceError>;
    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError>;
    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait SessionHandler: Send {
    async fn add(&mut self, session: Session) -> Result<(), ServiceError>;
    async fn get(&mut self, project: &str, id: &str) -> Result<Option<Session>, ServiceError>;
    async fn list_by_user(&mut self, project: &str, user_id: &str) -> Result<Vec<Session>, ServiceError>;
    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError>;
    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError>;
    async fn delete_all_by_user(&mut self, project: &str, user_id: &str) -> Result<(), ServiceError>;
    /// Purge expired rows, returning how many were removed.
    async fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait LoginSessionHandler: Send {
    async fn add(&mut self, session: LoginSession) -> Result<(), ServiceError>;
    async fn get(&mut self, project: &str, id: &str) -> Result<Option<LoginSession>, ServiceError>;
    async fn get_by_code(&mut self, project: &str, code: &str) -> Result<Option<LoginSession>, ServiceError>;
    async fn update(&mut self, session: LoginSession) -> Result<(), ServiceError>;
    async fn delete(&mut self, project: &str, id: &str) -> Result<(), ServiceError>;
    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError>;
    async fn delete_all_by_user(&mut self, project: &str, user_id: &str) -> Result<(), ServiceError>;
    async fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize, ServiceError>;
}

#[async_trait]
pub trait DeviceHandler: Send {
    async fn add(&mut self, device: Device) -> Result<(), ServiceError>;
    async fn get_by_device_code(&mut self, project: &str, device_code: &str) -> Result<Option<Device>, ServiceError>;
    async fn get_by_user_code(&mut self, project: &str, user_code: &str) -> Result<Option<Device>, ServiceError>;
    async fn delete(&mut self, project: &str, device_code: &str) -> Result<(), ServiceError>;
    async fn delete_all(&mut self, project: &str) -> Result<(), ServiceError>;
    async fn cleanup(&mut self, now: DateTime<Utc>) -> Result<usize, ServiceError>;
}

/// Run one storage call under an optional deadline.
pub async fn bounded<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match timeout {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            ServiceError::new(ErrorKind::ServerError, "Storage call timed out")
                .note(format!("deadline {:?} exceeded", limit))
        })?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_times_out_slow_calls() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ServiceError>(1)
        };
        let err = bounded(Some(Duration::from_millis(10)), slow).await.unwrap_err();
        assert!(err.is(ErrorKind::ServerError));

        let fast = async { Ok::<_, ServiceError>(2) };
        assert_eq!(bounded(Some(Duration::from_secs(1)), fast).await.unwrap(), 2);
        assert_eq!(bounded(None, async { Ok::<_, ServiceError>(3) }).await.unwrap(), 3);
    }
}
