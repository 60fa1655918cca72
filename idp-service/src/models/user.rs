use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::ServiceError;
use crate::utils::password::PasswordHashString;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub locked: bool,
    /// Timestamps of recent failed password checks, oldest first.
    pub verify_failed_times: Vec<DateTime<Utc>>,
}

impl LockState {
    pub fn last_failure(&self) -> Option<DateTime<Utc>> {
        self.verify_failed_times.last().copied()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub project_name: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: PasswordHashString,
    pub system_roles: Vec<String>,
    /// Ids of [`CustomRole`](super::CustomRole)s.
    pub custom_roles: Vec<String>,
    pub lock_state: LockState,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        project_name: impl Into<String>,
        name: impl Into<String>,
        password_hash: PasswordHashString,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            name: name.into(),
            password_hash,
            system_roles: Vec::new(),
            custom_roles: Vec::new(),
            lock_state: LockState::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_system_roles(mut self, roles: Vec<String>) -> Self {
        self.system_roles = roles;
        self
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !super::is_uuid(&self.id) {
            return Err(ServiceError::validation("User id must be a UUID"));
        }
        let len = self.name.chars().count();
        if !(3..=63).contains(&len) {
            return Err(ServiceError::validation(
                "User name must be 3 to 63 characters",
            ));
        }
        if self.password_hash.as_str().is_empty() {
            return Err(ServiceError::validation("User password hash is empty"));
        }
        Ok(())
    }
}
