use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::ServiceError;

use super::is_valid_resource_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRole {
    pub id: String,
    pub name: String,
    pub project_name: String,
    pub created_at: DateTime<Utc>,
}

impl CustomRole {
    pub fn new(name: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            project_name: project_name.into(),
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !is_valid_resource_name(&self.name) {
            return Err(ServiceError::validation("Invalid custom role name format"));
        }
        Ok(())
    }
}
