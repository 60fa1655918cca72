use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::services::ServiceError;

use super::is_valid_resource_name;

/// Client id provisioned with every new project.
pub const PORTAL_CLIENT_ID: &str = "portal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Public,
    Confidential,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Public => write!(f, "public"),
            AccessType::Confidential => write!(f, "confidential"),
        }
    }
}

impl FromStr for AccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(AccessType::Public),
            "confidential" => Ok(AccessType::Confidential),
            _ => Err(format!("Unknown access type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub project_name: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub secret: String,
    pub access_type: AccessType,
    pub allowed_callback_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(
        id: impl Into<String>,
        project_name: impl Into<String>,
        access_type: AccessType,
        secret: impl Into<String>,
        allowed_callback_urls: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_name: project_name.into(),
            secret: secret.into(),
            access_type,
            allowed_callback_urls,
            created_at: Utc::now(),
        }
    }

    /// The public client every project starts with.
    pub fn portal(project_name: impl Into<String>) -> Self {
        Self::new(
            PORTAL_CLIENT_ID,
            project_name,
            AccessType::Public,
            String::new(),
            Vec::new(),
        )
    }

    pub fn is_confidential(&self) -> bool {
        self.access_type == AccessType::Confidential
    }

    pub fn allows_callback(&self, redirect_uri: &str) -> bool {
        self.allowed_callback_urls.iter().any(|u| u == redirect_uri)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !is_valid_resource_name(&self.id) {
            return Err(ServiceError::validation("Invalid client id format")
                .note(format!("client id {:?}", self.id)));
        }

        match self.access_type {
            AccessType::Confidential => {
                let len = self.secret.chars().count();
                if !(8..=255).contains(&len) {
                    return Err(ServiceError::validation(
                        "Confidential client secret must be 8 to 255 characters",
                    ));
                }
            }
            AccessType::Public => {
                if !self.secret.is_empty() {
                    return Err(ServiceError::validation(
                        "Public client must not carry a secret",
                    ));
                }
            }
        }

        for url in &self.allowed_callback_urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ServiceError::validation(format!(
                    "Callback url {} is not an http(s) url",
                    url
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_is_public_and_valid() {
        let c = Client::portal("master");
        assert_eq!(c.id, PORTAL_CLIENT_ID);
        assert!(!c.is_confidential());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn confidential_secret_length() {
        let mut c = Client::new("backend", "master", AccessType::Confidential, "short", vec![]);
        assert!(c.validate().is_err());
        c.secret = "long-enough-secret".to_string();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn callback_matching_is_exact() {
        let c = Client::new(
            "webapp",
            "master",
            AccessType::Public,
            "",
            vec!["https://app.example.com/cb".to_string()],
        );
        assert!(c.allows_callback("https://app.example.com/cb"));
        assert!(!c.allows_callback("https://app.example.com/cb/"));
    }
}
