//! Device authorization grant (RFC 8628), pairing side.
//!
//! The token side lives with the other grants in [`super::grant`].

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::IdpConfig;
use crate::models::{CodeChallengeMethod, Device, GrantType, LoginSession, ResponseMode};
use crate::utils::random;

use super::database::{atomically, Database};
use super::grant::authenticate_client;
use super::{ErrorKind, ServiceError};

const USER_CODE_LEN: usize = 8;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
}

#[derive(Clone)]
pub struct DeviceService {
    db: Database,
    config: Arc<IdpConfig>,
}

impl DeviceService {
    pub fn new(db: Database, config: Arc<IdpConfig>) -> Self {
        Self { db, config }
    }

    fn device_base(&self, project: &str) -> String {
        format!("{}/devicelogin", self.config.oidc.issuer(project))
    }

    /// Open a pairing for `client_id` and hand back the codes the device
    /// shows its user.
    pub async fn register(
        &self,
        project: &str,
        client_id: &str,
        client_secret: Option<&str>,
        scope: &str,
    ) -> Result<DeviceAuthorization, ServiceError> {
        let scopes: Vec<String> = scope.split_whitespace().map(str::to_string).collect();
        if scopes.is_empty() {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "scope is required"));
        }
        if let Some(bad) = scopes.iter().find(|s| !self.config.oidc.supported_scopes.contains(s)) {
            return Err(ServiceError::new(ErrorKind::InvalidScope, format!("Scope {} is not supported", bad)));
        }

        let expires_in = self.config.oidc.device_code_expires_in;
        let now = Utc::now();
        let login_session = LoginSession {
            session_id: Uuid::new_v4().to_string(),
            project_name: project.to_string(),
            code: None,
            client_id: client_id.to_string(),
            redirect_uri: format!("{}/complete", self.device_base(project)),
            state: String::new(),
            nonce: String::new(),
            response_type: Vec::new(),
            response_mode: ResponseMode::Query,
            prompt: Vec::new(),
            scope: scopes.join(" "),
            max_age: 0,
            expires_date: now + Duration::seconds(expires_in as i64),
            user_id: None,
            login_date: None,
            code_challenge: String::new(),
            code_challenge_method: CodeChallengeMethod::Plain,
            for_device: true,
        };
        let device = Device {
            device_code: Uuid::new_v4().to_string(),
            user_code: random::user_code(USER_CODE_LEN),
            project_name: project.to_string(),
            login_session_id: login_session.session_id.clone(),
            created_at: now,
            expires_in,
        };

        let response = DeviceAuthorization {
            device_code: device.device_code.clone(),
            user_code: device.user_code.clone(),
            verification_uri: self.device_base(project),
            expires_in,
            interval: self.config.oidc.device_poll_interval,
        };

        atomically!(self.db, |tx| {
            let proj = tx.project_get(project).await?;
            if !proj.allows(GrantType::DeviceCode) {
                return Err(ServiceError::new(
                    ErrorKind::UnsupportedGrantType,
                    "Device authorization is not allowed in this project",
                ));
            }
            authenticate_client(&mut tx, project, client_id, client_secret).await?;
            tx.login_session_add(login_session).await?;
            tx.device_add(device).await
        })?;

        tracing::info!(project = %project, client_id = %client_id, "Device pairing opened");
        Ok(response)
    }

    /// Login session paired with a user code. Codes are matched without
    /// regard to case.
    pub async fn resolve_user_code(&self, project: &str, user_code: &str) -> Result<String, ServiceError> {
        let user_code = user_code.trim().to_ascii_uppercase();
        atomically!(self.db, |tx| {
            let device = match tx.device_get_by_user_code(project, &user_code).await {
                Ok(d) => d,
                Err(e) if e.is(ErrorKind::NotFound) => {
                    return Err(ServiceError::new(ErrorKind::InvalidRequest, "Unknown user code"));
                }
                Err(e) => return Err(e),
            };
            if device.is_expired(Utc::now()) {
                return Err(ErrorKind::ExpiredToken.into());
            }
            Ok(device.login_session_id)
        })
    }
}
