//! Shared fixtures for the idp-service integration tests.
//!
//! Every test gets its own in-memory store with a bootstrapped master
//! project, so tests never share state.

#![allow(dead_code)]

use idp_service::{
    build_router,
    config::IdpConfig,
    db::MemoryBackend,
    models::{AuthParams, MASTER_PROJECT, PORTAL_CLIENT_ID},
    services::{
        bootstrap, Database, GrantRequest, LoginOutcome, LoginResponse, MemoryAuditSink, TokenResponse,
    },
    utils::Password,
    AppState,
};
use std::sync::Arc;

pub const ADMIN_NAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "password";
pub const PORTAL_CALLBACK: &str = "http://localhost:3000/callback";

pub struct TestIdp {
    pub state: AppState,
    pub db: Database,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestIdp {
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(IdpConfig::default()).await
    }

    pub async fn spawn_with(config: IdpConfig) -> anyhow::Result<Self> {
        let audit = Arc::new(MemoryAuditSink::new());
        let db = Database::new(Arc::new(MemoryBackend::new()), audit.clone());
        bootstrap::ensure_master(&db, &config.admin).await?;
        let state = AppState::new(config, db.clone());
        Ok(Self { state, db, audit })
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    pub fn issuer(&self, project: &str) -> String {
        self.state.config.oidc.issuer(project)
    }

    /// Password grant against the master portal client.
    pub async fn password_grant(&self, user: &str, password: &str) -> Result<TokenResponse, idp_service::services::ServiceError> {
        let req = GrantRequest {
            grant_type: "password".to_string(),
            client_id: PORTAL_CLIENT_ID.to_string(),
            username: Some(user.to_string()),
            password: Some(password.to_string()),
            ..Default::default()
        };
        self.state.grants.token(MASTER_PROJECT, req, "127.0.0.1").await
    }

    /// Authorization-code request parameters for the master portal client.
    pub fn code_params(&self) -> AuthParams {
        AuthParams {
            scope: Some("openid".to_string()),
            response_type: Some("code".to_string()),
            client_id: Some(PORTAL_CLIENT_ID.to_string()),
            redirect_uri: Some(PORTAL_CALLBACK.to_string()),
            state: Some("xyz".to_string()),
            nonce: Some("n-0S6_WzA2Mj".to_string()),
            ..Default::default()
        }
    }

    /// Run a code-flow login for the admin and return the final redirect.
    pub async fn login_with_code(&self, params: AuthParams) -> anyhow::Result<LoginResponse> {
        let req = self.state.login.parse_auth_request(params)?;
        self.state.login.validate_auth_request(MASTER_PROJECT, &req).await?;
        let id = self.state.login.start_login_session(MASTER_PROJECT, &req).await?;
        match self
            .state
            .login
            .login(MASTER_PROJECT, &id, ADMIN_NAME, &Password::new(ADMIN_PASSWORD))
            .await?
        {
            LoginOutcome::Completed(resp) => Ok(resp),
            other => anyhow::bail!("unexpected login outcome: {:?}", other),
        }
    }

    pub fn code_grant(&self, code: &str) -> GrantRequest {
        GrantRequest {
            grant_type: "authorization_code".to_string(),
            client_id: PORTAL_CLIENT_ID.to_string(),
            code: Some(code.to_string()),
            redirect_uri: Some(PORTAL_CALLBACK.to_string()),
            ..Default::default()
        }
    }

    pub fn refresh_grant(&self, refresh_token: &str) -> GrantRequest {
        GrantRequest {
            grant_type: "refresh_token".to_string(),
            client_id: PORTAL_CLIENT_ID.to_string(),
            refresh_token: Some(refresh_token.to_string()),
            ..Default::default()
        }
    }
}
