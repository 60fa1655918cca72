//! Token endpoint: grant dispatch, client authentication and revocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::config::IdpConfig;
use crate::models::{Client, GrantType, Project, Session};
use crate::utils::password::Password;

use super::credential::CredentialService;
use super::database::{atomically, Database, Transaction};
use super::jwt::{self, IdTokenExtras, TokenRequest};
use super::{ErrorKind, ServiceError};

/// Decoded token request. Fields a grant does not use are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrantRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
    pub device_code: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub refresh_expires_in: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id_token: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// What a grant resolved to before tokens are minted.
struct Subject {
    user_id: Option<String>,
    audiences: Vec<String>,
    last_auth_time: DateTime<Utc>,
    /// `Some` when an id token is part of the response.
    id_token: Option<IdTokenExtras>,
    with_refresh: bool,
}

#[derive(Clone)]
pub struct GrantService {
    db: Database,
    config: Arc<IdpConfig>,
    credentials: CredentialService,
}

impl GrantService {
    pub fn new(db: Database, config: Arc<IdpConfig>, credentials: CredentialService) -> Self {
        Self {
            db,
            config,
            credentials,
        }
    }

    /// Exchange a grant for tokens.
    pub async fn token(&self, project: &str, req: GrantRequest, from_ip: &str) -> Result<TokenResponse, ServiceError> {
        let grant = req
            .grant_type
            .parse::<GrantType>()
            .map_err(|e| ServiceError::new(ErrorKind::UnsupportedGrantType, e))?;

        let (proj, client) = atomically!(self.db, |tx| {
            let proj = tx.project_get(project).await?;
            if !proj.allows(grant) {
                return Err(ServiceError::new(
                    ErrorKind::UnsupportedGrantType,
                    format!("Grant type {} is not allowed in this project", grant),
                ));
            }
            let client = authenticate_client(&mut tx, project, &req.client_id, req.client_secret.as_deref()).await?;
            Ok((proj, client))
        })?;

        let result = match grant {
            GrantType::Password => self.password_grant(&proj, &client, &req, from_ip).await,
            GrantType::AuthorizationCode => self.code_grant(&proj, &client, &req, from_ip).await,
            GrantType::RefreshToken => self.refresh_grant(&proj, &client, &req, from_ip).await,
            GrantType::ClientCredentials => self.client_credentials_grant(&proj, &client).await,
            GrantType::DeviceCode => self.device_grant(&proj, &client, &req, from_ip).await,
        };

        match &result {
            Ok(_) => tracing::info!(project = %project, client_id = %client.id, grant = %grant, "Token issued"),
            Err(e) if e.kind().is_internal() => {
                tracing::error!(project = %project, grant = %grant, error = %e.describe(), "Token request failed")
            }
            Err(e) => tracing::info!(project = %project, grant = %grant, reason = %e, "Token request rejected"),
        }
        result
    }

    async fn password_grant(
        &self,
        project: &Project,
        client: &Client,
        req: &GrantRequest,
        from_ip: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let (Some(username), Some(password)) = (&req.username, &req.password) else {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "username and password are required"));
        };
        let user = self
            .credentials
            .verify_password(&project.name, username, &Password::new(password.as_str()))
            .await?;

        let subject = Subject {
            audiences: vec![user.id.clone(), client.id.clone()],
            user_id: Some(user.id),
            last_auth_time: Utc::now(),
            id_token: None,
            with_refresh: true,
        };
        atomically!(self.db, |tx| self.issue_bundle(&mut tx, project, subject, from_ip).await)
    }

    async fn code_grant(
        &self,
        project: &Project,
        client: &Client,
        req: &GrantRequest,
        from_ip: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let Some(code) = req.code.as_deref().filter(|c| !c.is_empty()) else {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "code is required"));
        };

        atomically!(self.db, |tx| {
            let ls = match tx.login_session_get_by_code(&project.name, code).await {
                Ok(ls) => ls,
                Err(e) if e.is(ErrorKind::NotFound) => {
                    return Err(ServiceError::new(ErrorKind::InvalidGrant, "Unknown authorization code"));
                }
                Err(e) => return Err(e),
            };
            if ls.client_id != client.id {
                return Err(ServiceError::new(ErrorKind::UnauthorizedClient, "Code was issued to another client"));
            }
            let redirect_uri = req.redirect_uri.as_deref().unwrap_or_default();
            if redirect_uri.is_empty() {
                return Err(ServiceError::new(ErrorKind::InvalidRequest, "redirect_uri is required"));
            }
            if redirect_uri != ls.redirect_uri {
                return Err(ServiceError::new(ErrorKind::InvalidGrant, "redirect_uri does not match"));
            }
            if ls.is_expired(Utc::now()) {
                return Err(ServiceError::new(ErrorKind::InvalidRequest, "code is already expired"));
            }
            let verifier = req.code_verifier.as_deref().unwrap_or_default();
            match (ls.code_challenge.is_empty(), verifier.is_empty()) {
                (true, true) => {}
                (true, false) => {
                    return Err(ServiceError::new(ErrorKind::InvalidGrant, "No code challenge was registered"));
                }
                (false, true) => {
                    return Err(ServiceError::new(ErrorKind::InvalidGrant, "code_verifier is required"));
                }
                (false, false) => {
                    if !ls.code_challenge_method.verify(&ls.code_challenge, verifier) {
                        return Err(ServiceError::new(ErrorKind::InvalidGrant, "PKCE verification failed"));
                    }
                }
            }
            let Some(user_id) = ls.user_id.clone() else {
                return Err(ServiceError::new(ErrorKind::InvalidGrant, "Code is not bound to a user"));
            };

            tx.login_session_delete(&project.name, &ls.session_id).await?;

            let auth_time = ls.login_date.unwrap_or_else(Utc::now);
            let subject = Subject {
                audiences: vec![user_id.clone(), client.id.clone()],
                user_id: Some(user_id),
                last_auth_time: auth_time,
                id_token: Some(IdTokenExtras {
                    nonce: ls.nonce.clone(),
                    auth_time,
                }),
                with_refresh: true,
            };
            self.issue_bundle(&mut tx, project, subject, from_ip).await
        })
    }

    async fn refresh_grant(
        &self,
        project: &Project,
        client: &Client,
        req: &GrantRequest,
        from_ip: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let Some(token) = req.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "refresh_token is required"));
        };
        let issuer = self.config.oidc.issuer(&project.name);

        atomically!(self.db, |tx| {
            let claims = match jwt::validate_refresh_token(&mut tx, token, &issuer).await {
                Ok(claims) => claims,
                Err(e) if e.kind().is_internal() => return Err(e),
                Err(e) => return Err(e.with_kind(ErrorKind::InvalidGrant)),
            };
            if claims.project != project.name {
                return Err(ServiceError::new(ErrorKind::InvalidGrant, "Token belongs to another project"));
            }
            if !claims.aud.iter().any(|a| a == &client.id) {
                return Err(ServiceError::new(ErrorKind::InvalidClient, "Token was not issued to this client"));
            }

            let session = match tx.session_get(&project.name, &claims.session_id).await {
                Ok(s) => s,
                Err(e) if e.is(ErrorKind::NotFound) => {
                    return Err(ServiceError::new(ErrorKind::InvalidGrant, "Refresh token was already used"));
                }
                Err(e) => return Err(e),
            };
            tx.session_delete(&project.name, &session.session_id).await?;

            let subject = Subject {
                user_id: Some(session.user_id).filter(|u| !u.is_empty()),
                audiences: session.audiences,
                last_auth_time: session.last_auth_time,
                id_token: None,
                with_refresh: true,
            };
            self.issue_bundle(&mut tx, project, subject, from_ip).await
        })
    }

    async fn client_credentials_grant(&self, project: &Project, client: &Client) -> Result<TokenResponse, ServiceError> {
        if !client.is_confidential() {
            return Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                "client_credentials requires a confidential client",
            ));
        }
        let subject = Subject {
            user_id: None,
            audiences: vec![client.id.clone()],
            last_auth_time: Utc::now(),
            id_token: None,
            with_refresh: false,
        };
        atomically!(self.db, |tx| self.issue_bundle(&mut tx, project, subject, "").await)
    }

    async fn device_grant(
        &self,
        project: &Project,
        client: &Client,
        req: &GrantRequest,
        from_ip: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let Some(device_code) = req.device_code.as_deref().filter(|c| !c.is_empty()) else {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "device_code is required"));
        };

        let outcome = atomically!(self.db, |tx| {
            let device = match tx.device_get_by_device_code(&project.name, device_code).await {
                Ok(d) => d,
                Err(e) if e.is(ErrorKind::NotFound) => {
                    return Err(ServiceError::new(ErrorKind::InvalidRequest, "Unknown device code"));
                }
                Err(e) => return Err(e),
            };
            // An expired pairing is spent; its rows are removed before the
            // error is reported.
            if device.is_expired(Utc::now()) {
                tx.device_delete(&project.name, &device.device_code).await?;
                match tx.login_session_delete(&project.name, &device.login_session_id).await {
                    Ok(()) => {}
                    Err(e) if e.is(ErrorKind::NotFound) => {}
                    Err(e) => return Err(e),
                }
                return Ok(Err(ServiceError::from(ErrorKind::ExpiredToken)));
            }
            let ls = match tx.login_session_get(&project.name, &device.login_session_id).await {
                Ok(ls) => ls,
                Err(e) if e.is(ErrorKind::NotFound) => return Err(ErrorKind::ExpiredToken.into()),
                Err(e) => return Err(e),
            };
            if ls.client_id != client.id {
                return Err(ServiceError::new(ErrorKind::InvalidGrant, "Device code was issued to another client"));
            }
            let (Some(user_id), Some(login_date)) = (ls.user_id.clone(), ls.login_date) else {
                return Err(ErrorKind::AuthorizationPending.into());
            };

            tx.device_delete(&project.name, &device.device_code).await?;
            tx.login_session_delete(&project.name, &ls.session_id).await?;

            let subject = Subject {
                user_id: Some(user_id),
                audiences: vec![client.id.clone()],
                last_auth_time: login_date,
                id_token: None,
                with_refresh: true,
            };
            Ok(Ok(self.issue_bundle(&mut tx, project, subject, from_ip).await?))
        })?;
        outcome
    }

    /// Mint the token set for `subject`, recording a session when a
    /// refresh token is issued.
    async fn issue_bundle(
        &self,
        tx: &mut Transaction,
        project: &Project,
        subject: Subject,
        from_ip: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let config = &project.token_config;
        let issuer = self.config.oidc.issuer(&project.name);
        let access_req = TokenRequest {
            issuer,
            project: project.name.clone(),
            user_id: subject.user_id.clone(),
            ttl: config.access_token_life_span,
        };
        let access_token = jwt::generate_access_token(tx, &subject.audiences, &access_req).await?;

        let mut response = TokenResponse {
            token_type: "Bearer".to_string(),
            access_token,
            expires_in: config.access_token_life_span,
            refresh_token: String::new(),
            refresh_expires_in: 0,
            id_token: String::new(),
        };

        if let Some(extras) = &subject.id_token {
            response.id_token = jwt::generate_id_token(tx, &subject.audiences, &access_req, extras).await?;
        }

        if subject.with_refresh {
            let mut session = Session::new(
                &project.name,
                subject.user_id.clone().unwrap_or_default(),
                config.refresh_token_life_span,
                subject.audiences.clone(),
            );
            session.from_ip = from_ip.to_string();
            session.last_auth_time = subject.last_auth_time;
            let refresh_req = TokenRequest {
                ttl: config.refresh_token_life_span,
                ..access_req
            };
            response.refresh_token =
                jwt::generate_refresh_token(tx, &session.session_id, &subject.audiences, &refresh_req).await?;
            response.refresh_expires_in = config.refresh_token_life_span;
            tx.session_add(session).await?;
        }

        Ok(response)
    }

    /// Revoke a refresh token. Tokens that do not validate are ignored.
    pub async fn revoke(&self, project: &str, token: &str, hint: Option<&str>) -> Result<(), ServiceError> {
        match hint.filter(|h| !h.is_empty()) {
            None | Some("refresh_token") => {}
            Some(other) => {
                return Err(ServiceError::new(
                    ErrorKind::UnsupportedTokenType,
                    format!("Token type {} cannot be revoked", other),
                ));
            }
        }
        let issuer = self.config.oidc.issuer(project);

        atomically!(self.db, |tx| {
            tx.project_get(project).await?;
            let claims = match jwt::validate_refresh_token(&mut tx, token, &issuer).await {
                Ok(c) if c.project == project => c,
                Ok(_) => return Ok(()),
                Err(e) if e.kind().is_internal() => return Err(e),
                Err(e) => {
                    tracing::debug!(project = %project, reason = %e, "Ignoring revocation of an invalid token");
                    return Ok(());
                }
            };
            match tx.session_delete(project, &claims.session_id).await {
                Ok(()) => {
                    tracing::info!(project = %project, session_id = %claims.session_id, "Refresh token revoked");
                    Ok(())
                }
                Err(e) if e.is(ErrorKind::NotFound) => Ok(()),
                Err(e) => Err(e),
            }
        })
    }
}

/// Look up `client_id` and check its secret when it is confidential.
pub(crate) async fn authenticate_client(
    tx: &mut Transaction,
    project: &str,
    client_id: &str,
    secret: Option<&str>,
) -> Result<Client, ServiceError> {
    let client = match tx.client_get(project, client_id).await {
        Ok(c) => c,
        Err(e) if e.is(ErrorKind::NotFound) => {
            return Err(ServiceError::from(ErrorKind::InvalidClient).note(format!("no client {}", client_id)));
        }
        Err(e) => return Err(e),
    };
    if client.is_confidential() {
        let presented = secret.unwrap_or_default();
        let matches: bool = presented.as_bytes().ct_eq(client.secret.as_bytes()).into();
        if presented.is_empty() || !matches {
            return Err(ServiceError::from(ErrorKind::InvalidClient).note(format!("bad secret for {}", client_id)));
        }
    }
    Ok(client)
}
