//! Login session state machine.
//!
//! A login session is created by an authorization request, bound to a user
//! by a successful password check, optionally held for consent, and then
//! either deleted or kept with a single-use code until the token endpoint
//! redeems it. Expired rows are treated as gone.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::IdpConfig;
use crate::models::{AuthParams, AuthRequest, LoginSession, ResponseMode};
use crate::utils::password::Password;

use super::credential::CredentialService;
use super::database::{atomically, Database, Transaction};
use super::jwt::{self, IdTokenExtras, TokenRequest};
use super::{ErrorKind, ServiceError};

/// Where the user agent goes once an authorization attempt ends.
#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub redirect_uri: String,
    pub response_mode: ResponseMode,
    pub params: Vec<(String, String)>,
    /// Value for the SSO cookie; set only on success.
    pub sso_token: Option<String>,
}

impl LoginResponse {
    /// Redirect carrying an OAuth error instead of a result.
    pub fn error(redirect_uri: &str, response_mode: ResponseMode, state: &str, err: &ServiceError) -> Self {
        let mut params = vec![
            ("error".to_string(), err.kind().code().to_string()),
            ("error_description".to_string(), err.public_message().to_string()),
        ];
        if !state.is_empty() {
            params.push(("state".to_string(), state.to_string()));
        }
        Self {
            redirect_uri: redirect_uri.to_string(),
            response_mode,
            params,
            sso_token: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn code(&self) -> Option<&str> {
        self.param("code")
    }

    pub fn error_code(&self) -> Option<&str> {
        self.param("error")
    }

    /// Redirect target with the parameters in the query or the fragment.
    pub fn redirect_url(&self) -> Result<String, ServiceError> {
        if self.params.is_empty() {
            return Ok(self.redirect_uri.clone());
        }
        let encoded = serde_urlencoded::to_string(&self.params).map_err(ServiceError::internal)?;
        let url = match self.response_mode {
            ResponseMode::Query if self.redirect_uri.contains('?') => {
                format!("{}&{}", self.redirect_uri, encoded)
            }
            ResponseMode::Query => format!("{}?{}", self.redirect_uri, encoded),
            ResponseMode::Fragment => format!("{}#{}", self.redirect_uri, encoded),
        };
        Ok(url)
    }
}

#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials were rejected; the old session is gone and a new one
    /// replaces it for the next attempt.
    Retry {
        login_session_id: String,
        error: ServiceError,
    },
    ConsentRequired {
        login_session_id: String,
    },
    Completed(LoginResponse),
}

#[derive(Clone)]
pub struct LoginService {
    db: Database,
    config: Arc<IdpConfig>,
    credentials: CredentialService,
}

impl LoginService {
    pub fn new(db: Database, config: Arc<IdpConfig>, credentials: CredentialService) -> Self {
        Self {
            db,
            config,
            credentials,
        }
    }

    pub fn parse_auth_request(&self, params: AuthParams) -> Result<AuthRequest, ServiceError> {
        AuthRequest::parse(
            params,
            &self.config.oidc.supported_response_types,
            &self.config.oidc.supported_scopes,
        )
    }

    /// The client must exist and list `redirect_uri` among its callbacks.
    pub async fn check_redirect(
        &self,
        project: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<(), ServiceError> {
        atomically!(self.db, |tx| {
            tx.project_get(project).await?;
            let client = match tx.client_get(project, client_id).await {
                Ok(c) => c,
                Err(e) if e.is(ErrorKind::NotFound) => {
                    return Err(e.with_kind(ErrorKind::InvalidClient));
                }
                Err(e) => return Err(e),
            };
            if !client.allows_callback(redirect_uri) {
                return Err(ServiceError::new(
                    ErrorKind::InvalidRequestUri,
                    "Redirect uri is not allowed for this client",
                )
                .note(format!("client {} redirect {}", client_id, redirect_uri)));
            }
            Ok(())
        })
    }

    pub async fn validate_auth_request(&self, project: &str, req: &AuthRequest) -> Result<(), ServiceError> {
        self.check_redirect(project, &req.client_id, &req.redirect_uri).await
    }

    /// Open a login session for `req`, returning its id.
    pub async fn start_login_session(&self, project: &str, req: &AuthRequest) -> Result<String, ServiceError> {
        let ls = LoginSession::from_request(project, req, self.config.oidc.login_session_expires_in);
        let id = ls.session_id.clone();
        atomically!(self.db, |tx| tx.login_session_add(ls).await)?;
        tracing::debug!(project = %project, login_session = %id, "Login session started");
        Ok(id)
    }

    /// Load a live login session. Missing and expired rows both report
    /// `SessionExpired`; an expired row is removed.
    pub async fn verify_session(&self, project: &str, id: &str) -> Result<LoginSession, ServiceError> {
        atomically!(self.db, |tx| live_session(&mut tx, project, id).await)?.ok_or_else(|| {
            ServiceError::from(ErrorKind::SessionExpired).note(format!("login session {}", id))
        })
    }

    /// Check credentials against a login session.
    pub async fn login(
        &self,
        project: &str,
        login_session_id: &str,
        user_name: &str,
        password: &Password,
    ) -> Result<LoginOutcome, ServiceError> {
        let mut ls = self.verify_session(project, login_session_id).await?;

        let user = match self.credentials.verify_password(project, user_name, password).await {
            Ok(user) => user,
            Err(err) if err.is(ErrorKind::AuthFailed) || err.is(ErrorKind::UserLocked) => {
                let retry_id = self.restart(ls).await?;
                return Ok(LoginOutcome::Retry {
                    login_session_id: retry_id,
                    error: err,
                });
            }
            Err(err) => {
                let id = ls.session_id.clone();
                let cleanup = atomically!(self.db, |tx| tx.login_session_delete(project, &id).await);
                if let Err(e) = cleanup {
                    tracing::warn!(error = %e.describe(), "Failed to drop login session after error");
                }
                return Err(err);
            }
        };

        ls.bind_user(&user.id, Utc::now());
        tracing::info!(project = %project, user_id = %user.id, "User authenticated");

        if ls.has_prompt("consent") {
            let id = ls.session_id.clone();
            atomically!(self.db, |tx| tx.login_session_update(ls).await)?;
            return Ok(LoginOutcome::ConsentRequired { login_session_id: id });
        }

        Ok(LoginOutcome::Completed(self.complete(ls).await?))
    }

    /// Resolve a consent prompt. A refusal redirects with `consent_required`.
    pub async fn consent(&self, project: &str, login_session_id: &str, approved: bool) -> Result<LoginResponse, ServiceError> {
        let ls = self.verify_session(project, login_session_id).await?;
        if !ls.is_authenticated() {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "Login session is not authenticated"));
        }

        if approved {
            return self.complete(ls).await;
        }

        atomically!(self.db, |tx| tx.login_session_delete(project, &ls.session_id).await)?;
        Ok(LoginResponse::error(
            &ls.redirect_uri,
            ls.response_mode,
            &ls.state,
            &ErrorKind::ConsentRequired.into(),
        ))
    }

    pub async fn complete(&self, ls: LoginSession) -> Result<LoginResponse, ServiceError> {
        atomically!(self.db, |tx| self.complete_in(&mut tx, ls).await)
    }

    /// Build the success response for an authenticated login session and
    /// settle the row: it is kept while it holds a code or pairs a device,
    /// and deleted otherwise.
    pub(crate) async fn complete_in(&self, tx: &mut Transaction, mut ls: LoginSession) -> Result<LoginResponse, ServiceError> {
        let Some(user_id) = ls.user_id.clone() else {
            return Err(ServiceError::internal("completing an unauthenticated login session"));
        };
        let auth_time = ls.login_date.unwrap_or_else(Utc::now);
        let project = tx.project_get(&ls.project_name).await?;
        let issuer = self.config.oidc.issuer(&ls.project_name);
        let audiences = vec![user_id.clone(), ls.client_id.clone()];
        let token_req = TokenRequest {
            issuer: issuer.clone(),
            project: ls.project_name.clone(),
            user_id: Some(user_id.clone()),
            ttl: project.token_config.access_token_life_span,
        };

        let mut params = Vec::new();
        if !ls.state.is_empty() {
            params.push(("state".to_string(), ls.state.clone()));
        }
        for typ in ls.response_type.clone() {
            match typ.as_str() {
                "code" => {
                    let code = Uuid::new_v4().to_string();
                    ls.code = Some(code.clone());
                    ls.expires_date = Utc::now() + Duration::seconds(self.config.oidc.auth_code_expires_in as i64);
                    params.push(("code".to_string(), code));
                }
                "id_token" => {
                    let extras = IdTokenExtras {
                        nonce: ls.nonce.clone(),
                        auth_time,
                    };
                    let token = jwt::generate_id_token(tx, &audiences, &token_req, &extras).await?;
                    params.push(("id_token".to_string(), token));
                }
                "token" => {
                    let token = jwt::generate_access_token(tx, &audiences, &token_req).await?;
                    params.push(("access_token".to_string(), token));
                }
                _ => {}
            }
        }

        let redirect_uri = ls.redirect_uri.clone();
        let response_mode = ls.response_mode;
        if ls.code.is_some() || ls.for_device {
            tx.login_session_update(ls).await?;
        } else {
            tx.login_session_delete(&token_req.project, &ls.session_id).await?;
        }

        let sso_req = TokenRequest {
            ttl: self.config.oidc.sso_expires_in,
            ..token_req
        };
        let sso_token = jwt::generate_sso_token(tx, &sso_req).await?;

        Ok(LoginResponse {
            redirect_uri,
            response_mode,
            params,
            sso_token: Some(sso_token),
        })
    }

    /// Replace a login session with a fresh one for another attempt. A
    /// device pairing points at its login session by id, so device sessions
    /// are kept as they are.
    async fn restart(&self, old: LoginSession) -> Result<String, ServiceError> {
        if old.for_device {
            return Ok(old.session_id);
        }

        let mut fresh = old.clone();
        fresh.session_id = Uuid::new_v4().to_string();
        fresh.expires_date = Utc::now() + Duration::seconds(self.config.oidc.login_session_expires_in as i64);
        fresh.user_id = None;
        fresh.login_date = None;
        fresh.code = None;
        let id = fresh.session_id.clone();

        atomically!(self.db, |tx| {
            tx.login_session_delete(&old.project_name, &old.session_id).await?;
            tx.login_session_add(fresh).await
        })?;
        Ok(id)
    }
}

/// Live login session `id`, or `None` when it is missing or expired. An
/// expired row is deleted on the way.
async fn live_session(
    tx: &mut Transaction,
    project: &str,
    id: &str,
) -> Result<Option<LoginSession>, ServiceError> {
    let ls = match tx.login_session_get(project, id).await {
        Ok(ls) => ls,
        Err(e) if e.is(ErrorKind::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };
    if ls.is_expired(Utc::now()) {
        tx.login_session_delete(project, id).await?;
        return Ok(None);
    }
    Ok(Some(ls))
}
