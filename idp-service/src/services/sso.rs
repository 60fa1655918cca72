//! Authorization endpoint and single sign-on.
//!
//! A browser that already holds a valid SSO cookie (or presents an
//! `id_token_hint`) and has a recent enough session skips the login page.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::config::IdpConfig;
use crate::models::{AuthParams, AuthRequest, LoginSession, ResponseMode, Session};

use super::database::{atomically, Database, Transaction};
use super::jwt;
use super::login::{LoginResponse, LoginService};
use super::{ErrorKind, ServiceError};

pub const SSO_COOKIE_NAME: &str = "IDP_LOGIN_SESSION";

#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Show the login form for this login session.
    LoginPage { login_session_id: String },
    Redirect(LoginResponse),
}

#[derive(Clone)]
pub struct SsoService {
    db: Database,
    config: Arc<IdpConfig>,
    login: LoginService,
}

impl SsoService {
    pub fn new(db: Database, config: Arc<IdpConfig>, login: LoginService) -> Self {
        Self { db, config, login }
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SSO_COOKIE_NAME, token))
            .path("/")
            .http_only(true)
            .secure(self.config.oidc.https_enabled)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(self.config.oidc.sso_expires_in as i64))
            .build()
    }

    /// Subject of an SSO cookie. A bad or stale cookie is ignored.
    pub async fn user_from_cookie(&self, project: &str, token: &str) -> Result<Option<String>, ServiceError> {
        let result = atomically!(self.db, |tx| jwt::validate_sso_token(&mut tx, project, token).await);
        match result {
            Ok(sub) if !sub.is_empty() => Ok(Some(sub)),
            Ok(_) => Ok(None),
            Err(e) if e.is(ErrorKind::InvalidToken) || e.is(ErrorKind::ExpiredToken) => {
                tracing::debug!(project = %project, reason = %e, "Ignoring SSO cookie");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Subject of an `id_token_hint`; any verification failure is an
    /// invalid request.
    pub async fn user_from_id_token_hint(&self, project: &str, hint: &str) -> Result<String, ServiceError> {
        let issuer = self.config.oidc.issuer(project);
        let result = atomically!(self.db, |tx| jwt::validate_id_token(&mut tx, hint, &issuer).await);
        match result {
            Ok(claims) => Ok(claims.sub),
            Err(e) if e.kind().is_internal() => Err(e),
            Err(e) => Err(ServiceError::new(ErrorKind::InvalidRequest, "Invalid id_token_hint").note(e.describe())),
        }
    }

    /// Finish `req` from an existing session of `user_id` if it is young
    /// enough, else `LoginRequired`.
    pub async fn resume(&self, project: &str, user_id: &str, req: &AuthRequest) -> Result<LoginResponse, ServiceError> {
        let ttl = self.config.oidc.login_session_expires_in;
        atomically!(self.db, |tx| {
            let Some(session) = reusable_session(&mut tx, project, user_id, req.max_age).await? else {
                return Err(ErrorKind::LoginRequired.into());
            };
            let mut ls = LoginSession::from_request(project, req, ttl);
            ls.bind_user(user_id, session.last_auth_time);
            tx.login_session_add(ls.clone()).await?;
            self.login.complete_in(&mut tx, ls).await
        })
    }

    /// Handle an authorization request.
    ///
    /// Problems with the client or its redirect URI are returned as errors
    /// since there is nowhere safe to redirect to. Everything after that is
    /// reported to the client through the redirect.
    pub async fn authorize(
        &self,
        project: &str,
        params: AuthParams,
        sso_cookie: Option<&str>,
    ) -> Result<AuthorizeOutcome, ServiceError> {
        let client_id = params.client_id.clone().unwrap_or_default();
        let redirect_uri = params.redirect_uri.clone().unwrap_or_default();
        if client_id.is_empty() || redirect_uri.is_empty() {
            return Err(ServiceError::new(ErrorKind::InvalidRequest, "client_id and redirect_uri are required"));
        }
        self.login.check_redirect(project, &client_id, &redirect_uri).await?;

        let state = params.state.clone().unwrap_or_default();
        let fallback_mode = match params.response_mode.as_deref() {
            Some("fragment") => ResponseMode::Fragment,
            _ => ResponseMode::Query,
        };
        let req = match self.login.parse_auth_request(params) {
            Ok(req) => req,
            Err(e) => {
                tracing::info!(project = %project, client_id = %client_id, reason = %e, "Rejected authorization request");
                return Ok(AuthorizeOutcome::Redirect(LoginResponse::error(&redirect_uri, fallback_mode, &state, &e)));
            }
        };
        let redirect_error = |err: ServiceError| {
            AuthorizeOutcome::Redirect(LoginResponse::error(&req.redirect_uri, req.response_mode, &req.state, &err))
        };

        if req.forces_login() {
            let login_session_id = self.login.start_login_session(project, &req).await?;
            return Ok(AuthorizeOutcome::LoginPage { login_session_id });
        }

        let user_id = if !req.id_token_hint.is_empty() {
            match self.user_from_id_token_hint(project, &req.id_token_hint).await {
                Ok(sub) => Some(sub),
                Err(e) if e.is(ErrorKind::InvalidRequest) => return Ok(redirect_error(e)),
                Err(e) => return Err(e),
            }
        } else {
            match sso_cookie {
                Some(token) => self.user_from_cookie(project, token).await?,
                None => None,
            }
        };

        if let Some(user_id) = user_id {
            match self.resume(project, &user_id, &req).await {
                Ok(resp) => {
                    tracing::info!(project = %project, user_id = %user_id, "Authorization resumed from SSO session");
                    return Ok(AuthorizeOutcome::Redirect(resp));
                }
                Err(e) if e.is(ErrorKind::LoginRequired) => {}
                Err(e) => return Err(e),
            }
        }

        if req.has_prompt("none") {
            return Ok(redirect_error(ErrorKind::LoginRequired.into()));
        }

        let login_session_id = self.login.start_login_session(project, &req).await?;
        Ok(AuthorizeOutcome::LoginPage { login_session_id })
    }
}

/// Most recent session of `user_id` whose last authentication is still
/// within `max_age` seconds. A `max_age` of 0 uses each session's own
/// lifetime.
async fn reusable_session(
    tx: &mut Transaction,
    project: &str,
    user_id: &str,
    max_age: u64,
) -> Result<Option<Session>, ServiceError> {
    let now = Utc::now();
    let sessions = tx.session_list_by_user(project, user_id).await?;
    Ok(sessions
        .into_iter()
        .filter(|s| !s.is_expired(now))
        .filter(|s| {
            let window = if max_age > 0 { max_age } else { s.expires_in };
            s.last_auth_time + Duration::seconds(window as i64) > now
        })
        .max_by_key(|s| s.last_auth_time))
}
