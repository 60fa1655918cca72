use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;

use crate::dtos::authn::{ConsentForm, LoginForm, PendingLoginResponse, PendingStep};
use crate::dtos::{ErrorResponse, OAuthError};
use crate::models::AuthParams;
use crate::services::{AuthorizeOutcome, ErrorKind, LoginOutcome, ServiceError, SSO_COOKIE_NAME};
use crate::utils::{Password, ValidatedForm};
use crate::AppState;

use super::redirect;

/// Authorization endpoint
///
/// Redirects straight back to the client when an SSO session can be
/// reused, otherwise returns the login session the user must complete.
#[utoipa::path(
    get,
    path = "/api/v1/project/{project}/openid-connect/auth",
    params(("project" = String, Path, description = "Project name")),
    responses(
        (status = 200, description = "Interactive login required", body = PendingLoginResponse),
        (status = 302, description = "Redirect to the client"),
        (status = 400, description = "Invalid client or redirect uri", body = ErrorResponse)
    ),
    tag = "OpenID Connect"
)]
pub async fn authorize(
    State(state): State<AppState>,
    Path(project): Path<String>,
    jar: CookieJar,
    Query(params): Query<AuthParams>,
) -> Result<Response, OAuthError> {
    let request_state = params.state.clone().unwrap_or_default();
    let cookie = jar.get(SSO_COOKIE_NAME).map(|c| c.value().to_string());

    let outcome = state
        .sso
        .authorize(&project, params, cookie.as_deref())
        .await
        .map_err(|e| OAuthError::with_state(e, request_state))?;

    match outcome {
        AuthorizeOutcome::LoginPage { login_session_id } => {
            Ok(Json(PendingLoginResponse::new(login_session_id, PendingStep::Login)).into_response())
        }
        AuthorizeOutcome::Redirect(resp) => redirect(&state.sso, jar, resp),
    }
}

/// Submit credentials for a login session
#[utoipa::path(
    post,
    path = "/api/v1/project/{project}/authn/login",
    params(("project" = String, Path, description = "Project name")),
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Consent required", body = PendingLoginResponse),
        (status = 302, description = "Login complete, redirect to the client"),
        (status = 400, description = "Login session expired", body = ErrorResponse),
        (status = 401, description = "Bad credentials; retry with the new login session", body = PendingLoginResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    Path(project): Path<String>,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<LoginForm>,
) -> Result<Response, OAuthError> {
    let password = Password::new(form.password);
    let outcome = state
        .login
        .login(&project, &form.login_session_id, &form.username, &password)
        .await?;

    match outcome {
        LoginOutcome::Retry {
            login_session_id,
            error,
        } => {
            let mut body = PendingLoginResponse::new(login_session_id, PendingStep::Login);
            body.error = Some(error.kind().code().to_string());
            body.error_description = Some(error.public_message().to_string());
            Ok((error.kind().status(), Json(body)).into_response())
        }
        LoginOutcome::ConsentRequired { login_session_id } => {
            Ok(Json(PendingLoginResponse::new(login_session_id, PendingStep::Consent)).into_response())
        }
        LoginOutcome::Completed(resp) => redirect(&state.sso, jar, resp),
    }
}

/// Approve or refuse a consent prompt
#[utoipa::path(
    post,
    path = "/api/v1/project/{project}/authn/consent",
    params(("project" = String, Path, description = "Project name")),
    request_body(content = ConsentForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to the client"),
        (status = 400, description = "Login session expired", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn consent(
    State(state): State<AppState>,
    Path(project): Path<String>,
    jar: CookieJar,
    ValidatedForm(form): ValidatedForm<ConsentForm>,
) -> Result<Response, OAuthError> {
    let approved = match form.select.as_str() {
        "yes" => true,
        "no" => false,
        other => {
            return Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                format!("select must be yes or no, got {}", other),
            )
            .into());
        }
    };
    let resp = state
        .login
        .consent(&project, &form.login_session_id, approved)
        .await?;
    redirect(&state.sso, jar, resp)
}
