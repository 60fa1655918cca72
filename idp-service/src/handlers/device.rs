use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::dtos::authn::{PendingLoginResponse, PendingStep};
use crate::dtos::device::{DeviceAuthorizationForm, DeviceVerifyForm};
use crate::dtos::{ErrorResponse, OAuthError};
use crate::services::DeviceAuthorization;
use crate::utils::ValidatedForm;
use crate::AppState;

use super::client_credentials;

/// Device authorization endpoint (RFC 8628)
#[utoipa::path(
    post,
    path = "/api/v1/project/{project}/openid-connect/device",
    params(("project" = String, Path, description = "Project name")),
    request_body(content = DeviceAuthorizationForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Pairing opened", body = DeviceAuthorization),
        (status = 400, description = "Protocol error", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    ),
    tag = "Device Flow"
)]
pub async fn device_authorization(
    State(state): State<AppState>,
    Path(project): Path<String>,
    headers: HeaderMap,
    ValidatedForm(form): ValidatedForm<DeviceAuthorizationForm>,
) -> Result<Json<DeviceAuthorization>, OAuthError> {
    let (client_id, client_secret) = client_credentials(&headers, form.client_id, form.client_secret)?;
    let res = state
        .devices
        .register(&project, &client_id, client_secret.as_deref(), &form.scope)
        .await?;
    Ok(Json(res))
}

/// Exchange a user code for the login session the user must complete
#[utoipa::path(
    post,
    path = "/api/v1/project/{project}/device/verify",
    params(("project" = String, Path, description = "Project name")),
    request_body(content = DeviceVerifyForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login session to authenticate", body = PendingLoginResponse),
        (status = 400, description = "Unknown or expired user code", body = ErrorResponse)
    ),
    tag = "Device Flow"
)]
pub async fn device_verify(
    State(state): State<AppState>,
    Path(project): Path<String>,
    ValidatedForm(form): ValidatedForm<DeviceVerifyForm>,
) -> Result<Json<PendingLoginResponse>, OAuthError> {
    let login_session_id = state.devices.resolve_user_code(&project, &form.user_code).await?;
    Ok(Json(PendingLoginResponse::new(login_session_id, PendingStep::Login)))
}
