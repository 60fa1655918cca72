use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::net::SocketAddr;

use crate::dtos::oauth::{RevokeForm, TokenForm};
use crate::dtos::{ErrorResponse, OAuthError};
use crate::services::TokenResponse;
use crate::utils::ValidatedForm;
use crate::AppState;

use super::{client_credentials, remote_ip};

/// Token endpoint
#[utoipa::path(
    post,
    path = "/api/v1/project/{project}/openid-connect/token",
    params(("project" = String, Path, description = "Project name")),
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Protocol error", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "OpenID Connect"
)]
pub async fn token(
    State(state): State<AppState>,
    Path(project): Path<String>,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    ValidatedForm(form): ValidatedForm<TokenForm>,
) -> Result<Json<TokenResponse>, OAuthError> {
    let (client_id, client_secret) =
        client_credentials(&headers, form.client_id.clone(), form.client_secret.clone())?;
    let req = form.into_grant(client_id, client_secret);
    let res = state.grants.token(&project, req, &remote_ip(connect)).await?;
    Ok(Json(res))
}

/// Revoke a refresh token (RFC 7009)
#[utoipa::path(
    post,
    path = "/api/v1/project/{project}/openid-connect/revoke",
    params(("project" = String, Path, description = "Project name")),
    request_body(content = RevokeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token revoked or already invalid"),
        (status = 400, description = "Unsupported token type", body = ErrorResponse)
    ),
    tag = "OpenID Connect"
)]
pub async fn revoke(
    State(state): State<AppState>,
    Path(project): Path<String>,
    ValidatedForm(form): ValidatedForm<RevokeForm>,
) -> Result<StatusCode, OAuthError> {
    state
        .grants
        .revoke(&project, &form.token, form.token_type_hint.as_deref())
        .await?;
    Ok(StatusCode::OK)
}
