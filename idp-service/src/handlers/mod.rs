//! HTTP adapter. Handlers decode the request, call one service operation
//! and render its result.

pub mod authn;
pub mod device;
pub mod health;
pub mod oauth;

use axum::{
    extract::ConnectInfo,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::net::SocketAddr;

use crate::dtos::OAuthError;
use crate::services::{ErrorKind, LoginResponse, ServiceError, SsoService};

pub use authn::*;
pub use device::*;
pub use health::*;
pub use oauth::*;

/// Send the user agent back to the client, setting the SSO cookie on success.
pub(crate) fn redirect(sso: &SsoService, jar: CookieJar, resp: LoginResponse) -> Result<Response, OAuthError> {
    let url = resp.redirect_url()?;
    let jar = match resp.sso_token {
        Some(token) => jar.add(sso.cookie(token)),
        None => jar,
    };
    Ok((StatusCode::FOUND, jar, [(header::LOCATION, url)]).into_response())
}

/// Client credentials from HTTP Basic authentication or the form body.
/// When both are present the client ids must agree.
pub(crate) fn client_credentials(
    headers: &HeaderMap,
    form_id: Option<String>,
    form_secret: Option<String>,
) -> Result<(String, Option<String>), ServiceError> {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .map(decode_basic)
        .transpose()?;

    let form_id = form_id.filter(|id| !id.is_empty());
    match (basic, form_id) {
        (Some((id, _)), Some(other)) if id != other => Err(ServiceError::new(
            ErrorKind::InvalidRequest,
            "client_id does not match the authorization header",
        )),
        (Some((id, secret)), _) => Ok((id, Some(secret))),
        (None, Some(id)) => Ok((id, form_secret)),
        (None, None) => Err(ServiceError::new(ErrorKind::InvalidRequest, "client_id is required")),
    }
}

fn decode_basic(encoded: &str) -> Result<(String, String), ServiceError> {
    let bad = || ServiceError::new(ErrorKind::InvalidClient, "Malformed basic authorization");
    let raw = STANDARD.decode(encoded.trim()).map_err(|_| bad())?;
    let text = String::from_utf8(raw).map_err(|_| bad())?;
    let (id, secret) = text.split_once(':').ok_or_else(bad)?;
    Ok((id.to_string(), secret.to_string()))
}

pub(crate) fn remote_ip(connect: Option<ConnectInfo<SocketAddr>>) -> String {
    connect.map(|ConnectInfo(addr)| addr.ip().to_string()).unwrap_or_default()
}
