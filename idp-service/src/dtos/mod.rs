pub mod authn;
pub mod device;
pub mod oauth;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::services::ServiceError;

/// OAuth2 error body (RFC 6749 section 5.2).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "invalid_grant")]
    pub error: String,
    #[schema(example = "Unknown authorization code")]
    pub error_description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
}

/// A [`ServiceError`] rendered with the `state` of the request it answers.
pub struct OAuthError {
    pub error: ServiceError,
    pub state: String,
}

impl OAuthError {
    pub fn with_state(error: ServiceError, state: impl Into<String>) -> Self {
        Self {
            error,
            state: state.into(),
        }
    }
}

impl From<ServiceError> for OAuthError {
    fn from(error: ServiceError) -> Self {
        Self::with_state(error, String::new())
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let kind = self.error.kind();
        if kind.is_internal() {
            tracing::error!(error = %self.error.describe(), "Request failed");
        } else {
            tracing::info!(error = %self.error.describe(), "Request rejected");
        }

        let mut status = kind.status();
        // Unknown ids on protocol routes are request errors, not missing pages.
        if status == StatusCode::NOT_FOUND && kind != crate::services::ErrorKind::ProjectNotFound {
            status = StatusCode::BAD_REQUEST;
        }

        let body = ErrorResponse {
            error: kind.code().to_string(),
            error_description: self.error.public_message().to_string(),
            state: self.state,
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        OAuthError::from(self).into_response()
    }
}
