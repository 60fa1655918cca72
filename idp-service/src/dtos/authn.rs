use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginForm {
    #[validate(length(min = 1, message = "login_session_id is required"))]
    pub login_session_id: String,
    #[validate(length(min = 1, message = "username is required"))]
    #[schema(example = "admin")]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConsentForm {
    #[validate(length(min = 1, message = "login_session_id is required"))]
    pub login_session_id: String,
    /// `yes` or `no`.
    #[validate(length(min = 1, message = "select is required"))]
    #[schema(example = "yes")]
    pub select: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PendingStep {
    Login,
    Consent,
}

/// Returned while an authorization request still needs user interaction.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingLoginResponse {
    pub login_session_id: String,
    pub step: PendingStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl PendingLoginResponse {
    pub fn new(login_session_id: impl Into<String>, step: PendingStep) -> Self {
        Self {
            login_session_id: login_session_id.into(),
            step,
            error: None,
            error_description: None,
        }
    }
}
