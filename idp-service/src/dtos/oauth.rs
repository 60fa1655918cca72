use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::services::GrantRequest;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TokenForm {
    #[validate(length(min = 1, message = "grant_type is required"))]
    #[schema(example = "authorization_code")]
    pub grant_type: String,
    /// May instead be sent with HTTP Basic authentication.
    pub client_id: Option<String>,
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

impl TokenForm {
    pub fn into_grant(self, client_id: String, client_secret: Option<String>) -> GrantRequest {
        GrantRequest {
            grant_type: self.grant_type,
            client_id,
            client_secret,
            username: self.username,
            password: self.password,
            code: self.code,
            redirect_uri: self.redirect_uri,
            code_verifier: self.code_verifier,
            refresh_token: self.refresh_token,
            device_code: self.device_code,
            scope: self.scope,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RevokeForm {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[schema(example = "refresh_token")]
    pub token_type_hint: Option<String>,
}
