use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DeviceAuthorizationForm {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[validate(length(min = 1, message = "scope is required"))]
    #[schema(example = "openid")]
    pub scope: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DeviceVerifyForm {
    #[validate(length(equal = 8, message = "user_code must be 8 characters"))]
    #[schema(example = "WDJBMJHT")]
    pub user_code: String,
}
