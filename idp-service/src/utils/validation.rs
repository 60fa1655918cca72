use axum::{
    extract::{FromRequest, Request},
    Form,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::services::{ErrorKind, ServiceError};

/// `application/x-www-form-urlencoded` body that has passed its validator
/// rules. Both decode and rule failures are rejected as `invalid_request`.
pub struct ValidatedForm<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedForm<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
            ServiceError::new(ErrorKind::InvalidRequest, "Failed to parse form body")
                .note(e.body_text())
        })?;

        value.validate().map_err(|e| {
            ServiceError::new(ErrorKind::InvalidRequest, format!("Validation error: {}", e))
        })?;

        Ok(ValidatedForm(value))
    }
}
