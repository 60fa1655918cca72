//! Structured error for every core operation.
//!
//! A [`ServiceError`] carries a [`ErrorKind`] tag, a public message that is
//! safe to show to a caller, and a private context chain that only reaches
//! the logs, optionally rooted in an [`anyhow::Error`] source. Errors are
//! compared by kind.

use axum::http::StatusCode;
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Persistence
    ValidationFailed,
    NotFound,
    AlreadyExists,
    DeleteBlocked,
    ProjectNotFound,

    // Credentials and login sessions
    AuthFailed,
    UserLocked,
    SessionExpired,

    // OAuth2 / OIDC protocol
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    UnsupportedTokenType,
    InvalidScope,
    InvalidRequestUri,
    InvalidToken,
    LoginRequired,
    ConsentRequired,
    AuthorizationPending,
    ExpiredToken,
    RequestNotSupported,

    // Internal
    SigningError,
    ServerError,
}

impl ErrorKind {
    /// Error code written to the `error` field of an OAuth error body.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed
            | ErrorKind::NotFound
            | ErrorKind::AlreadyExists
            | ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::DeleteBlocked => "no_permission",
            ErrorKind::ProjectNotFound => "project_not_found",
            ErrorKind::AuthFailed | ErrorKind::UserLocked => "request_unauthorized",
            ErrorKind::SessionExpired => "already_session_expired",
            ErrorKind::InvalidClient => "invalid_client",
            ErrorKind::InvalidGrant => "invalid_grant",
            ErrorKind::UnauthorizedClient => "unauthorized_client",
            ErrorKind::UnsupportedGrantType => "unsupported_grant_type",
            ErrorKind::UnsupportedResponseType => "unsupported_response_type",
            ErrorKind::UnsupportedTokenType => "unsupported_token_type",
            ErrorKind::InvalidScope => "invalid_scope",
            ErrorKind::InvalidRequestUri => "invalid_request_uri",
            ErrorKind::InvalidToken => "invalid_token",
            ErrorKind::LoginRequired => "login_required",
            ErrorKind::ConsentRequired => "consent_required",
            ErrorKind::AuthorizationPending => "authorization_pending",
            ErrorKind::ExpiredToken => "expired_token",
            ErrorKind::RequestNotSupported => "request_not_supported",
            ErrorKind::SigningError | ErrorKind::ServerError => "server_error",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidClient | ErrorKind::AuthFailed | ErrorKind::UserLocked => {
                StatusCode::UNAUTHORIZED
            }
            ErrorKind::DeleteBlocked => StatusCode::FORBIDDEN,
            ErrorKind::ProjectNotFound => StatusCode::NOT_FOUND,
            ErrorKind::SigningError | ErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Internal failures are logged at error level and hidden from callers.
    pub fn is_internal(self) -> bool {
        matches!(self, ErrorKind::SigningError | ErrorKind::ServerError)
    }

    fn default_message(self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed => "Validation failed",
            ErrorKind::NotFound => "No such entry",
            ErrorKind::AlreadyExists => "Already exists",
            ErrorKind::DeleteBlocked => "Deletion is not permitted",
            ErrorKind::ProjectNotFound => "Project not found",
            ErrorKind::AuthFailed => "Authentication failed",
            ErrorKind::UserLocked => "User is locked",
            ErrorKind::SessionExpired => "Login session is already expired",
            ErrorKind::InvalidRequest => "Invalid request",
            ErrorKind::InvalidClient => "Client authentication failed",
            ErrorKind::InvalidGrant => "Invalid grant",
            ErrorKind::UnauthorizedClient => "Client is not authorized for this request",
            ErrorKind::UnsupportedGrantType => "Grant type is not supported",
            ErrorKind::UnsupportedResponseType => "Response type is not supported",
            ErrorKind::UnsupportedTokenType => "Token type is not supported",
            ErrorKind::InvalidScope => "Invalid scope",
            ErrorKind::InvalidRequestUri => "Invalid redirect uri",
            ErrorKind::InvalidToken => "Invalid token",
            ErrorKind::LoginRequired => "Login is required",
            ErrorKind::ConsentRequired => "Consent is required",
            ErrorKind::AuthorizationPending => "Authorization is pending",
            ErrorKind::ExpiredToken => "Token is expired",
            ErrorKind::RequestNotSupported => "Request is not supported",
            ErrorKind::SigningError | ErrorKind::ServerError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    context: Vec<String>,
    cause: Option<Arc<anyhow::Error>>,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            cause: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> &str {
        if self.kind.is_internal() {
            return self.kind.default_message();
        }
        &self.message
    }

    /// Private context, oldest first.
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Underlying cause, if the error wraps one.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.cause = Some(Arc::new(source));
        self
    }

    /// Append a private context line.
    pub fn note(mut self, msg: impl Into<String>) -> Self {
        self.context.push(msg.into());
        self
    }

    /// Re-tag while keeping the private chain.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.context.push(format!("was {}: {}", self.kind, self.message));
        self.kind = kind;
        self.message = kind.default_message().to_string();
        self
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, msg)
    }

    /// Opaque server error; `cause` only reaches the private chain.
    pub fn internal(cause: impl fmt::Display) -> Self {
        Self::from(ErrorKind::ServerError).note(cause.to_string())
    }

    /// Full chain for logs.
    pub fn describe(&self) -> String {
        let mut out = format!("{}: {}", self.kind, self.message);
        for line in &self.context {
            out.push_str("; ");
            out.push_str(line);
        }
        if let Some(source) = &self.cause {
            out.push_str(&format!("; caused by: {:#}", source));
        }
        out
    }
}

impl From<ErrorKind> for ServiceError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::from(ErrorKind::ServerError).with_source(err)
    }
}

impl PartialEq for ServiceError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl PartialEq<ErrorKind> for ServiceError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.kind == *other
    }
}

/// Context helpers for `Result<T, ServiceError>`.
pub trait ResultExt<T> {
    fn note(self, msg: impl Into<String>) -> Result<T, ServiceError>;
    fn with_kind(self, kind: ErrorKind) -> Result<T, ServiceError>;
}

impl<T> ResultExt<T> for Result<T, ServiceError> {
    fn note(self, msg: impl Into<String>) -> Result<T, ServiceError> {
        self.map_err(|e| e.note(msg))
    }

    fn with_kind(self, kind: ErrorKind) -> Result<T, ServiceError> {
        self.map_err(|e| e.with_kind(kind))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let detail = anyhow::anyhow!(err.public_message().to_string());
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::ProjectNotFound => AppError::NotFound(detail),
            ErrorKind::AlreadyExists => AppError::Conflict(detail),
            ErrorKind::DeleteBlocked => AppError::Forbidden(detail),
            ErrorKind::AuthFailed | ErrorKind::UserLocked | ErrorKind::InvalidClient => {
                AppError::Unauthorized(detail)
            }
            ErrorKind::SigningError | ErrorKind::ServerError => {
                AppError::InternalError(anyhow::anyhow!(err.describe()))
            }
            _ => AppError::BadRequest(detail),
        }
    }
}
