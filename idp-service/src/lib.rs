pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::Request,
    middleware::from_fn,
    routing::{get, post},
    Json, Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::IdpConfig;
use crate::services::{
    CredentialService, Database, DeviceService, GrantService, LoginService, SsoService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::oauth::token,
        handlers::oauth::revoke,
        handlers::authn::authorize,
        handlers::authn::login,
        handlers::authn::consent,
        handlers::device::device_authorization,
        handlers::device::device_verify,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::oauth::TokenForm,
            dtos::oauth::RevokeForm,
            dtos::authn::LoginForm,
            dtos::authn::ConsentForm,
            dtos::authn::PendingLoginResponse,
            dtos::authn::PendingStep,
            dtos::device::DeviceAuthorizationForm,
            dtos::device::DeviceVerifyForm,
            services::TokenResponse,
            services::DeviceAuthorization,
        )
    ),
    tags(
        (name = "OpenID Connect", description = "Authorization, token and revocation endpoints"),
        (name = "Authentication", description = "Interactive login and consent"),
        (name = "Device Flow", description = "Device authorization grant"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IdpConfig>,
    pub db: Database,
    pub login: LoginService,
    pub sso: SsoService,
    pub grants: GrantService,
    pub devices: DeviceService,
}

impl AppState {
    /// Wire every service on top of one database handle.
    pub fn new(config: IdpConfig, db: Database) -> Self {
        let config = Arc::new(config);
        let credentials = CredentialService::new(db.clone());
        let login = LoginService::new(db.clone(), Arc::clone(&config), credentials.clone());
        let sso = SsoService::new(db.clone(), Arc::clone(&config), login.clone());
        let grants = GrantService::new(db.clone(), Arc::clone(&config), credentials);
        let devices = DeviceService::new(db.clone(), Arc::clone(&config));
        Self {
            config,
            db,
            login,
            sso,
            grants,
            devices,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let project_routes = Router::new()
        .route("/openid-connect/token", post(handlers::token))
        .route("/openid-connect/auth", get(handlers::authorize))
        .route("/openid-connect/revoke", post(handlers::revoke))
        .route("/openid-connect/device", post(handlers::device_authorization))
        .route("/authn/login", post(handlers::login))
        .route("/authn/consent", post(handlers::consent))
        .route("/device/verify", post(handlers::device_verify));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest("/api/v1/project/:project", project_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri().path(),
                version = ?request.version(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
}
