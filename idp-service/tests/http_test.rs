//! End-to-end tests through the axum router.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{TestIdp, ADMIN_NAME, ADMIN_PASSWORD, PORTAL_CALLBACK};
use http_body_util::BodyExt;
use idp_service::services::SSO_COOKIE_NAME;
use serde_json::Value;
use tower::util::ServiceExt;

const BASE: &str = "/api/v1/project/master";

fn form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_storage() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let response = idp
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["storage"], "up");
    Ok(())
}

#[tokio::test]
async fn password_grant_over_http() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let body = format!(
        "grant_type=password&client_id=portal&username={}&password={}",
        ADMIN_NAME, ADMIN_PASSWORD
    );
    let response = idp
        .router()
        .oneshot(form(&format!("{}/openid-connect/token", BASE), &body))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 300);
    assert!(body["refresh_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body.get("id_token").is_none());
    Ok(())
}

#[tokio::test]
async fn token_errors_use_the_oauth_body() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;

    let response = idp
        .router()
        .oneshot(form(
            &format!("{}/openid-connect/token", BASE),
            "grant_type=authorization_code&client_id=portal&code=nope&redirect_uri=http://localhost:3000/callback",
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert_eq!(body["error"], "invalid_grant");
    assert!(body["error_description"].is_string());

    let response = idp
        .router()
        .oneshot(form(
            &format!("{}/openid-connect/token", BASE),
            "grant_type=password&client_id=ghost&username=a&password=b",
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["error"], "invalid_client");

    let response = idp
        .router()
        .oneshot(form("/api/v1/project/nowhere/openid-connect/token", "grant_type=password&client_id=portal"))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["error"], "project_not_found");
    Ok(())
}

#[tokio::test]
async fn code_flow_over_http_sets_the_sso_cookie() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let router = idp.router();

    let auth_uri = format!(
        "{}/openid-connect/auth?scope=openid&response_type=code&client_id=portal&redirect_uri={}&state=abc",
        BASE, PORTAL_CALLBACK
    );
    let response = router
        .clone()
        .oneshot(Request::builder().uri(auth_uri).body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["step"], "login");
    let login_session_id = body["login_session_id"].as_str().unwrap_or_default().to_string();

    let response = router
        .clone()
        .oneshot(form(
            &format!("{}/authn/login", BASE),
            &format!(
                "login_session_id={}&username={}&password={}",
                login_session_id, ADMIN_NAME, ADMIN_PASSWORD
            ),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str()?.to_string();
    assert!(location.starts_with(PORTAL_CALLBACK));
    assert!(location.contains("state=abc"));
    let cookie = response.headers()[header::SET_COOKIE].to_str()?.to_string();
    assert!(cookie.starts_with(&format!("{}=", SSO_COOKIE_NAME)));
    assert!(cookie.contains("HttpOnly"));

    let code = location
        .split(['?', '&'])
        .find_map(|kv| kv.strip_prefix("code="))
        .expect("code in location")
        .to_string();
    let response = router
        .oneshot(form(
            &format!("{}/openid-connect/token", BASE),
            &format!(
                "grant_type=authorization_code&client_id=portal&code={}&redirect_uri={}",
                code, PORTAL_CALLBACK
            ),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json(response).await["id_token"].is_string());
    Ok(())
}

#[tokio::test]
async fn bad_login_returns_a_fresh_session() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let req = idp.state.login.parse_auth_request(idp.code_params())?;
    let id = idp.state.login.start_login_session("master", &req).await?;

    let response = idp
        .router()
        .oneshot(form(
            &format!("{}/authn/login", BASE),
            &format!("login_session_id={}&username=admin&password=wrong", id),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json(response).await;
    assert_eq!(body["error"], "request_unauthorized");
    assert_ne!(body["login_session_id"], id.as_str());
    Ok(())
}

#[tokio::test]
async fn unknown_redirect_uri_is_not_followed() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let response = idp
        .router()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "{}/openid-connect/auth?scope=openid&response_type=code&client_id=portal&redirect_uri=https://evil.example/&state=s1",
                    BASE
                ))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert_eq!(body["error"], "invalid_request_uri");
    assert_eq!(body["state"], "s1");
    Ok(())
}

#[tokio::test]
async fn device_endpoints_over_http() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let router = idp.router();

    let response = router
        .clone()
        .oneshot(form(&format!("{}/openid-connect/device", BASE), "client_id=portal&scope=openid"))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    let user_code = body["user_code"].as_str().unwrap_or_default().to_string();
    assert_eq!(body["interval"], 5);

    let response = router
        .clone()
        .oneshot(form(&format!("{}/device/verify", BASE), &format!("user_code={}", user_code)))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json(response).await["login_session_id"].is_string());

    let response = router
        .oneshot(form(
            &format!("{}/openid-connect/token", BASE),
            &format!(
                "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code&client_id=portal&device_code={}",
                body["device_code"].as_str().unwrap_or_default()
            ),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["error"], "authorization_pending");
    Ok(())
}

#[tokio::test]
async fn revoke_accepts_unknown_tokens() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let response = idp
        .router()
        .oneshot(form(&format!("{}/openid-connect/revoke", BASE), "token=whatever"))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let response = idp
        .router()
        .oneshot(Request::builder().uri("/.well-known/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert!(body["paths"]
        .get("/api/v1/project/{project}/openid-connect/token")
        .is_some());
    Ok(())
}
