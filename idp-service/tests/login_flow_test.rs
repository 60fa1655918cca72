//! Login session, consent and SSO integration tests.

mod common;

use common::{TestIdp, ADMIN_NAME, ADMIN_PASSWORD, PORTAL_CALLBACK};
use idp_service::{
    models::{AuthParams, ResponseMode, MASTER_PROJECT},
    services::{AuthorizeOutcome, ErrorKind, LoginOutcome},
    utils::Password,
};

async fn start(idp: &TestIdp, params: AuthParams) -> anyhow::Result<String> {
    let req = idp.state.login.parse_auth_request(params)?;
    Ok(idp.state.login.start_login_session(MASTER_PROJECT, &req).await?)
}

/// Log in through the code flow and return the SSO cookie value.
async fn sso_cookie(idp: &TestIdp) -> anyhow::Result<String> {
    let resp = idp.login_with_code(idp.code_params()).await?;
    Ok(resp.sso_token.expect("sso token on success"))
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn bad_password_restarts_the_login_session() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let first = start(&idp, idp.code_params()).await?;

    let outcome = idp
        .state
        .login
        .login(MASTER_PROJECT, &first, ADMIN_NAME, &Password::new("wrong"))
        .await?;
    let LoginOutcome::Retry { login_session_id, error } = outcome else {
        panic!("expected a retry");
    };
    assert_eq!(error, ErrorKind::AuthFailed);
    assert_ne!(login_session_id, first);

    let err = idp.state.login.verify_session(MASTER_PROJECT, &first).await.unwrap_err();
    assert_eq!(err, ErrorKind::SessionExpired);

    let outcome = idp
        .state
        .login
        .login(MASTER_PROJECT, &login_session_id, ADMIN_NAME, &Password::new(ADMIN_PASSWORD))
        .await?;
    assert!(matches!(outcome, LoginOutcome::Completed(_)));
    Ok(())
}

#[tokio::test]
async fn unknown_login_session_is_expired() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let err = idp
        .state
        .login
        .login(MASTER_PROJECT, "no-such-session", ADMIN_NAME, &Password::new(ADMIN_PASSWORD))
        .await
        .unwrap_err();
    assert_eq!(err, ErrorKind::SessionExpired);
    Ok(())
}

#[tokio::test]
async fn code_redirect_carries_code_and_state_in_the_query() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let resp = idp.login_with_code(idp.code_params()).await?;

    assert_eq!(resp.response_mode, ResponseMode::Query);
    let url = resp.redirect_url()?;
    assert!(url.starts_with(&format!("{}?", PORTAL_CALLBACK)));
    assert!(url.contains("state=xyz"));
    assert!(url.contains(&format!("code={}", resp.code().expect("code"))));
    Ok(())
}

#[tokio::test]
async fn implicit_flow_returns_tokens_in_the_fragment() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let mut params = idp.code_params();
    params.response_type = Some("id_token token".to_string());

    let resp = idp.login_with_code(params).await?;

    assert_eq!(resp.response_mode, ResponseMode::Fragment);
    assert!(resp.code().is_none());
    assert!(resp.param("id_token").is_some());
    assert!(resp.param("access_token").is_some());
    assert!(resp.redirect_url()?.contains('#'));
    Ok(())
}

// ============================================================================
// Consent
// ============================================================================

#[tokio::test]
async fn consent_prompt_is_honoured() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let mut params = idp.code_params();
    params.prompt = Some("consent".to_string());

    let id = start(&idp, params.clone()).await?;
    let outcome = idp
        .state
        .login
        .login(MASTER_PROJECT, &id, ADMIN_NAME, &Password::new(ADMIN_PASSWORD))
        .await?;
    assert!(matches!(outcome, LoginOutcome::ConsentRequired { .. }));

    let refused = idp.state.login.consent(MASTER_PROJECT, &id, false).await?;
    assert_eq!(refused.error_code(), Some("consent_required"));
    assert!(refused.sso_token.is_none());

    let id = start(&idp, params).await?;
    idp.state
        .login
        .login(MASTER_PROJECT, &id, ADMIN_NAME, &Password::new(ADMIN_PASSWORD))
        .await?;
    let approved = idp.state.login.consent(MASTER_PROJECT, &id, true).await?;
    assert!(approved.code().is_some());
    Ok(())
}

// ============================================================================
// Authorization endpoint and SSO
// ============================================================================

#[tokio::test]
async fn unregistered_redirect_uri_is_an_error_not_a_redirect() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let mut params = idp.code_params();
    params.redirect_uri = Some("https://evil.example/callback".to_string());

    let err = idp.state.sso.authorize(MASTER_PROJECT, params, None).await.unwrap_err();
    assert_eq!(err, ErrorKind::InvalidRequestUri);
    Ok(())
}

#[tokio::test]
async fn bad_request_after_redirect_check_is_redirected() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let mut params = idp.code_params();
    params.scope = Some("openid admin".to_string());

    let outcome = idp.state.sso.authorize(MASTER_PROJECT, params, None).await?;
    let AuthorizeOutcome::Redirect(resp) = outcome else {
        panic!("expected a redirect");
    };
    assert_eq!(resp.error_code(), Some("invalid_scope"));
    assert_eq!(resp.param("state"), Some("xyz"));
    Ok(())
}

#[tokio::test]
async fn prompt_none_without_session_is_login_required() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let mut params = idp.code_params();
    params.prompt = Some("none".to_string());

    let outcome = idp.state.sso.authorize(MASTER_PROJECT, params, None).await?;
    let AuthorizeOutcome::Redirect(resp) = outcome else {
        panic!("expected a redirect");
    };
    assert_eq!(resp.error_code(), Some("login_required"));
    Ok(())
}

#[tokio::test]
async fn sso_cookie_alone_does_not_skip_login_without_a_session() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    // A code-flow login mints a cookie but no refresh session yet.
    let cookie = sso_cookie(&idp).await?;

    let outcome = idp
        .state
        .sso
        .authorize(MASTER_PROJECT, idp.code_params(), Some(&cookie))
        .await?;
    assert!(matches!(outcome, AuthorizeOutcome::LoginPage { .. }));
    Ok(())
}

#[tokio::test]
async fn sso_cookie_with_live_session_skips_login() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let cookie = sso_cookie(&idp).await?;
    idp.password_grant(ADMIN_NAME, ADMIN_PASSWORD).await?;

    let outcome = idp
        .state
        .sso
        .authorize(MASTER_PROJECT, idp.code_params(), Some(&cookie))
        .await?;
    let AuthorizeOutcome::Redirect(resp) = outcome else {
        panic!("expected an SSO redirect");
    };
    let code = resp.code().expect("code").to_string();
    idp.state.grants.token(MASTER_PROJECT, idp.code_grant(&code), "").await?;

    let mut forced = idp.code_params();
    forced.prompt = Some("login".to_string());
    let outcome = idp.state.sso.authorize(MASTER_PROJECT, forced, Some(&cookie)).await?;
    assert!(matches!(outcome, AuthorizeOutcome::LoginPage { .. }));
    Ok(())
}

#[tokio::test]
async fn garbage_cookie_falls_back_to_the_login_page() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let outcome = idp
        .state
        .sso
        .authorize(MASTER_PROJECT, idp.code_params(), Some("garbage"))
        .await?;
    assert!(matches!(outcome, AuthorizeOutcome::LoginPage { .. }));
    Ok(())
}

#[tokio::test]
async fn invalid_id_token_hint_is_reported_to_the_client() -> anyhow::Result<()> {
    let idp = TestIdp::spawn().await?;
    let mut params = idp.code_params();
    params.id_token_hint = Some("not-a-token".to_string());

    let outcome = idp.state.sso.authorize(MASTER_PROJECT, params, None).await?;
    let AuthorizeOutcome::Redirect(resp) = outcome else {
        panic!("expected a redirect");
    };
    assert_eq!(resp.error_code(), Some("invalid_request"));
    Ok(())
}
