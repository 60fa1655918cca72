//! Authorization request parsing and validation.
//!
//! [`AuthParams`] is the raw query of an authorization endpoint call;
//! [`AuthRequest::parse`] turns it into a checked request or a protocol error.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::services::{ErrorKind, ServiceError};

const PROMPT_VALUES: [&str; 4] = ["login", "select_account", "consent", "none"];

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthParams {
    pub scope: Option<String>,
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub prompt: Option<String>,
    pub max_age: Option<String>,
    pub response_mode: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub id_token_hint: Option<String>,
    pub request: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl FromStr for ResponseMode {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(ResponseMode::Query),
            "fragment" => Ok(ResponseMode::Fragment),
            other => Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                format!("Unsupported response mode {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[default]
    #[serde(rename = "plain")]
    Plain,
    S256,
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeChallengeMethod::Plain => f.write_str("plain"),
            CodeChallengeMethod::S256 => f.write_str("S256"),
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CodeChallengeMethod::Plain),
            "S256" => Ok(CodeChallengeMethod::S256),
            other => Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                format!("Unsupported code challenge method {}", other),
            )),
        }
    }
}

impl CodeChallengeMethod {
    /// Check a PKCE code verifier against the registered challenge.
    pub fn verify(self, challenge: &str, verifier: &str) -> bool {
        let derived = match self {
            CodeChallengeMethod::Plain => verifier.to_string(),
            CodeChallengeMethod::S256 => URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes())),
        };
        derived.as_bytes().ct_eq(challenge.as_bytes()).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub scope: String,
    pub response_type: Vec<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub nonce: String,
    pub prompt: Vec<String>,
    /// Seconds, 0 when absent.
    pub max_age: u64,
    pub response_mode: ResponseMode,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    pub id_token_hint: String,
}

fn required(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ServiceError::new(
            ErrorKind::InvalidRequest,
            format!("Missing required parameter {}", field),
        )),
    }
}

fn split_spaces(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

impl AuthRequest {
    pub fn parse(
        params: AuthParams,
        supported_response_types: &[String],
        supported_scopes: &[String],
    ) -> Result<Self, ServiceError> {
        if params.request.as_deref().is_some_and(|r| !r.is_empty()) {
            return Err(ErrorKind::RequestNotSupported.into());
        }

        let scope = required(params.scope, "scope")?;
        let response_type = split_spaces(&required(params.response_type, "response_type")?);
        let client_id = required(params.client_id, "client_id")?;
        let redirect_uri = required(params.redirect_uri, "redirect_uri")?;
        if !(redirect_uri.starts_with("http://") || redirect_uri.starts_with("https://")) {
            return Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                "redirect_uri must be an absolute http(s) url",
            ));
        }

        let prompt = params.prompt.as_deref().map(split_spaces).unwrap_or_default();
        validate_prompt(&prompt)?;

        validate_response_type(&response_type, supported_response_types)?;
        validate_scope(&scope, supported_scopes)?;

        let response_mode = match params.response_mode.as_deref() {
            Some(mode) if !mode.is_empty() => mode.parse()?,
            _ => default_response_mode(&response_type),
        };

        let max_age = match params.max_age.as_deref() {
            Some(v) if !v.is_empty() => v.parse::<u64>().map_err(|_| {
                ServiceError::new(ErrorKind::InvalidRequest, "max_age must be a non-negative integer")
            })?,
            _ => 0,
        };

        let code_challenge = params.code_challenge.unwrap_or_default();
        let method = params.code_challenge_method.unwrap_or_default();
        let code_challenge_method = match (code_challenge.is_empty(), method.is_empty()) {
            (true, true) => CodeChallengeMethod::Plain,
            (true, false) => {
                return Err(ServiceError::new(
                    ErrorKind::InvalidRequest,
                    "code_challenge_method given without code_challenge",
                ));
            }
            (false, true) => CodeChallengeMethod::Plain,
            (false, false) => method.parse()?,
        };

        Ok(Self {
            scope,
            response_type,
            client_id,
            redirect_uri,
            state: params.state.unwrap_or_default(),
            nonce: params.nonce.unwrap_or_default(),
            prompt,
            max_age,
            response_mode,
            code_challenge,
            code_challenge_method,
            id_token_hint: params.id_token_hint.unwrap_or_default(),
        })
    }

    pub fn has_prompt(&self, value: &str) -> bool {
        self.prompt.iter().any(|p| p == value)
    }

    /// Any prompt that forces the login page to be shown.
    pub fn forces_login(&self) -> bool {
        self.has_prompt("login") || self.has_prompt("select_account") || self.has_prompt("consent")
    }
}

fn default_response_mode(response_type: &[String]) -> ResponseMode {
    match response_type {
        [only] if only == "code" || only == "none" => ResponseMode::Query,
        _ => ResponseMode::Fragment,
    }
}

fn validate_prompt(prompt: &[String]) -> Result<(), ServiceError> {
    for p in prompt {
        if !PROMPT_VALUES.contains(&p.as_str()) {
            return Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                format!("Unknown prompt value {}", p),
            ));
        }
        if p == "none" && prompt.len() != 1 {
            return Err(ServiceError::new(
                ErrorKind::InvalidRequest,
                "prompt=none must not be combined with other values",
            ));
        }
    }
    Ok(())
}

/// Order-insensitive form of a response type set, e.g. "token code" and
/// "code token" both become "code token".
fn normalize_response_type<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = parts.filter(|p| !p.is_empty()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(" ")
}

fn validate_response_type(types: &[String], supported: &[String]) -> Result<(), ServiceError> {
    let requested = normalize_response_type(types.iter().map(String::as_str));
    if supported
        .iter()
        .any(|s| normalize_response_type(s.split_whitespace()) == requested)
    {
        Ok(())
    } else {
        Err(ServiceError::new(
            ErrorKind::UnsupportedResponseType,
            format!("Response type {} is not supported", requested),
        ))
    }
}

fn validate_scope(scope: &str, supported: &[String]) -> Result<(), ServiceError> {
    for s in scope.split_whitespace() {
        if !supported.iter().any(|x| x == s) {
            return Err(ServiceError::new(
                ErrorKind::InvalidScope,
                format!("Scope {} is not supported", s),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supported() -> (Vec<String>, Vec<String>) {
        (
            ["code", "id_token", "token", "code id_token", "id_token token"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec!["openid".to_string()],
        )
    }

    fn params() -> AuthParams {
        AuthParams {
            scope: Some("openid".into()),
            response_type: Some("code".into()),
            client_id: Some("portal".into()),
            redirect_uri: Some("http://localhost:3000/callback".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_for_code_flow() {
        let (rt, sc) = supported();
        let req = AuthRequest::parse(params(), &rt, &sc).unwrap();
        assert_eq!(req.response_mode, ResponseMode::Query);
        assert_eq!(req.code_challenge_method, CodeChallengeMethod::Plain);
        assert_eq!(req.max_age, 0);
    }

    #[test]
    fn hybrid_defaults_to_fragment_and_ignores_order() {
        let (rt, sc) = supported();
        let mut p = params();
        p.response_type = Some("token id_token".into());
        let req = AuthRequest::parse(p, &rt, &sc).unwrap();
        assert_eq!(req.response_mode, ResponseMode::Fragment);
    }

    #[test]
    fn rejects_bad_requests() {
        let (rt, sc) = supported();

        let mut p = params();
        p.client_id = None;
        assert_eq!(AuthRequest::parse(p, &rt, &sc).unwrap_err(), ErrorKind::InvalidRequest);

        let mut p = params();
        p.prompt = Some("none login".into());
        assert_eq!(AuthRequest::parse(p, &rt, &sc).unwrap_err(), ErrorKind::InvalidRequest);

        let mut p = params();
        p.response_type = Some("code token".into());
        assert_eq!(
            AuthRequest::parse(p, &rt, &sc).unwrap_err(),
            ErrorKind::UnsupportedResponseType
        );

        let mut p = params();
        p.scope = Some("openid email".into());
        assert_eq!(AuthRequest::parse(p, &rt, &sc).unwrap_err(), ErrorKind::InvalidScope);

        let mut p = params();
        p.code_challenge_method = Some("S256".into());
        assert_eq!(AuthRequest::parse(p, &rt, &sc).unwrap_err(), ErrorKind::InvalidRequest);

        let mut p = params();
        p.request = Some("eyJ...".into());
        assert_eq!(
            AuthRequest::parse(p, &rt, &sc).unwrap_err(),
            ErrorKind::RequestNotSupported
        );
    }

    #[test]
    fn configured_response_types_are_order_insensitive() {
        let supported = vec!["token code".to_string(), " id_token  token ".to_string()];
        let req = |t: &[&str]| t.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(validate_response_type(&req(&["code", "token"]), &supported).is_ok());
        assert!(validate_response_type(&req(&["token", "code"]), &supported).is_ok());
        assert!(validate_response_type(&req(&["token", "id_token"]), &supported).is_ok());
        let err = validate_response_type(&req(&["code"]), &supported).unwrap_err();
        assert!(err.is(ErrorKind::UnsupportedResponseType));
    }

    #[test]
    fn pkce_s256_matches_rfc7636_vector() {
        let verifier = "dBjftJeZ4CVP-mJ92IZU6Pa2lsjGaKwmkMYmmpCWQ6s";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert!(CodeChallengeMethod::S256.verify(challenge, verifier));
        assert!(!CodeChallengeMethod::S256.verify(challenge, "wrong"));
        assert!(CodeChallengeMethod::Plain.verify("abc", "abc"));
    }
}
