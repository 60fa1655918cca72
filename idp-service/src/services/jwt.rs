//! Token codec.
//!
//! Every project signs with its own RS256 key pair. Tokens carry the
//! project name in a `project` claim, which is read before verification to
//! pick the key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::project::SIGNING_ALGORITHM_RS256;
use crate::models::Project;

use super::database::Transaction;
use super::{ErrorKind, ResultExt, ServiceError};

const RSA_KEY_BITS: usize = 2048;

/// Inputs shared by every token kind.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub issuer: String,
    pub project: String,
    /// `None` for tokens minted without an end user (client credentials).
    pub user_id: Option<String>,
    /// Seconds.
    pub ttl: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleValue {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAccess {
    pub system_management: RoleValue,
    pub user: RoleValue,
}

/// Claims for access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub project: String,
    pub resource_access: ResourceAccess,
    pub preferred_username: String,
}

/// Claims for refresh tokens; `sessionID` joins the token to a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub project: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub jti: String,
    pub iss: String,
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub project: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    pub auth_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoTokenClaims {
    pub iss: String,
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub project: String,
}

#[derive(Debug, Clone)]
pub struct IdTokenExtras {
    pub nonce: String,
    pub auth_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ProjectClaim {
    project: String,
}

/// Signing and verification keys of one project.
pub struct ProjectSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl ProjectSigner {
    pub fn from_project(project: &Project) -> Result<Self, ServiceError> {
        let tc = &project.token_config;
        if tc.signing_algorithm != SIGNING_ALGORITHM_RS256 {
            return Err(ServiceError::new(
                ErrorKind::SigningError,
                "Unsupported signing algorithm",
            )
            .note(format!(
                "project {} uses {}",
                project.name, tc.signing_algorithm
            )));
        }
        if tc.sign_secret_key.is_empty() || tc.sign_public_key.is_empty() {
            return Err(ServiceError::new(ErrorKind::SigningError, "Signing key is missing")
                .note(format!("project {}", project.name)));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_rsa_der(&tc.sign_secret_key),
            decoding_key: DecodingKey::from_rsa_der(&tc.sign_public_key),
        })
    }

    pub fn sign<C: Serialize>(&self, claims: &C) -> Result<String, ServiceError> {
        encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key).map_err(|e| {
            ServiceError::new(ErrorKind::SigningError, "Failed to sign token").note(e.to_string())
        })
    }

    /// Check signature and expiry. Audience and issuer are left to the caller.
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<C, ServiceError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        decode::<C>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => {
                    ServiceError::new(ErrorKind::ExpiredToken, "Token is expired")
                }
                _ => ServiceError::new(ErrorKind::InvalidToken, "Invalid token").note(e.to_string()),
            })
    }
}

/// Fresh RS256 key pair as PKCS#1 DER `(secret, public)`.
///
/// CPU heavy; call it from `spawn_blocking`.
pub fn generate_rs256_key_pair() -> Result<(Vec<u8>, Vec<u8>), ServiceError> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS).map_err(ServiceError::internal)?;
    let public = RsaPublicKey::from(&private);

    let secret_der = private.to_pkcs1_der().map_err(ServiceError::internal)?;
    let public_der = public.to_pkcs1_der().map_err(ServiceError::internal)?;
    Ok((secret_der.as_bytes().to_vec(), public_der.as_bytes().to_vec()))
}

/// Read the `project` claim without checking the signature.
fn peek_project(token: &str) -> Result<String, ServiceError> {
    let invalid = || ServiceError::new(ErrorKind::InvalidToken, "Invalid token format");

    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(invalid()),
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
    let claim: ProjectClaim = serde_json::from_slice(&bytes).map_err(|_| invalid())?;
    Ok(claim.project)
}

fn check_issuer(actual: &str, expected: &str) -> Result<(), ServiceError> {
    if actual.starts_with(expected) {
        Ok(())
    } else {
        Err(ServiceError::new(ErrorKind::InvalidToken, "Unexpected token issuer")
            .note(format!("want {}, got {}", expected, actual)))
    }
}

async fn signer_for(tx: &mut Transaction, project: &str) -> Result<ProjectSigner, ServiceError> {
    let project = tx.project_get(project).await?;
    ProjectSigner::from_project(&project)
}

/// Signer for a token's own project; a missing project makes the token invalid.
async fn signer_for_token(tx: &mut Transaction, token: &str) -> Result<ProjectSigner, ServiceError> {
    let project = peek_project(token)?;
    match tx.project_get(&project).await {
        Ok(p) => ProjectSigner::from_project(&p),
        Err(e) if e.is(ErrorKind::ProjectNotFound) => Err(e.with_kind(ErrorKind::InvalidToken)),
        Err(e) => Err(e),
    }
}

fn window(ttl: u64) -> (i64, i64) {
    let now = Utc::now();
    (now.timestamp(), (now + Duration::seconds(ttl as i64)).timestamp())
}

pub async fn generate_access_token(
    tx: &mut Transaction,
    audiences: &[String],
    req: &TokenRequest,
) -> Result<String, ServiceError> {
    let signer = signer_for(tx, &req.project).await?;

    let mut resource_access = ResourceAccess::default();
    let mut preferred_username = String::new();
    let mut sub = String::new();

    if let Some(user_id) = &req.user_id {
        let user = tx.user_get(&req.project, user_id).await.note("access token subject")?;
        let mut custom_names = Vec::with_capacity(user.custom_roles.len());
        for role_id in &user.custom_roles {
            let role = tx.custom_role_get(&req.project, role_id).await?;
            custom_names.push(role.name);
        }
        resource_access.system_management.roles = user.system_roles.clone();
        resource_access.user.roles = custom_names;
        preferred_username = user.name;
        sub = user.id;
    }

    let (iat, exp) = window(req.ttl);
    signer.sign(&AccessTokenClaims {
        jti: Uuid::new_v4().to_string(),
        iss: req.issuer.clone(),
        sub,
        aud: audiences.to_vec(),
        exp,
        iat,
        project: req.project.clone(),
        resource_access,
        preferred_username,
    })
}

pub async fn generate_refresh_token(
    tx: &mut Transaction,
    session_id: &str,
    audiences: &[String],
    req: &TokenRequest,
) -> Result<String, ServiceError> {
    let signer = signer_for(tx, &req.project).await?;
    let (iat, exp) = window(req.ttl);
    signer.sign(&RefreshTokenClaims {
        jti: Uuid::new_v4().to_string(),
        iss: req.issuer.clone(),
        sub: req.user_id.clone().unwrap_or_default(),
        aud: audiences.to_vec(),
        exp,
        iat,
        project: req.project.clone(),
        session_id: session_id.to_string(),
    })
}

pub async fn generate_id_token(
    tx: &mut Transaction,
    audiences: &[String],
    req: &TokenRequest,
    extras: &IdTokenExtras,
) -> Result<String, ServiceError> {
    let signer = signer_for(tx, &req.project).await?;
    let sub = match &req.user_id {
        Some(user_id) => tx.user_get(&req.project, user_id).await?.id,
        None => String::new(),
    };
    let (iat, exp) = window(req.ttl);
    signer.sign(&IdTokenClaims {
        jti: Uuid::new_v4().to_string(),
        iss: req.issuer.clone(),
        sub,
        aud: audiences.to_vec(),
        exp,
        iat,
        project: req.project.clone(),
        nonce: extras.nonce.clone(),
        auth_time: extras.auth_time.timestamp(),
    })
}

pub async fn generate_sso_token(
    tx: &mut Transaction,
    req: &TokenRequest,
) -> Result<String, ServiceError> {
    let signer = signer_for(tx, &req.project).await?;
    let (iat, exp) = window(req.ttl);
    signer.sign(&SsoTokenClaims {
        iss: req.issuer.clone(),
        sub: req.user_id.clone().unwrap_or_default(),
        exp,
        iat,
        project: req.project.clone(),
    })
}

pub async fn validate_access_token(
    tx: &mut Transaction,
    token: &str,
    expected_issuer: &str,
) -> Result<AccessTokenClaims, ServiceError> {
    let signer = signer_for_token(tx, token).await?;
    let claims: AccessTokenClaims = signer.verify(token)?;
    check_issuer(&claims.iss, expected_issuer)?;
    Ok(claims)
}

pub async fn validate_refresh_token(
    tx: &mut Transaction,
    token: &str,
    expected_issuer: &str,
) -> Result<RefreshTokenClaims, ServiceError> {
    let signer = signer_for_token(tx, token).await?;
    let claims: RefreshTokenClaims = signer.verify(token)?;
    check_issuer(&claims.iss, expected_issuer)?;
    Ok(claims)
}

pub async fn validate_id_token(
    tx: &mut Transaction,
    token: &str,
    expected_issuer: &str,
) -> Result<IdTokenClaims, ServiceError> {
    let signer = signer_for_token(tx, token).await?;
    let claims: IdTokenClaims = signer.verify(token)?;
    check_issuer(&claims.iss, expected_issuer)?;
    Ok(claims)
}

/// Subject of an SSO cookie token issued by `project`.
pub async fn validate_sso_token(
    tx: &mut Transaction,
    project: &str,
    token: &str,
) -> Result<String, ServiceError> {
    let signer = signer_for(tx, project).await?;
    let claims: SsoTokenClaims = signer.verify(token)?;
    if claims.project != project {
        return Err(ServiceError::new(ErrorKind::InvalidToken, "Token belongs to another project"));
    }
    Ok(claims.sub)
}
