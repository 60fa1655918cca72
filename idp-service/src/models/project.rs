//! Project (tenant) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::services::ServiceError;

use super::is_valid_resource_name;

/// Bootstrap project; holds the administrator and cannot be deleted.
pub const MASTER_PROJECT: &str = "master";

pub const DEFAULT_ACCESS_TOKEN_LIFE_SPAN: u64 = 5 * 60;
pub const DEFAULT_REFRESH_TOKEN_LIFE_SPAN: u64 = 14 * 24 * 60 * 60;
pub const SIGNING_ALGORITHM_RS256: &str = "RS256";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub token_config: TokenConfig,
    pub password_policy: PasswordPolicy,
    pub user_lock: UserLock,
    pub allowed_grant_types: Vec<GrantType>,
    pub permit_delete: bool,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Seconds.
    pub access_token_life_span: u64,
    /// Seconds.
    pub refresh_token_life_span: u64,
    pub signing_algorithm: String,
    /// PKCS#1 DER.
    pub sign_public_key: Vec<u8>,
    /// PKCS#1 DER.
    pub sign_secret_key: Vec<u8>,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_token_life_span", &self.access_token_life_span)
            .field("refresh_token_life_span", &self.refresh_token_life_span)
            .field("signing_algorithm", &self.signing_algorithm)
            .field("sign_public_key_len", &self.sign_public_key.len())
            .finish_non_exhaustive()
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_life_span: DEFAULT_ACCESS_TOKEN_LIFE_SPAN,
            refresh_token_life_span: DEFAULT_REFRESH_TOKEN_LIFE_SPAN,
            signing_algorithm: SIGNING_ALGORITHM_RS256.to_string(),
            sign_public_key: Vec::new(),
            sign_secret_key: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterType {
    Lower,
    Upper,
    Both,
    Either,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordPolicy {
    pub minimum_length: usize,
    pub not_user_name: bool,
    pub black_list: Vec<String>,
    pub use_character: Option<CharacterType>,
    pub use_digit: bool,
    pub use_special_character: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLock {
    pub enabled: bool,
    pub max_login_failure: u32,
    /// Sliding window, seconds.
    pub lock_duration: u64,
    /// How long a lock holds after the last failure, seconds.
    pub failure_reset_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "refresh_token")]
    RefreshToken,
    #[serde(rename = "urn:ietf:params:oauth:grant-type:device_code")]
    DeviceCode,
}

impl GrantType {
    pub const ALL: [GrantType; 5] = [
        GrantType::AuthorizationCode,
        GrantType::ClientCredentials,
        GrantType::Password,
        GrantType::RefreshToken,
        GrantType::DeviceCode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::Password => "password",
            GrantType::RefreshToken => "refresh_token",
            GrantType::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrantType::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| format!("Unknown grant type: {}", s))
    }
}

impl Project {
    /// A project with default token lifespans, no lockout and every grant type.
    /// Signing keys are filled in when the project is stored.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            token_config: TokenConfig::default(),
            password_policy: PasswordPolicy::default(),
            user_lock: UserLock::default(),
            allowed_grant_types: GrantType::ALL.to_vec(),
            permit_delete: true,
        }
    }

    pub fn allows(&self, grant: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !is_valid_resource_name(&self.name) {
            return Err(ServiceError::validation("Invalid project name format")
                .note(format!("project name {:?}", self.name)));
        }

        let tc = &self.token_config;
        if tc.access_token_life_span < 1 {
            return Err(ServiceError::validation(
                "Access token life span must be at least 1 second",
            ));
        }
        if tc.refresh_token_life_span < 1 {
            return Err(ServiceError::validation(
                "Refresh token life span must be at least 1 second",
            ));
        }
        if tc.signing_algorithm != SIGNING_ALGORITHM_RS256 {
            return Err(ServiceError::validation(format!(
                "Unsupported signing algorithm {}",
                tc.signing_algorithm
            )));
        }

        if self.user_lock.enabled && self.user_lock.max_login_failure == 0 {
            return Err(ServiceError::validation(
                "Max login failure must be positive when user lock is enabled",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_round_trips_wire_names() {
        for grant in GrantType::ALL {
            assert_eq!(grant.as_str().parse::<GrantType>(), Ok(grant));
        }
        assert!("implicit".parse::<GrantType>().is_err());
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        assert!(Project::new("master").validate().is_ok());
        assert!(Project::new("x").validate().is_err());

        let mut p = Project::new("tenant-a");
        p.token_config.signing_algorithm = "HS256".to_string();
        assert!(p.validate().is_err());

        let mut p = Project::new("tenant-a");
        p.token_config.access_token_life_span = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn debug_output_does_not_leak_keys() {
        let mut tc = TokenConfig::default();
        tc.sign_secret_key = vec![0xde, 0xad, 0xbe, 0xef];
        assert!(!format!("{:?}", tc).contains("222"));
    }
}
