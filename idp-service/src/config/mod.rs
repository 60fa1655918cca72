use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct IdpConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub admin: AdminConfig,
    pub oidc: OidcConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

/// Bootstrap administrator of the master project.
#[derive(Clone, Deserialize)]
pub struct AdminConfig {
    pub name: String,
    pub password: String,
    pub portal_callback_urls: Vec<String>,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("name", &self.name)
            .field("password", &"***")
            .field("portal_callback_urls", &self.portal_callback_urls)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    /// Scheme and authority the issuer is built from, without a trailing slash.
    pub issuer_base_url: String,
    pub supported_scopes: Vec<String>,
    pub supported_response_types: Vec<String>,
    /// Seconds.
    pub login_session_expires_in: u64,
    pub auth_code_expires_in: u64,
    pub sso_expires_in: u64,
    pub device_code_expires_in: u64,
    pub device_poll_interval: u64,
    pub https_enabled: bool,
}

impl OidcConfig {
    /// Token issuer of a project.
    pub fn issuer(&self, project: &str) -> String {
        format!("{}/api/v1/project/{}", self.issuer_base_url, project)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub gc_interval_secs: u64,
    /// 0 disables the per-call deadline.
    pub call_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }
}

const DEFAULT_RESPONSE_TYPES: &str =
    "code,id_token,token,code id_token,code token,id_token token,code id_token token";

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "idp-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            admin: AdminConfig {
                name: "admin".to_string(),
                password: "password".to_string(),
                portal_callback_urls: vec!["http://localhost:3000/callback".to_string()],
            },
            oidc: OidcConfig {
                issuer_base_url: "http://localhost:8080".to_string(),
                supported_scopes: vec!["openid".to_string()],
                supported_response_types: split_list(DEFAULT_RESPONSE_TYPES),
                login_session_expires_in: 300,
                auth_code_expires_in: 300,
                sso_expires_in: 1_209_600,
                device_code_expires_in: 600,
                device_poll_interval: 5,
                https_enabled: false,
            },
            database: DatabaseConfig {
                gc_interval_secs: 3600,
                call_timeout_secs: 0,
            },
        }
    }
}

impl IdpConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let defaults = IdpConfig::default();

        let port = common_config.port;
        let config = IdpConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("idp-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            admin: AdminConfig {
                name: get_env("ADMIN_NAME", Some("admin"), false)?,
                password: get_env("ADMIN_PASSWORD", Some("password"), is_prod)?,
                portal_callback_urls: split_list(&get_env(
                    "PORTAL_CALLBACK_URLS",
                    Some("http://localhost:3000/callback"),
                    false,
                )?),
            },
            oidc: OidcConfig {
                issuer_base_url: get_env(
                    "ISSUER_BASE_URL",
                    Some(format!("http://localhost:{}", port).as_str()),
                    is_prod,
                )?
                .trim_end_matches('/')
                .to_string(),
                supported_scopes: split_list(&get_env("SUPPORTED_SCOPES", Some("openid"), false)?),
                supported_response_types: split_list(&get_env(
                    "SUPPORTED_RESPONSE_TYPES",
                    Some(DEFAULT_RESPONSE_TYPES),
                    false,
                )?),
                login_session_expires_in: parse_env("LOGIN_SESSION_EXPIRES_IN", defaults.oidc.login_session_expires_in)?,
                auth_code_expires_in: parse_env("AUTH_CODE_EXPIRES_IN", defaults.oidc.auth_code_expires_in)?,
                sso_expires_in: parse_env("SSO_EXPIRES_IN", defaults.oidc.sso_expires_in)?,
                device_code_expires_in: parse_env("DEVICE_CODE_EXPIRES_IN", defaults.oidc.device_code_expires_in)?,
                device_poll_interval: parse_env("DEVICE_POLL_INTERVAL", defaults.oidc.device_poll_interval)?,
                https_enabled: parse_env("HTTPS_ENABLED", false)?,
            },
            database: DatabaseConfig {
                gc_interval_secs: parse_env("DB_GC_INTERVAL_SECS", defaults.database.gc_interval_secs)?,
                call_timeout_secs: parse_env("DATABASE_CALL_TIMEOUT_SECS", 0)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        let lifetimes = [
            ("LOGIN_SESSION_EXPIRES_IN", self.oidc.login_session_expires_in),
            ("AUTH_CODE_EXPIRES_IN", self.oidc.auth_code_expires_in),
            ("SSO_EXPIRES_IN", self.oidc.sso_expires_in),
            ("DEVICE_CODE_EXPIRES_IN", self.oidc.device_code_expires_in),
            ("DB_GC_INTERVAL_SECS", self.database.gc_interval_secs),
        ];
        for (key, value) in lifetimes {
            if value == 0 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be positive",
                    key
                )));
            }
        }

        if self.admin.name.is_empty() || self.admin.password.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ADMIN_NAME and ADMIN_PASSWORD must not be empty"
            )));
        }

        if !self.oidc.supported_scopes.iter().any(|s| s == "openid") {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SUPPORTED_SCOPES must include openid"
            )));
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod {
            if !self.oidc.https_enabled {
                tracing::error!("HTTPS is disabled in production; SSO cookies will not be marked Secure");
            }
            if self.admin.password == "password" {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Default ADMIN_PASSWORD is not allowed in production"
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        }),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = IdpConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.oidc.issuer("master"), "http://localhost:8080/api/v1/project/master");
        assert_eq!(config.database.call_timeout(), None);
        assert_eq!(config.oidc.supported_response_types.len(), 7);
    }

    #[test]
    fn zero_lifetime_is_rejected() {
        let mut config = IdpConfig::default();
        config.oidc.login_session_expires_in = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_admin_is_rejected() {
        let mut config = IdpConfig::default();
        config.admin.password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn list_splitting_trims_and_drops_blanks() {
        assert_eq!(split_list("openid, profile,,"), vec!["openid", "profile"]);
        assert_eq!(split_list("code id_token,token")[0], "code id_token");
    }

    #[test]
    fn debug_hides_admin_password() {
        let config = IdpConfig::default();
        assert!(!format!("{:?}", config.admin).contains("\"password\""));
    }
}
