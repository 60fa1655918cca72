use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::fmt;
use subtle::ConstantTimeEq;

use crate::models::{CharacterType, PasswordPolicy};
use crate::services::ServiceError;

const SPECIAL_CHARS: &str = "!#$%&'()-=^~|@`[{]}:*;+,.<>/?_";

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PasswordHashString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHashString(***)")
    }
}

/// Hex-encoded SHA-512 digest of the password.
///
/// The digest is unsalted, so equal passwords hash equally.
pub fn hash_password(password: &Password) -> PasswordHashString {
    PasswordHashString::new(hex::encode(Sha512::digest(password.as_str().as_bytes())))
}

/// Compare a password against a stored digest in constant time.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let candidate = hash_password(password);
    candidate
        .as_str()
        .as_bytes()
        .ct_eq(password_hash.as_str().as_bytes())
        .into()
}

fn policy_error(reason: &str) -> ServiceError {
    ServiceError::validation(format!("Password does not match policy: {}", reason))
}

/// Apply every rule the project's policy sets.
pub fn check_password_policy(
    user_name: &str,
    password: &Password,
    policy: &PasswordPolicy,
) -> Result<(), ServiceError> {
    let pw = password.as_str();

    if policy.minimum_length > 0 && pw.chars().count() < policy.minimum_length {
        return Err(policy_error("too short"));
    }
    if policy.not_user_name && pw == user_name {
        return Err(policy_error("same as user name"));
    }
    if policy.black_list.iter().any(|b| b == pw) {
        return Err(policy_error("black listed"));
    }

    let has_lower = pw.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = pw.chars().any(|c| c.is_ascii_uppercase());
    let chars_ok = match policy.use_character {
        None => true,
        Some(CharacterType::Lower) => has_lower,
        Some(CharacterType::Upper) => has_upper,
        Some(CharacterType::Both) => has_lower && has_upper,
        Some(CharacterType::Either) => has_lower || has_upper,
    };
    if !chars_ok {
        return Err(policy_error("missing required letters"));
    }

    if policy.use_digit && !pw.chars().any(|c| c.is_ascii_digit()) {
        return Err(policy_error("missing digit"));
    }
    if policy.use_special_character && !pw.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(policy_error("missing special character"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password() {
        let hash = hash_password(&Password::new("password"));
        assert_eq!(hash.as_str().len(), 128);
        assert!(hash.as_str().starts_with("b109f3bbbc244eb8"));
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password(&Password::new("mySecurePassword123"));
        assert!(verify_password(&Password::new("mySecurePassword123"), &hash));
        assert!(!verify_password(&Password::new("wrongPassword"), &hash));
    }

    #[test]
    fn test_debug_is_redacted() {
        let pw = Password::new("hunter2");
        assert!(!format!("{:?}", pw).contains("hunter2"));
    }

    #[test]
    fn test_policy_rules() {
        let policy = PasswordPolicy {
            minimum_length: 8,
            not_user_name: true,
            black_list: vec!["password1".to_string()],
            use_character: Some(CharacterType::Both),
            use_digit: true,
            use_special_character: false,
        };

        let check = |pw: &str| check_password_policy("alice-smith", &Password::new(pw), &policy);
        assert!(check("Short1").is_err());
        assert!(check("alllowercase1").is_err());
        assert!(check("NoDigitsHere").is_err());
        assert!(check("password1").is_err());
        assert!(check("Correct1Horse").is_ok());

        let open = PasswordPolicy::default();
        assert!(check_password_policy("bob", &Password::new("bob"), &open).is_ok());
    }
}
