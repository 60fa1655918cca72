//! Tenant state persisted behind the storage handlers.

pub mod auth_request;
pub mod client;
pub mod custom_role;
pub mod device;
pub mod login_session;
pub mod project;
pub mod session;
pub mod user;

pub use auth_request::{AuthParams, AuthRequest, CodeChallengeMethod, ResponseMode};
pub use client::{AccessType, Client, PORTAL_CLIENT_ID};
pub use custom_role::CustomRole;
pub use device::Device;
pub use login_session::LoginSession;
pub use project::{
    CharacterType, GrantType, PasswordPolicy, Project, TokenConfig, UserLock, MASTER_PROJECT,
};
pub use session::Session;
pub use user::{LockState, User};

/// Project names, client ids and custom role names share one shape:
/// a lowercase letter followed by 3 to 63 of `[a-z0-9-._]`.
pub fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some('a'..='z'));
    let len = name.chars().count();
    first_ok
        && (4..=64).contains(&len)
        && chars.all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-' | '.' | '_'))
}

pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names() {
        assert!(is_valid_resource_name("master"));
        assert!(is_valid_resource_name("portal"));
        assert!(is_valid_resource_name("my-app.v2_x"));
        assert!(!is_valid_resource_name("abc"));
        assert!(!is_valid_resource_name("Master"));
        assert!(!is_valid_resource_name("1project"));
        assert!(!is_valid_resource_name("has space"));
        assert!(!is_valid_resource_name(&"a".repeat(65)));
    }
}
