pub mod password;
pub mod random;
pub mod validation;

pub use password::{check_password_policy, hash_password, verify_password, Password, PasswordHashString};
pub use validation::ValidatedForm;
