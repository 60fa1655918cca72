use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthRequest, CodeChallengeMethod, ResponseMode};

/// One authorization attempt, from the authorization request until its code
/// is redeemed or the row expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    pub session_id: String,
    pub project_name: String,
    /// Single-use authorization code, set once the user has authenticated.
    pub code: Option<String>,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: String,
    pub nonce: String,
    pub response_type: Vec<String>,
    pub response_mode: ResponseMode,
    pub prompt: Vec<String>,
    pub scope: String,
    pub max_age: u64,
    pub expires_date: DateTime<Utc>,
    pub user_id: Option<String>,
    pub login_date: Option<DateTime<Utc>>,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    /// Paired with a [`Device`](super::Device); kept after login so the
    /// polling device can observe completion.
    pub for_device: bool,
}

impl LoginSession {
    pub fn from_request(project_name: impl Into<String>, req: &AuthRequest, ttl_secs: u64) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            code: None,
            client_id: req.client_id.clone(),
            redirect_uri: req.redirect_uri.clone(),
            state: req.state.clone(),
            nonce: req.nonce.clone(),
            response_type: req.response_type.clone(),
            response_mode: req.response_mode,
            prompt: req.prompt.clone(),
            scope: req.scope.clone(),
            max_age: req.max_age,
            expires_date: Utc::now() + Duration::seconds(ttl_secs as i64),
            user_id: None,
            login_date: None,
            code_challenge: req.code_challenge.clone(),
            code_challenge_method: req.code_challenge_method,
            for_device: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_date
    }

    pub fn wants(&self, response_type: &str) -> bool {
        self.response_type.iter().any(|t| t == response_type)
    }

    pub fn has_prompt(&self, value: &str) -> bool {
        self.prompt.iter().any(|p| p == value)
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() && self.login_date.is_some()
    }

    pub fn bind_user(&mut self, user_id: impl Into<String>, at: DateTime<Utc>) {
        self.user_id = Some(user_id.into());
        self.login_date = Some(at);
    }
}
