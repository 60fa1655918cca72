use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A live refresh-token binding. Deleting the row revokes the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub project_name: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    /// Seconds.
    pub expires_in: u64,
    pub from_ip: String,
    pub last_auth_time: DateTime<Utc>,
    /// Seconds, 0 when the request carried no max_age.
    pub auth_max_age: u64,
    pub audiences: Vec<String>,
}

impl Session {
    pub fn new(
        project_name: impl Into<String>,
        user_id: impl Into<String>,
        expires_in: u64,
        audiences: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            user_id: user_id.into(),
            created_at: now,
            expires_in,
            from_ip: String::new(),
            last_auth_time: now,
            auth_max_age: 0,
            audiences,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.expires_in as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_exclusive_of_the_boundary() {
        let s = Session::new("master", "u1", 60, vec![]);
        assert!(!s.is_expired(s.created_at + Duration::seconds(60)));
        assert!(s.is_expired(s.created_at + Duration::seconds(61)));
    }
}
