use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Pairing between a polling device and the login session a user completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_code: String,
    pub user_code: String,
    pub project_name: String,
    pub login_session_id: String,
    pub created_at: DateTime<Utc>,
    /// Seconds.
    pub expires_in: u64,
}

impl Device {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.created_at + Duration::seconds(self.expires_in as i64)
    }
}
