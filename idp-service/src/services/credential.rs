//! Password verification with progressive account lockout.

use chrono::{DateTime, Duration, Utc};

use crate::models::{LockState, User};
use crate::utils::password::{check_password_policy, hash_password, verify_password, Password};

use super::database::{atomically, Database, Transaction};
use super::{ErrorKind, ServiceError};

enum Outcome {
    Verified(User),
    /// Failure whose lock-state bookkeeping must still be committed.
    Rejected(ServiceError),
}

#[derive(Clone)]
pub struct CredentialService {
    db: Database,
}

impl CredentialService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn verify_password(
        &self,
        project: &str,
        user_name: &str,
        password: &Password,
    ) -> Result<User, ServiceError> {
        self.verify_password_at(project, user_name, password, Utc::now()).await
    }

    /// Verify as of `now`. Failed attempts are persisted even though the
    /// call returns an error.
    pub async fn verify_password_at(
        &self,
        project: &str,
        user_name: &str,
        password: &Password,
        now: DateTime<Utc>,
    ) -> Result<User, ServiceError> {
        let outcome = atomically!(self.db, |tx| {
            evaluate(&mut tx, project, user_name, password, now).await
        })?;

        match outcome {
            Outcome::Verified(user) => Ok(user),
            Outcome::Rejected(err) => {
                tracing::info!(project = %project, user = %user_name, reason = %err, "Password verification failed");
                Err(err)
            }
        }
    }

    /// Replace a user's password after checking the project's policy.
    pub async fn change_password(
        &self,
        project: &str,
        user_id: &str,
        password: &Password,
    ) -> Result<(), ServiceError> {
        atomically!(self.db, |tx| {
            let policy = tx.project_get(project).await?.password_policy;
            let mut user = tx.user_get(project, user_id).await?;
            check_password_policy(&user.name, password, &policy)?;
            user.password_hash = hash_password(password);
            tx.user_store_credentials(&user).await
        })
    }

    /// Clear a user's lock and failure history.
    pub async fn unlock(&self, project: &str, user_id: &str) -> Result<(), ServiceError> {
        atomically!(self.db, |tx| {
            let mut user = tx.user_get(project, user_id).await?;
            user.lock_state = LockState::default();
            tx.user_store_credentials(&user).await
        })
    }
}

async fn evaluate(
    tx: &mut Transaction,
    project: &str,
    user_name: &str,
    password: &Password,
    now: DateTime<Utc>,
) -> Result<Outcome, ServiceError> {
    let lock = tx.project_get(project).await?.user_lock;

    let mut matches = tx.user_list(project, Some(user_name)).await?;
    if matches.len() != 1 {
        return Ok(Outcome::Rejected(ServiceError::new(
            ErrorKind::AuthFailed,
            "Authentication failed",
        )
        .note(format!("{} users named {:?}", matches.len(), user_name))));
    }
    let Some(mut user) = matches.pop() else {
        return Ok(Outcome::Rejected(ErrorKind::AuthFailed.into()));
    };

    let mut dirty = false;
    if lock.enabled && user.lock_state.locked {
        let reset = Duration::seconds(lock.failure_reset_time as i64);
        match user.lock_state.last_failure() {
            Some(last) if last + reset > now => {
                return Ok(Outcome::Rejected(ErrorKind::UserLocked.into()));
            }
            _ => {
                user.lock_state = LockState::default();
                dirty = true;
            }
        }
    }

    if verify_password(password, &user.password_hash) {
        if lock.enabled && user.lock_state != LockState::default() {
            user.lock_state = LockState::default();
            dirty = true;
        }
        if dirty {
            tx.user_store_credentials(&user).await?;
        }
        return Ok(Outcome::Verified(user));
    }

    if lock.enabled {
        let window_start = now - Duration::seconds(lock.lock_duration as i64);
        let state = &mut user.lock_state;
        state.verify_failed_times.retain(|t| *t > window_start);
        state.verify_failed_times.push(now);
        if state.verify_failed_times.len() >= lock.max_login_failure as usize {
            state.locked = true;
            tracing::info!(project = %project, user_id = %user.id, "User locked after repeated failures");
        }
        dirty = true;
    }
    if dirty {
        tx.user_store_credentials(&user).await?;
    }

    Ok(Outcome::Rejected(ErrorKind::AuthFailed.into()))
}
