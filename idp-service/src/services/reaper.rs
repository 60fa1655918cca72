//! Background purge of expired login sessions, sessions and devices.

use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::database::{Database, PurgeReport};
use super::ServiceError;

pub struct Reaper {
    db: Database,
    interval: Duration,
    shutdown_token: CancellationToken,
}

/// Running reaper task.
pub struct ReaperHandle {
    shutdown_token: CancellationToken,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the task and wait for it to exit.
    pub async fn stop(self) {
        tracing::info!("Stopping expiry reaper");
        self.shutdown_token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Expiry reaper task ended abnormally");
        }
    }
}

impl Reaper {
    pub fn new(db: Database, interval: Duration) -> Self {
        Self {
            db,
            interval,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// One purge as of now.
    pub async fn sweep_once(&self) -> Result<PurgeReport, ServiceError> {
        let report = self.db.delete_expired(Utc::now()).await?;
        if report.total() > 0 {
            tracing::info!(
                login_sessions = report.login_sessions,
                sessions = report.sessions,
                devices = report.devices,
                "Purged expired entries"
            );
        }
        Ok(report)
    }

    pub fn spawn(self) -> ReaperHandle {
        let shutdown_token = self.shutdown_token.clone();
        tracing::info!(interval_secs = self.interval.as_secs(), "Starting expiry reaper");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = self.shutdown_token.cancelled() => {
                        tracing::info!("Expiry reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e.describe(), "Expiry sweep failed");
                        }
                    }
                }
            }
        });

        ReaperHandle { shutdown_token, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryBackend;
    use crate::services::audit::MemoryAuditSink;
    use std::sync::Arc;

    #[tokio::test]
    async fn spawned_reaper_stops_on_signal() {
        let db = Database::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryAuditSink::new()));
        let handle = Reaper::new(db, Duration::from_secs(3600)).spawn();
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("reaper did not stop");
    }

    #[tokio::test]
    async fn empty_store_sweeps_nothing() {
        let db = Database::new(Arc::new(MemoryBackend::new()), Arc::new(MemoryAuditSink::new()));
        let report = Reaper::new(db, Duration::from_secs(60)).sweep_once().await.unwrap();
        assert_eq!(report.total(), 0);
    }
}
