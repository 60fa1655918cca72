//! Audit trail for mutating operations.
//!
//! One entry is written per facade mutation, whatever its outcome. Writes are
//! fire-and-forget: [`record_async`] spawns the sink call and never blocks the
//! caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub project: String,
    pub resource: &'static str,
    pub method: &'static str,
    /// Identifier of the affected row, empty for collection-level calls.
    pub path: String,
    pub success: bool,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        project: impl Into<String>,
        resource: &'static str,
        method: &'static str,
        path: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            resource,
            method,
            path: path.into(),
            success: true,
            message: String::new(),
            at: Utc::now(),
        }
    }

    /// Fill in the outcome from an operation result.
    pub fn outcome<T>(mut self, result: &Result<T, super::ServiceError>) -> Self {
        match result {
            Ok(_) => {
                self.success = true;
                self.message.clear();
            }
            Err(e) => {
                self.success = false;
                self.message = e.public_message().to_string();
            }
        }
        self
    }

    /// Downgrade to a failure because the enclosing transaction did not commit.
    /// Entries that already failed keep their own message.
    pub fn rolled_back(mut self, reason: &str) -> Self {
        if self.success {
            self.success = false;
            self.message = format!("rolled back: {}", reason);
        }
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> anyhow::Result<()>;
}

/// Emits each entry as a structured event under the `audit` target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> anyhow::Result<()> {
        tracing::info!(
            target: "audit",
            project = %entry.project,
            resource = entry.resource,
            method = entry.method,
            path = %entry.path,
            success = entry.success,
            message = %entry.message,
            at = %entry.at,
            "audit"
        );
        Ok(())
    }
}

/// Keeps entries in memory for inspection in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> anyhow::Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?;
        guard.push(entry);
        Ok(())
    }
}

/// Hand an entry to the sink without waiting for it.
pub fn record_async(sink: &Arc<dyn AuditSink>, entry: AuditEntry) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(
            resource = entry.resource,
            method = entry.method,
            path = %entry.path,
            "Audit entry dropped outside the runtime"
        );
        return;
    };
    let sink = Arc::clone(sink);
    runtime.spawn(async move {
        let resource = entry.resource;
        let method = entry.method;
        if let Err(e) = sink.record(entry).await {
            tracing::error!(error = %e, resource, method, "Failed to write audit entry");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;

    #[tokio::test]
    async fn outcome_captures_public_message() {
        let sink = MemoryAuditSink::new();
        let failed: Result<(), ServiceError> = Err(ServiceError::not_found("No such user"));
        sink.record(AuditEntry::new("master", "USER", "DELETE", "u1").outcome(&failed))
            .await
            .unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert_eq!(entries[0].message, "No such user");
    }

    #[tokio::test]
    async fn record_async_reaches_the_sink() {
        let memory = MemoryAuditSink::new();
        let sink: Arc<dyn AuditSink> = Arc::new(memory.clone());
        record_async(&sink, AuditEntry::new("master", "PROJECT", "POST", "tenant-a"));

        for _ in 0..50 {
            if !memory.entries().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(memory.entries().len(), 1);
    }
}
