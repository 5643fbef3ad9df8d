//! The audit logger: the handle every other crate holds to append and
//! query audit events. Wraps a storage backend behind an `Arc<dyn
//! AuditStorage>` trait object, mirroring the base codebase's audit crate
//! (`AuditLogger` wrapping `Box<dyn AuditStorage>`), generalized to a
//! shared, cloneable handle since the gateway's audit writer is a true
//! process-global collaborator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gateway_core::model::{AuditEvent, AuditEventKind, Severity};

use crate::error::AuditError;
use crate::storage::{AuditFilter, AuditStorage, NewAuditEvent};

#[derive(Clone)]
pub struct AuditLogger {
    storage: Arc<dyn AuditStorage>,
    retention_days: i64,
}

impl AuditLogger {
    pub fn new(storage: Arc<dyn AuditStorage>, retention_days: i64) -> Self {
        Self { storage, retention_days }
    }

    /// Appends an audit event, logging it to `tracing` at the same time.
    /// Every security-relevant decision in the gateway is expected to call
    /// this before returning to the client.
    pub async fn log(
        &self,
        kind: AuditEventKind,
        severity: Severity,
        user_id: Option<String>,
        resource_type: Option<String>,
        resource_id: Option<String>,
        success: bool,
        details: serde_json::Value,
    ) -> Result<AuditEvent, AuditError> {
        let event = NewAuditEvent {
            occurred_at: Utc::now(),
            kind,
            severity,
            user_id,
            resource_type,
            resource_id,
            success,
            details,
        };

        match severity {
            Severity::Info => tracing::info!(?kind, success, "audit event"),
            Severity::Warn => tracing::warn!(?kind, success, "audit event"),
            Severity::Error => tracing::error!(?kind, success, "audit event"),
        }

        self.storage.append(event).await
    }

    pub async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEvent>, AuditError> {
        self.storage.query(filter).await
    }

    pub async fn get(&self, event_id: i64) -> Result<Option<AuditEvent>, AuditError> {
        self.storage.get(event_id).await
    }

    /// Spawns the periodic retention sweep: deletes
    /// events older than the configured retention window. Returns the
    /// task handle so the caller can abort it on shutdown.
    pub fn spawn_retention_sweep(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let storage = self.storage.clone();
        let retention_days = self.retention_days;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let cutoff = Utc::now() - chrono::Duration::days(retention_days);
                match storage.delete_before(cutoff).await {
                    Ok(n) if n > 0 => tracing::info!(removed = n, "audit retention sweep"),
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "audit retention sweep failed"),
                }
            }
        })
    }
}
