use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::audit_log::{self, AuditSeverity, Entity as AuditLog};
use crate::errors::ServiceError;

/// Operations whose audit entries are always escalated: warning when they
/// succeed, critical when they fail.
pub const SENSITIVE_OPERATIONS: &[&str] = &[
    "waste_supply",
    "adjust_inventory",
    "process_expired_supplies",
    "set_supply_status",
    "delete_supply",
];

/// One queued audit entry awaiting the writer task
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub operation: String,
    pub actor_id: Option<Uuid>,
    pub details: Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub severity: AuditSeverity,
}

/// Determine the severity for an audit entry.
///
/// Sensitive operations escalate to warning on success and critical on
/// failure; any other failed operation escalates info to warning.
pub fn severity_for(operation: &str, success: bool) -> AuditSeverity {
    if SENSITIVE_OPERATIONS.contains(&operation) {
        if success {
            AuditSeverity::Warning
        } else {
            AuditSeverity::Critical
        }
    } else if !success {
        AuditSeverity::Warning
    } else {
        AuditSeverity::Info
    }
}

/// Best-effort audit side channel.
///
/// `record` enqueues without blocking and never fails the caller: a full
/// queue drops the entry with a warning (at-most-once delivery). The writer
/// task persists entries outside the mutation transaction, so audit writes
/// can lag the ledger and their failures never roll anything back.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditRecorder {
    /// Create a recorder and the receiving end for [`run_writer`]
    pub fn channel(capacity: usize) -> (AuditRecorder, mpsc::Receiver<AuditEntry>) {
        let (tx, rx) = mpsc::channel(capacity);
        (AuditRecorder { tx }, rx)
    }

    /// Record an operation attempt. Never blocks, never errors.
    pub fn record(
        &self,
        operation: &str,
        actor_id: Option<Uuid>,
        details: Value,
        success: bool,
        error_message: Option<String>,
    ) {
        let entry = AuditEntry {
            operation: operation.to_string(),
            actor_id,
            details,
            success,
            error_message,
            severity: severity_for(operation, success),
        };

        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(entry)) => {
                warn!(
                    operation = %entry.operation,
                    "Audit queue full; dropping audit entry"
                );
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                warn!(
                    operation = %entry.operation,
                    "Audit writer stopped; dropping audit entry"
                );
            }
        }
    }
}

/// Drain the audit queue into the `audit_logs` table.
///
/// Write failures are logged and swallowed; they must not surface to the
/// operation that produced the entry.
pub async fn run_writer(mut rx: mpsc::Receiver<AuditEntry>, db: Arc<DatabaseConnection>) {
    info!("Starting audit writer task");

    while let Some(entry) = rx.recv().await {
        let model = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            operation: Set(entry.operation.clone()),
            actor_id: Set(entry.actor_id),
            details: Set(entry.details),
            success: Set(entry.success),
            error_message: Set(entry.error_message),
            severity: Set(entry.severity),
            created_at: Set(Utc::now()),
        };

        if let Err(e) = model.insert(&*db).await {
            error!(
                operation = %entry.operation,
                error = %e,
                "Failed to persist audit entry"
            );
        }
    }

    info!("Audit writer task stopped");
}

/// Filters for querying the audit trail
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilters {
    pub severity: Option<AuditSeverity>,
    pub operation: Option<String>,
    pub actor_id: Option<Uuid>,
    pub success: Option<bool>,
}

/// Query audit entries, newest first
pub async fn list_entries(
    db: &DatabaseConnection,
    filters: &AuditLogFilters,
    page: u64,
    limit: u64,
) -> Result<(Vec<audit_log::Model>, u64), ServiceError> {
    let mut query = AuditLog::find().order_by_desc(audit_log::Column::CreatedAt);
    if let Some(severity) = filters.severity {
        query = query.filter(audit_log::Column::Severity.eq(severity));
    }
    if let Some(operation) = &filters.operation {
        query = query.filter(audit_log::Column::Operation.eq(operation.clone()));
    }
    if let Some(actor_id) = filters.actor_id {
        query = query.filter(audit_log::Column::ActorId.eq(actor_id));
    }
    if let Some(success) = filters.success {
        query = query.filter(audit_log::Column::Success.eq(success));
    }

    let paginator = query.paginate(db, limit.max(1));
    let total = paginator
        .num_items()
        .await
        .map_err(ServiceError::db_error)?;
    let items = paginator
        .fetch_page(page.max(1) - 1)
        .await
        .map_err(ServiceError::db_error)?;

    Ok((items, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_operations_escalate() {
        assert_eq!(severity_for("waste_supply", true), AuditSeverity::Warning);
        assert_eq!(severity_for("waste_supply", false), AuditSeverity::Critical);
        assert_eq!(
            severity_for("adjust_inventory", false),
            AuditSeverity::Critical
        );
        assert_eq!(
            severity_for("process_expired_supplies", true),
            AuditSeverity::Warning
        );
    }

    #[test]
    fn ordinary_operations_stay_info_unless_failed() {
        assert_eq!(severity_for("checkout_supply", true), AuditSeverity::Info);
        assert_eq!(
            severity_for("checkout_supply", false),
            AuditSeverity::Warning
        );
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (recorder, mut rx) = AuditRecorder::channel(1);

        recorder.record("checkout_supply", None, serde_json::json!({}), true, None);
        recorder.record("checkout_supply", None, serde_json::json!({}), true, None);

        // Only the first entry fits; the second was dropped silently
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
