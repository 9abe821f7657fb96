use crate::error::{AppError, AppResult};
use crate::models::{AllocatedBlock, Entry, Winner};
use crate::services::integrity::PoolReport;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    pub event_type: String, // "tickets_allocated", "winner_selected", etc.
    pub raffle_id: Option<Uuid>,
    pub entry_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Append-only audit trail for every pool-mutating action and every
/// integrity finding. The file is the reconciliation source of record for
/// payments whose ticket issuance permanently failed.
pub struct AuditTrailService {
    #[allow(dead_code)]
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    /// Create a new audit trail service
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        // Ensure directory exists
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        // Create log file with date
        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        // Open file in append mode
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry).map_err(AppError::Serialization)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Log a freshly allocated ticket block
    pub async fn log_tickets_allocated(
        &self,
        entry: &Entry,
        block: &AllocatedBlock,
    ) -> AppResult<()> {
        let record = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "tickets_allocated".to_string(),
            raffle_id: Some(entry.raffle_id),
            entry_id: Some(entry.id),
            details: serde_json::json!({
                "email": entry.email,
                "count": entry.count,
                "start_number": block.range.start_number,
                "end_number": block.range.end_number,
            }),
        };

        self.log(record).await
    }

    /// Log a permanently failed allocation for a completed payment.
    /// These records feed the operator reconciliation path.
    pub async fn log_allocation_failed(
        &self,
        raffle_id: Uuid,
        entry_id: Uuid,
        reason: &str,
    ) -> AppResult<()> {
        let record = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "allocation_failed".to_string(),
            raffle_id: Some(raffle_id),
            entry_id: Some(entry_id),
            details: serde_json::json!({
                "reason": reason,
            }),
        };

        self.log(record).await
    }

    /// Log a recorded winner, seed included so the draw stays recomputable
    /// from the audit trail alone
    pub async fn log_winner_selected(&self, winner: &Winner) -> AppResult<()> {
        let record = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "winner_selected".to_string(),
            raffle_id: Some(winner.raffle_id),
            entry_id: Some(winner.winner_entry_id),
            details: serde_json::json!({
                "slot": winner.slot,
                "winning_ticket_number": winner.winning_ticket_number,
                "winner_email": winner.winner_email,
                "total_tickets_in_pool": winner.total_tickets_in_pool,
                "seed": winner.seed,
                "derivation": winner.derivation,
            }),
        };

        self.log(record).await
    }

    /// Log an integrity report that found violations
    pub async fn log_integrity_report(
        &self,
        raffle_id: Uuid,
        report: &PoolReport,
    ) -> AppResult<()> {
        let record = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event_type: "integrity_violation".to_string(),
            raffle_id: Some(raffle_id),
            entry_id: None,
            details: serde_json::json!({
                "total_tickets": report.total_tickets,
                "expected_tickets": report.expected_tickets,
                "issues": report.issues,
            }),
        };

        self.log(record).await
    }
}
