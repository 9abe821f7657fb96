use crate::services::{AuditTrailService, IntegrityService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

/// Background task that re-validates the ticket pool on a fixed interval.
///
/// Findings are logged and written to the audit trail, never auto-repaired.
pub struct PoolMonitor {
    integrity: IntegrityService,
    audit: Option<Arc<AuditTrailService>>,
    audit_interval: Duration,
}

impl PoolMonitor {
    /// Create a new pool monitor
    pub fn new(integrity: IntegrityService) -> Self {
        Self {
            integrity,
            audit: None,
            audit_interval: Duration::from_secs(30),
        }
    }

    /// Attach the audit trail
    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Set the audit interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.audit_interval = interval;
        self
    }

    /// Start the monitor background task
    pub async fn start(self) {
        let mut interval = time::interval(self.audit_interval);
        info!(
            "Pool monitor started, will audit every {:?}",
            self.audit_interval
        );

        loop {
            interval.tick().await;

            if let Err(e) = self.audit_pool().await {
                error!("Error auditing ticket pool: {}", e);
            }
        }
    }

    async fn audit_pool(&self) -> crate::error::AppResult<()> {
        let report = match self.integrity.validate_pool().await {
            Ok(report) => report,
            // Nothing to audit until a raffle is configured
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if report.unallocated_demand > 0 {
            warn!(
                "{} completed entries awaiting issuance ({} tickets owed); reconcile if the raffle has closed",
                report.unallocated_entries, report.unallocated_demand
            );
        }

        if report.is_valid {
            info!(
                "Pool audit passed: {} tickets, all invariants hold",
                report.total_tickets
            );
            return Ok(());
        }

        warn!("Pool audit FAILED: {}", report.summary());

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_integrity_report(report.raffle_id, &report).await {
                warn!("Audit write failed for integrity report: {}", e);
            }
        }

        Ok(())
    }
}
