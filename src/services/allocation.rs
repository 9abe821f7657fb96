use crate::error::{AppError, AppResult};
use crate::models::{AllocatedBlock, PaymentStatus, TicketRange};
use crate::repositories::RaffleStore;
use crate::services::{AuditTrailService, NotificationService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Ticket Allocator: converts a completed payment into a contiguous block
/// of globally unique ticket numbers, exactly once per entry.
///
/// The atomicity of the reserve-and-write unit lives in the store
/// (allocate_block); this service owns the policy around it: payment-state
/// preconditions, the close-time cutoff, idempotent replay for retried
/// webhooks, bounded retry on conflict, and reconciliation reporting when a
/// paid entry permanently fails to receive tickets.
pub struct AllocationService {
    store: Arc<dyn RaffleStore>,
    notifier: Arc<NotificationService>,
    audit: Option<Arc<AuditTrailService>>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AllocationService {
    /// Create a new allocation service
    pub fn new(
        store: Arc<dyn RaffleStore>,
        notifier: Arc<NotificationService>,
        max_retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            audit: None,
            max_retries,
            retry_backoff,
        }
    }

    /// Attach the audit trail
    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Allocate the entry's ticket block.
    ///
    /// Safe to call any number of times for the same entry, sequentially or
    /// concurrently: every call converges on the one range the entry owns.
    pub async fn allocate_tickets(&self, entry_id: Uuid) -> AppResult<AllocatedBlock> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let entry = self
            .store
            .find_entry(entry_id)
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::EntryNotFound(entry_id))?;

        if entry.raffle_id != raffle.id {
            return Err(AppError::Validation(format!(
                "entry {} does not belong to the active raffle",
                entry_id
            )));
        }

        match entry.payment_status_enum() {
            PaymentStatus::Completed => {}
            status => {
                return Err(AppError::EntryNotCompleted {
                    id: entry_id,
                    status: status.as_str().to_string(),
                });
            }
        }

        // Idempotent fast path: a previously issued range is returned as-is,
        // even after the raffle closed. Only new issuance is cut off below.
        let existing = self
            .store
            .tickets_for_entry(entry_id)
            .await
            .map_err(AppError::from)?;

        if let Some(range) = TicketRange::from_tickets(&existing) {
            info!(
                "Tickets already assigned to entry {} ({}-{})",
                entry_id, range.start_number, range.end_number
            );
            return Ok(AllocatedBlock {
                range,
                freshly_allocated: false,
            });
        }

        let now = chrono::Utc::now().naive_utc();
        if raffle.has_ended_at(now) {
            // Completed payment, closed raffle: refuse and hand the entry to
            // the reconciliation path.
            self.report_failure(raffle.id, entry_id, "raffle closed before allocation")
                .await;
            return Err(AppError::RaffleClosed {
                ended_at: raffle.end_date,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            match self.store.allocate_block(raffle.id, entry_id).await {
                Ok(block) => {
                    if block.freshly_allocated {
                        info!(
                            "Assigned {} tickets ({} to {}) to {}",
                            entry.count, block.range.start_number, block.range.end_number, entry.email
                        );
                        if let Some(audit) = &self.audit {
                            if let Err(e) = audit.log_tickets_allocated(&entry, &block).await {
                                warn!("Audit write failed for entry {}: {}", entry_id, e);
                            }
                        }
                        self.notifier.tickets_allocated(&entry, &block).await;
                    }
                    return Ok(block);
                }
                Err(e) => {
                    let app_err: AppError = e.into();

                    if app_err.is_conflict() && attempt < self.max_retries {
                        attempt += 1;
                        let delay = self.retry_backoff * 2u32.saturating_pow(attempt - 1);
                        warn!(
                            "Allocation conflict for entry {} (attempt {}/{}), retrying in {:?}",
                            entry_id, attempt, self.max_retries, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    // Payment succeeded but issuance failed: reportable,
                    // trackable, never silently dropped.
                    error!(
                        "Ticket allocation permanently failed for completed entry {}: {}",
                        entry_id, app_err
                    );
                    self.report_failure(raffle.id, entry_id, &app_err.to_string())
                        .await;
                    return Err(app_err);
                }
            }
        }
    }

    async fn report_failure(&self, raffle_id: Uuid, entry_id: Uuid, reason: &str) {
        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_allocation_failed(raffle_id, entry_id, reason).await {
                warn!("Audit write failed for entry {}: {}", entry_id, e);
            }
        }
        self.notifier
            .allocation_failed(raffle_id, entry_id, reason)
            .await;
    }
}
