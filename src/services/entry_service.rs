use crate::error::{AppError, AppResult};
use crate::models::{AllocatedBlock, Entry, PaymentStatus, Ticket};
use crate::repositories::RaffleStore;
use crate::services::{AllocationService, NotificationService};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Entry Store boundary: purchase intents and their payment outcomes.
///
/// The external payment gateway reports outcomes here; a completed outcome
/// hands the entry straight to the Ticket Allocator (idempotently, so
/// retried webhooks are harmless).
pub struct EntryService {
    store: Arc<dyn RaffleStore>,
    allocator: Arc<AllocationService>,
    notifier: Arc<NotificationService>,
}

impl EntryService {
    /// Create a new entry service
    pub fn new(
        store: Arc<dyn RaffleStore>,
        allocator: Arc<AllocationService>,
        notifier: Arc<NotificationService>,
    ) -> Self {
        Self {
            store,
            allocator,
            notifier,
        }
    }

    /// Record a purchase intent against the active raffle
    pub async fn create_entry(
        &self,
        email: &str,
        count: i32,
        amount: i64,
        payment_ref: Option<String>,
    ) -> AppResult<Entry> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let now = chrono::Utc::now().naive_utc();
        if raffle.has_ended_at(now) {
            return Err(AppError::RaffleClosed {
                ended_at: raffle.end_date,
            });
        }

        let entry = Entry::new(raffle.id, email, count, amount, payment_ref);
        entry.validate().map_err(AppError::Validation)?;

        let entry = self
            .store
            .insert_entry(entry)
            .await
            .map_err(AppError::from)?;

        info!(
            "Entry {} created: {} x{} for {} cents",
            entry.id, entry.email, entry.count, entry.amount
        );

        Ok(entry)
    }

    /// Find an entry
    pub async fn get_entry(&self, entry_id: Uuid) -> AppResult<Entry> {
        self.store
            .find_entry(entry_id)
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::EntryNotFound(entry_id))
    }

    /// Record the payment gateway's outcome for an entry.
    ///
    /// A completed payment triggers ticket allocation in-line; the returned
    /// block is the allocated range. The payment record itself sticks even
    /// if allocation fails (the allocator reports that anomaly), so a
    /// retried webhook converges rather than double-charges.
    pub async fn record_payment(
        &self,
        entry_id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> AppResult<(Entry, Option<AllocatedBlock>)> {
        if status == PaymentStatus::Pending {
            return Err(AppError::Validation(
                "payment outcome must be completed or failed".to_string(),
            ));
        }

        let entry = self
            .store
            .update_payment_status(entry_id, status, payment_ref)
            .await
            .map_err(|e| match e {
                crate::error::RepositoryError::NotFound(_) => AppError::EntryNotFound(entry_id),
                other => other.into(),
            })?;

        match status {
            PaymentStatus::Completed => {
                let block = self.allocator.allocate_tickets(entry_id).await?;
                Ok((entry, Some(block)))
            }
            PaymentStatus::Failed => {
                self.notifier
                    .payment_failed(&entry, "gateway reported failure")
                    .await;
                Ok((entry, None))
            }
            PaymentStatus::Pending => unreachable!("rejected above"),
        }
    }

    /// All tickets issued to an entry, ordered by number
    pub async fn tickets(&self, entry_id: Uuid) -> AppResult<Vec<Ticket>> {
        // Surface a proper 404 for unknown entries instead of an empty list
        self.get_entry(entry_id).await?;

        self.store
            .tickets_for_entry(entry_id)
            .await
            .map_err(AppError::from)
    }

    /// All tickets held by one email in the active raffle, across entries.
    /// The lookup normalizes the email the same way entry creation does.
    pub async fn tickets_by_email(&self, email: &str) -> AppResult<Vec<Ticket>> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let email = email.trim().to_lowercase();
        self.store
            .tickets_for_email(raffle.id, &email)
            .await
            .map_err(AppError::from)
    }
}
