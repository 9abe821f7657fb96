use crate::models::{AdminNotification, AllocatedBlock, Entry, NotificationKind, Winner};
use crate::repositories::RaffleStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Admin notification writer.
///
/// Strictly best-effort: allocations and draws are facts by the time this
/// runs, so a notification failure is logged and dropped, never propagated.
pub struct NotificationService {
    store: Arc<dyn RaffleStore>,
}

impl NotificationService {
    /// Create a new notification service
    pub fn new(store: Arc<dyn RaffleStore>) -> Self {
        Self { store }
    }

    async fn record(&self, notification: AdminNotification) {
        if let Err(e) = self.store.insert_notification(notification).await {
            warn!("Failed to record admin notification: {}", e);
        }
    }

    /// Announce a freshly allocated ticket block
    pub async fn tickets_allocated(&self, entry: &Entry, block: &AllocatedBlock) {
        let plural = if entry.count == 1 { "entry" } else { "entries" };
        info!(
            "NEW RAFFLE ENTRY: {} bought {} {} for ${:.2} (tickets {}-{})",
            entry.email,
            entry.count,
            plural,
            entry.amount as f64 / 100.0,
            block.range.start_number,
            block.range.end_number
        );

        self.record(AdminNotification::new(
            NotificationKind::TicketsAllocated,
            "New Raffle Entry Purchase",
            &format!(
                "{} purchased {} raffle {} for ${:.2}",
                entry.email,
                entry.count,
                plural,
                entry.amount as f64 / 100.0
            ),
            serde_json::json!({
                "entry_id": entry.id,
                "email": entry.email,
                "count": entry.count,
                "amount": entry.amount,
                "start_number": block.range.start_number,
                "end_number": block.range.end_number,
            }),
        ))
        .await;
    }

    /// Announce a recorded winner
    pub async fn winner_selected(&self, winner: &Winner) {
        info!(
            "RAFFLE WINNER SELECTED: {} won with ticket #{}/{}",
            winner.winner_email, winner.winning_ticket_number, winner.total_tickets_in_pool
        );

        self.record(AdminNotification::new(
            NotificationKind::WinnerSelected,
            "Raffle Winner Selected",
            &format!(
                "Winner: {} | Winning ticket: #{} out of {} total tickets",
                winner.winner_email, winner.winning_ticket_number, winner.total_tickets_in_pool
            ),
            serde_json::json!({
                "winner_email": winner.winner_email,
                "winning_ticket_number": winner.winning_ticket_number,
                "total_tickets": winner.total_tickets_in_pool,
                "slot": winner.slot,
                "raffle_id": winner.raffle_id,
            }),
        ))
        .await;
    }

    /// Flag a completed payment whose ticket issuance permanently failed.
    /// Operators reconcile these manually.
    pub async fn allocation_failed(&self, raffle_id: Uuid, entry_id: Uuid, reason: &str) {
        self.record(AdminNotification::new(
            NotificationKind::AllocationFailed,
            "Ticket Allocation Failed",
            &format!(
                "Entry {} completed payment but ticket allocation failed: {}",
                entry_id, reason
            ),
            serde_json::json!({
                "raffle_id": raffle_id,
                "entry_id": entry_id,
                "reason": reason,
            }),
        ))
        .await;
    }

    /// Flag a failed payment
    pub async fn payment_failed(&self, entry: &Entry, reason: &str) {
        self.record(AdminNotification::new(
            NotificationKind::PaymentFailed,
            "Payment Failed",
            &format!(
                "Payment failed for {}: ${:.2} - {}",
                entry.email,
                entry.amount as f64 / 100.0,
                reason
            ),
            serde_json::json!({
                "entry_id": entry.id,
                "email": entry.email,
                "amount": entry.amount,
                "reason": reason,
            }),
        ))
        .await;
    }
}
