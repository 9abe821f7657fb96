use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use raffle_backend::error::RepositoryError;
use raffle_backend::models::*;
use raffle_backend::repositories::{MemoryRaffleStore, PoolSnapshot, RaffleStore};
use raffle_backend::AppState;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// In-memory application fixture. Keeps a typed handle on the memory store
/// so tests can reach its corruption hooks alongside the service layer.
pub struct TestApp {
    pub memory: Arc<MemoryRaffleStore>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let memory = Arc::new(MemoryRaffleStore::new());
        let store: Arc<dyn RaffleStore> = memory.clone();

        // Short backoff keeps conflict-retry tests fast
        let state = AppState::new(store, None, 3, Duration::from_millis(1));

        Self { memory, state }
    }

    pub fn store(&self) -> Arc<dyn RaffleStore> {
        self.memory.clone()
    }
}

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Store wrapper whose allocate_block fails with a transient conflict a set
/// number of times before delegating. Every other operation passes through.
pub struct ConflictingStore {
    inner: Arc<MemoryRaffleStore>,
    remaining_conflicts: AtomicU32,
}

impl ConflictingStore {
    pub fn new(inner: Arc<MemoryRaffleStore>, conflicts: u32) -> Self {
        Self {
            inner,
            remaining_conflicts: AtomicU32::new(conflicts),
        }
    }

    fn take_conflict(&self) -> bool {
        self.remaining_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RaffleStore for ConflictingStore {
    async fn create_raffle(&self, new: NewRaffleConfig) -> Result<RaffleConfig, RepositoryError> {
        self.inner.create_raffle(new).await
    }

    async fn find_active_raffle(&self) -> Result<Option<RaffleConfig>, RepositoryError> {
        self.inner.find_active_raffle().await
    }

    async fn find_raffle(&self, raffle_id: Uuid) -> Result<Option<RaffleConfig>, RepositoryError> {
        self.inner.find_raffle(raffle_id).await
    }

    async fn update_raffle(
        &self,
        raffle_id: Uuid,
        update: RaffleConfigUpdate,
    ) -> Result<RaffleConfig, RepositoryError> {
        self.inner.update_raffle(raffle_id, update).await
    }

    async fn insert_entry(&self, entry: Entry) -> Result<Entry, RepositoryError> {
        self.inner.insert_entry(entry).await
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<Entry>, RepositoryError> {
        self.inner.find_entry(entry_id).await
    }

    async fn update_payment_status(
        &self,
        entry_id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> Result<Entry, RepositoryError> {
        self.inner
            .update_payment_status(entry_id, status, payment_ref)
            .await
    }

    async fn tickets_for_entry(&self, entry_id: Uuid) -> Result<Vec<Ticket>, RepositoryError> {
        self.inner.tickets_for_entry(entry_id).await
    }

    async fn tickets_for_email(
        &self,
        raffle_id: Uuid,
        email: &str,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        self.inner.tickets_for_email(raffle_id, email).await
    }

    async fn tickets_ordered(&self, raffle_id: Uuid) -> Result<Vec<Ticket>, RepositoryError> {
        self.inner.tickets_ordered(raffle_id).await
    }

    async fn find_ticket_by_number(
        &self,
        raffle_id: Uuid,
        ticket_number: i64,
    ) -> Result<Option<Ticket>, RepositoryError> {
        self.inner.find_ticket_by_number(raffle_id, ticket_number).await
    }

    async fn ticket_count(&self, raffle_id: Uuid) -> Result<i64, RepositoryError> {
        self.inner.ticket_count(raffle_id).await
    }

    async fn active_pool_snapshot(&self) -> Result<Option<PoolSnapshot>, RepositoryError> {
        self.inner.active_pool_snapshot().await
    }

    async fn allocate_block(
        &self,
        raffle_id: Uuid,
        entry_id: Uuid,
    ) -> Result<AllocatedBlock, RepositoryError> {
        if self.take_conflict() {
            return Err(RepositoryError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        self.inner.allocate_block(raffle_id, entry_id).await
    }

    async fn winners_for_raffle(&self, raffle_id: Uuid) -> Result<Vec<Winner>, RepositoryError> {
        self.inner.winners_for_raffle(raffle_id).await
    }

    async fn insert_winner(&self, new: NewWinner) -> Result<Winner, RepositoryError> {
        self.inner.insert_winner(new).await
    }

    async fn has_winner(&self, raffle_id: Uuid) -> Result<bool, RepositoryError> {
        self.inner.has_winner(raffle_id).await
    }

    async fn insert_notification(
        &self,
        notification: AdminNotification,
    ) -> Result<AdminNotification, RepositoryError> {
        self.inner.insert_notification(notification).await
    }

    async fn unread_notifications(
        &self,
        limit: i64,
    ) -> Result<Vec<AdminNotification>, RepositoryError> {
        self.inner.unread_notifications(limit).await
    }
}

/// Application wired over a ConflictingStore with a short retry backoff
pub fn conflicting_app(conflicts: u32) -> AppState {
    let store: Arc<dyn RaffleStore> = Arc::new(ConflictingStore::new(
        Arc::new(MemoryRaffleStore::new()),
        conflicts,
    ));
    AppState::new(store, None, 3, Duration::from_millis(1))
}

/// Raffle config whose sale window is currently open
pub fn open_raffle_config(winner_count: i32) -> NewRaffleConfig {
    NewRaffleConfig {
        name: "Signed Jersey Raffle".to_string(),
        start_date: now() - ChronoDuration::hours(1),
        end_date: now() + ChronoDuration::hours(1),
        price_per_entry: 500,
        bundle_price: 2000,
        bundle_size: 5,
        winner_count,
        product_name: "Signed Jersey".to_string(),
        product_description: Some("Match-worn, signed by the squad".to_string()),
    }
}

/// Create and activate an open raffle
pub async fn seed_open_raffle(app: &TestApp, winner_count: i32) -> RaffleConfig {
    app.state
        .raffles
        .create(open_raffle_config(winner_count))
        .await
        .expect("Failed to create raffle")
}

/// Move the active raffle's end date into the past so draws are permitted
/// and new allocations are refused.
pub async fn close_raffle(app: &TestApp, raffle_id: Uuid) {
    app.store()
        .update_raffle(
            raffle_id,
            RaffleConfigUpdate {
                end_date: Some(now() - ChronoDuration::seconds(1)),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to close raffle");
}

/// Create an entry and mark its payment completed, without allocating
pub async fn create_completed_entry(app: &TestApp, email: &str, count: i32) -> Entry {
    let entry = app
        .state
        .entries
        .create_entry(email, count, i64::from(count) * 500, None)
        .await
        .expect("Failed to create entry");

    app.store()
        .update_payment_status(entry.id, PaymentStatus::Completed, None)
        .await
        .expect("Failed to complete payment")
}

/// Create an entry, complete its payment and allocate its ticket block
pub async fn create_allocated_entry(app: &TestApp, email: &str, count: i32) -> (Entry, TicketRange) {
    let entry = create_completed_entry(app, email, count).await;
    let block = app
        .state
        .allocator
        .allocate_tickets(entry.id)
        .await
        .expect("Failed to allocate tickets");
    (entry, block.range)
}

/// Assert the active raffle's pool is exactly 1..=expected with no findings
pub async fn assert_pool_valid(app: &TestApp, expected: i64) {
    let report = app
        .state
        .integrity
        .validate_pool()
        .await
        .expect("Failed to validate pool");

    assert!(
        report.is_valid,
        "pool expected valid, got: {}",
        report.summary()
    );
    assert_eq!(report.total_tickets, expected);
    assert_eq!(report.expected_tickets, expected);
}
