pub mod memory;
pub mod postgres;

// Re-export both stores for convenient access
pub use memory::MemoryRaffleStore;
pub use postgres::PgRaffleStore;

use crate::error::RepositoryError;
use crate::models::{
    AdminNotification, AllocatedBlock, Entry, NewRaffleConfig, NewWinner, PaymentStatus,
    RaffleConfig, RaffleConfigUpdate, Ticket, Winner,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Consistent view of the active raffle's pool, read in one store operation
/// so the integrity checker never compares values from different moments.
///
/// Demand splits by whether the completed entry actually holds tickets:
/// `allocated_demand` is what the pool must cover; `unallocated_demand`
/// belongs to completed entries still awaiting (or refused) issuance and is
/// a reconciliation concern, not a pool defect.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub raffle: RaffleConfig,
    /// All tickets of the raffle, ordered by ticket number
    pub tickets: Vec<Ticket>,
    /// Sum of counts over completed entries that hold tickets
    pub allocated_demand: i64,
    /// Completed entries holding no tickets
    pub unallocated_entries: i64,
    /// Sum of counts over those entries
    pub unallocated_demand: i64,
}

/// Storage seam the engine runs over.
///
/// Two implementations ship with the crate: PgRaffleStore (PostgreSQL,
/// production) and MemoryRaffleStore (tests and development). Whatever the
/// backend, allocate_block is the one operation with a hard atomicity
/// contract: the range reservation, the ticket rows and the counter bump
/// commit together or not at all, and no two concurrent calls may observe
/// the same high-water mark.
#[async_trait]
pub trait RaffleStore: Send + Sync {
    // ------------------------------------------------------------------
    // Raffle configuration
    // ------------------------------------------------------------------

    /// Create a raffle configuration. Fails with Duplicate if an active
    /// raffle already exists.
    async fn create_raffle(&self, new: NewRaffleConfig) -> Result<RaffleConfig, RepositoryError>;

    /// Find the active raffle, if any
    async fn find_active_raffle(&self) -> Result<Option<RaffleConfig>, RepositoryError>;

    /// Find a raffle by id
    async fn find_raffle(&self, raffle_id: Uuid) -> Result<Option<RaffleConfig>, RepositoryError>;

    /// Apply an administrative update to a raffle's mutable fields
    async fn update_raffle(
        &self,
        raffle_id: Uuid,
        update: RaffleConfigUpdate,
    ) -> Result<RaffleConfig, RepositoryError>;

    // ------------------------------------------------------------------
    // Entries
    // ------------------------------------------------------------------

    /// Persist a new entry
    async fn insert_entry(&self, entry: Entry) -> Result<Entry, RepositoryError>;

    /// Find an entry by id
    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<Entry>, RepositoryError>;

    /// Record the payment outcome for a pending entry. The pending state
    /// transitions at most once; repeating the same terminal outcome is a
    /// no-op, flipping between terminal outcomes is a constraint violation.
    async fn update_payment_status(
        &self,
        entry_id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> Result<Entry, RepositoryError>;

    // ------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------

    /// All tickets issued to one entry, ordered by ticket number
    async fn tickets_for_entry(&self, entry_id: Uuid) -> Result<Vec<Ticket>, RepositoryError>;

    /// All tickets held by one email within a raffle, ordered by number
    async fn tickets_for_email(
        &self,
        raffle_id: Uuid,
        email: &str,
    ) -> Result<Vec<Ticket>, RepositoryError>;

    /// All tickets of a raffle, ordered by ticket number
    async fn tickets_ordered(&self, raffle_id: Uuid) -> Result<Vec<Ticket>, RepositoryError>;

    /// Look up a single ticket by its number
    async fn find_ticket_by_number(
        &self,
        raffle_id: Uuid,
        ticket_number: i64,
    ) -> Result<Option<Ticket>, RepositoryError>;

    /// Number of tickets issued for a raffle
    async fn ticket_count(&self, raffle_id: Uuid) -> Result<i64, RepositoryError>;

    /// Atomically read the active raffle's config, tickets and completed
    /// demand. One lock acquisition (memory) or one transaction (Postgres),
    /// so the values are mutually consistent even while allocators run.
    async fn active_pool_snapshot(&self) -> Result<Option<PoolSnapshot>, RepositoryError>;

    /// Atomically reserve and write the entry's contiguous ticket block.
    ///
    /// Idempotent: if the entry already holds tickets, the existing range is
    /// returned and nothing is written. The entry must exist and belong to
    /// the raffle; payment-state policy is the caller's responsibility.
    async fn allocate_block(
        &self,
        raffle_id: Uuid,
        entry_id: Uuid,
    ) -> Result<AllocatedBlock, RepositoryError>;

    // ------------------------------------------------------------------
    // Winners
    // ------------------------------------------------------------------

    /// All winners recorded for a raffle, ordered by slot
    async fn winners_for_raffle(&self, raffle_id: Uuid) -> Result<Vec<Winner>, RepositoryError>;

    /// Record a winner. Fails with Duplicate if the slot is already taken,
    /// which is how concurrent draw callers converge on one record.
    async fn insert_winner(&self, new: NewWinner) -> Result<Winner, RepositoryError>;

    /// Whether any winner exists for a raffle
    async fn has_winner(&self, raffle_id: Uuid) -> Result<bool, RepositoryError>;

    // ------------------------------------------------------------------
    // Admin notifications
    // ------------------------------------------------------------------

    /// Persist an admin notification
    async fn insert_notification(
        &self,
        notification: AdminNotification,
    ) -> Result<AdminNotification, RepositoryError>;

    /// Unread notifications, newest first
    async fn unread_notifications(
        &self,
        limit: i64,
    ) -> Result<Vec<AdminNotification>, RepositoryError>;
}
