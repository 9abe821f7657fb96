use crate::error::RepositoryError;
use crate::models::{
    AdminNotification, AllocatedBlock, Entry, NewRaffleConfig, NewWinner, PaymentStatus,
    RaffleConfig, RaffleConfigUpdate, Ticket, TicketRange, Winner,
};
use crate::repositories::{PoolSnapshot, RaffleStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    raffles: Vec<RaffleConfig>,
    entries: HashMap<Uuid, Entry>,
    tickets: Vec<Ticket>,
    winners: Vec<Winner>,
    notifications: Vec<AdminNotification>,
}

/// In-memory store used by the test suite and for database-less development.
///
/// All state sits behind a single Mutex, so allocate_block is trivially
/// atomic: the high-water-mark read, the ticket writes and the counter bump
/// happen under one lock acquisition.
#[derive(Default)]
pub struct MemoryRaffleStore {
    state: Mutex<MemoryState>,
}

impl MemoryRaffleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: write a raw ticket row, bypassing allocation. Used to
    /// manufacture gap/duplicate anomalies for integrity-checker tests.
    pub async fn insert_raw_ticket(&self, ticket: Ticket) {
        let mut state = self.state.lock().await;
        state.tickets.push(ticket);
    }

    /// Test hook: remove a ticket by number, creating a gap.
    pub async fn remove_ticket(&self, raffle_id: Uuid, ticket_number: i64) {
        let mut state = self.state.lock().await;
        state
            .tickets
            .retain(|t| !(t.raffle_id == raffle_id && t.ticket_number == ticket_number));
    }

    /// Test hook: overwrite the cached counter, simulating a reserved but
    /// unwritten range left behind by a crash.
    pub async fn set_total_entries(&self, raffle_id: Uuid, total_entries: i64) {
        let mut state = self.state.lock().await;
        if let Some(raffle) = state.raffles.iter_mut().find(|r| r.id == raffle_id) {
            raffle.total_entries = total_entries;
        }
    }
}

#[async_trait]
impl RaffleStore for MemoryRaffleStore {
    async fn create_raffle(&self, new: NewRaffleConfig) -> Result<RaffleConfig, RepositoryError> {
        let mut state = self.state.lock().await;

        if state.raffles.iter().any(|r| r.is_active) {
            return Err(RepositoryError::Duplicate(
                "an active raffle already exists".to_string(),
            ));
        }

        let raffle = RaffleConfig {
            id: Uuid::new_v4(),
            name: new.name,
            is_active: true,
            start_date: new.start_date,
            end_date: new.end_date,
            total_entries: 0,
            price_per_entry: new.price_per_entry,
            bundle_price: new.bundle_price,
            bundle_size: new.bundle_size,
            winner_count: new.winner_count,
            product_name: new.product_name,
            product_description: new.product_description,
            created_at: chrono::Utc::now().naive_utc(),
        };
        state.raffles.push(raffle.clone());

        Ok(raffle)
    }

    async fn find_active_raffle(&self) -> Result<Option<RaffleConfig>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.raffles.iter().find(|r| r.is_active).cloned())
    }

    async fn find_raffle(&self, raffle_id: Uuid) -> Result<Option<RaffleConfig>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.raffles.iter().find(|r| r.id == raffle_id).cloned())
    }

    async fn update_raffle(
        &self,
        raffle_id: Uuid,
        update: RaffleConfigUpdate,
    ) -> Result<RaffleConfig, RepositoryError> {
        let mut state = self.state.lock().await;

        let raffle = state
            .raffles
            .iter_mut()
            .find(|r| r.id == raffle_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("raffle {}", raffle_id)))?;

        if let Some(name) = update.name {
            raffle.name = name;
        }
        if let Some(start_date) = update.start_date {
            raffle.start_date = start_date;
        }
        if let Some(end_date) = update.end_date {
            raffle.end_date = end_date;
        }
        if let Some(price) = update.price_per_entry {
            raffle.price_per_entry = price;
        }
        if let Some(price) = update.bundle_price {
            raffle.bundle_price = price;
        }
        if let Some(size) = update.bundle_size {
            raffle.bundle_size = size;
        }
        if let Some(product_name) = update.product_name {
            raffle.product_name = product_name;
        }
        if let Some(description) = update.product_description {
            raffle.product_description = Some(description);
        }

        Ok(raffle.clone())
    }

    async fn insert_entry(&self, entry: Entry) -> Result<Entry, RepositoryError> {
        let mut state = self.state.lock().await;

        if state.entries.contains_key(&entry.id) {
            return Err(RepositoryError::Duplicate(format!("entry {}", entry.id)));
        }
        state.entries.insert(entry.id, entry.clone());

        Ok(entry)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<Entry>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.entries.get(&entry_id).cloned())
    }

    async fn update_payment_status(
        &self,
        entry_id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> Result<Entry, RepositoryError> {
        let mut state = self.state.lock().await;

        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("entry {}", entry_id)))?;

        let current = entry.payment_status_enum();
        if current == status {
            // Retried webhook delivering the same outcome
            return Ok(entry.clone());
        }
        if current.is_terminal() {
            return Err(RepositoryError::ConstraintViolation(format!(
                "entry {} payment status is terminal ({})",
                entry_id, entry.payment_status
            )));
        }

        entry.payment_status = status.as_str().to_string();
        if payment_ref.is_some() {
            entry.payment_ref = payment_ref;
        }

        Ok(entry.clone())
    }

    async fn tickets_for_entry(&self, entry_id: Uuid) -> Result<Vec<Ticket>, RepositoryError> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.entry_id == entry_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        Ok(tickets)
    }

    async fn tickets_ordered(&self, raffle_id: Uuid) -> Result<Vec<Ticket>, RepositoryError> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.raffle_id == raffle_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        Ok(tickets)
    }

    async fn tickets_for_email(
        &self,
        raffle_id: Uuid,
        email: &str,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let state = self.state.lock().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.raffle_id == raffle_id && t.email == email)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);
        Ok(tickets)
    }

    async fn find_ticket_by_number(
        &self,
        raffle_id: Uuid,
        ticket_number: i64,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .iter()
            .find(|t| t.raffle_id == raffle_id && t.ticket_number == ticket_number)
            .cloned())
    }

    async fn ticket_count(&self, raffle_id: Uuid) -> Result<i64, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.tickets.iter().filter(|t| t.raffle_id == raffle_id).count() as i64)
    }

    async fn active_pool_snapshot(&self) -> Result<Option<PoolSnapshot>, RepositoryError> {
        // Single lock acquisition: config, tickets and demand are one view
        let state = self.state.lock().await;

        let raffle = match state.raffles.iter().find(|r| r.is_active) {
            Some(raffle) => raffle.clone(),
            None => return Ok(None),
        };

        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.raffle_id == raffle.id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.ticket_number);

        let mut allocated_demand = 0i64;
        let mut unallocated_entries = 0i64;
        let mut unallocated_demand = 0i64;
        for entry in state
            .entries
            .values()
            .filter(|e| e.raffle_id == raffle.id && e.is_completed())
        {
            if tickets.iter().any(|t| t.entry_id == entry.id) {
                allocated_demand += i64::from(entry.count);
            } else {
                unallocated_entries += 1;
                unallocated_demand += i64::from(entry.count);
            }
        }

        Ok(Some(PoolSnapshot {
            raffle,
            tickets,
            allocated_demand,
            unallocated_entries,
            unallocated_demand,
        }))
    }

    async fn allocate_block(
        &self,
        raffle_id: Uuid,
        entry_id: Uuid,
    ) -> Result<AllocatedBlock, RepositoryError> {
        // One lock acquisition for the whole reserve-and-write unit
        let mut state = self.state.lock().await;

        if !state.raffles.iter().any(|r| r.id == raffle_id) {
            return Err(RepositoryError::NotFound(format!("raffle {}", raffle_id)));
        }

        let entry = state
            .entries
            .get(&entry_id)
            .filter(|e| e.raffle_id == raffle_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("entry {}", entry_id)))?;

        let existing: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.entry_id == entry_id)
            .cloned()
            .collect();

        if let Some(range) = TicketRange::from_tickets(&existing) {
            return Ok(AllocatedBlock {
                range,
                freshly_allocated: false,
            });
        }

        let current_max = state
            .tickets
            .iter()
            .filter(|t| t.raffle_id == raffle_id)
            .map(|t| t.ticket_number)
            .max()
            .unwrap_or(0);

        let start_number = current_max + 1;
        let end_number = current_max + i64::from(entry.count);
        let now = chrono::Utc::now().naive_utc();

        for ticket_number in start_number..=end_number {
            state.tickets.push(Ticket {
                id: Uuid::new_v4(),
                raffle_id,
                entry_id,
                email: entry.email.clone(),
                ticket_number,
                created_at: now,
            });
        }

        if let Some(raffle) = state.raffles.iter_mut().find(|r| r.id == raffle_id) {
            raffle.total_entries += i64::from(entry.count);
        }

        Ok(AllocatedBlock {
            range: TicketRange::new(start_number, end_number),
            freshly_allocated: true,
        })
    }

    async fn winners_for_raffle(&self, raffle_id: Uuid) -> Result<Vec<Winner>, RepositoryError> {
        let state = self.state.lock().await;
        let mut winners: Vec<Winner> = state
            .winners
            .iter()
            .filter(|w| w.raffle_id == raffle_id)
            .cloned()
            .collect();
        winners.sort_by_key(|w| w.slot);
        Ok(winners)
    }

    async fn insert_winner(&self, new: NewWinner) -> Result<Winner, RepositoryError> {
        let mut state = self.state.lock().await;

        if state
            .winners
            .iter()
            .any(|w| w.raffle_id == new.raffle_id && w.slot == new.slot)
        {
            return Err(RepositoryError::Duplicate(format!(
                "winner slot {} for raffle {}",
                new.slot, new.raffle_id
            )));
        }

        let winner = Winner {
            id: Uuid::new_v4(),
            raffle_id: new.raffle_id,
            slot: new.slot,
            winning_ticket_number: new.winning_ticket_number,
            winner_entry_id: new.winner_entry_id,
            winner_email: new.winner_email,
            total_tickets_in_pool: new.total_tickets_in_pool,
            seed: new.seed,
            derivation: new.derivation,
            selected_at: chrono::Utc::now().naive_utc(),
        };
        state.winners.push(winner.clone());

        Ok(winner)
    }

    async fn has_winner(&self, raffle_id: Uuid) -> Result<bool, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.winners.iter().any(|w| w.raffle_id == raffle_id))
    }

    async fn insert_notification(
        &self,
        notification: AdminNotification,
    ) -> Result<AdminNotification, RepositoryError> {
        let mut state = self.state.lock().await;
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn unread_notifications(
        &self,
        limit: i64,
    ) -> Result<Vec<AdminNotification>, RepositoryError> {
        let state = self.state.lock().await;
        let mut unread: Vec<AdminNotification> = state
            .notifications
            .iter()
            .filter(|n| !n.is_read)
            .cloned()
            .collect();
        unread.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        unread.truncate(limit as usize);
        Ok(unread)
    }
}
