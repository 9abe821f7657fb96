use crate::error::{AppError, AppResult};
use crate::models::{NewRaffleConfig, RaffleConfig, RaffleConfigUpdate, RaffleStatus, TicketStats};
use crate::repositories::RaffleStore;
use std::sync::Arc;
use tracing::info;

/// Configuration Holder: read-mostly access to the single active raffle.
///
/// Creation enforces the at-most-one-active invariant; updates are limited
/// to fields that cannot retroactively corrupt issued tickets and are
/// refused entirely once a winner exists.
pub struct RaffleService {
    store: Arc<dyn RaffleStore>,
}

impl RaffleService {
    /// Create a new raffle service
    pub fn new(store: Arc<dyn RaffleStore>) -> Self {
        Self { store }
    }

    /// The active raffle, if one is configured
    pub async fn get_active(&self) -> AppResult<Option<RaffleConfig>> {
        self.store.find_active_raffle().await.map_err(AppError::from)
    }

    /// Create the raffle configuration. At most one raffle may be active;
    /// a second creation attempt is rejected.
    pub async fn create(&self, new: NewRaffleConfig) -> AppResult<RaffleConfig> {
        new.validate().map_err(AppError::Validation)?;

        // Pre-check for a friendlier error; the store's uniqueness guard is
        // what actually holds under concurrency.
        if self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .is_some()
        {
            return Err(AppError::Validation(
                "an active raffle already exists".to_string(),
            ));
        }

        let raffle = self
            .store
            .create_raffle(new)
            .await
            .map_err(|e| match e {
                crate::error::RepositoryError::Duplicate(_) => {
                    AppError::Validation("an active raffle already exists".to_string())
                }
                other => other.into(),
            })?;

        info!(
            "Raffle created: {} ({}), window {} to {}",
            raffle.name, raffle.id, raffle.start_date, raffle.end_date
        );

        Ok(raffle)
    }

    /// Update the active raffle's mutable fields (name, dates, pricing,
    /// product copy). Refused once any winner exists.
    pub async fn update(&self, update: RaffleConfigUpdate) -> AppResult<RaffleConfig> {
        update.validate().map_err(AppError::Validation)?;

        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        if update.is_noop() {
            return Ok(raffle);
        }

        if self
            .store
            .has_winner(raffle.id)
            .await
            .map_err(AppError::from)?
        {
            return Err(AppError::WinnerAlreadySelected);
        }

        let updated = self
            .store
            .update_raffle(raffle.id, update)
            .await
            .map_err(AppError::from)?;

        info!("Raffle {} configuration updated", updated.id);

        Ok(updated)
    }

    /// Storefront status snapshot of the active raffle
    pub async fn status(&self) -> AppResult<RaffleStatus> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let total_tickets = self
            .store
            .ticket_count(raffle.id)
            .await
            .map_err(AppError::from)?;

        let has_winner = self
            .store
            .has_winner(raffle.id)
            .await
            .map_err(AppError::from)?;

        let now = chrono::Utc::now().naive_utc();
        let is_open = raffle.is_open_at(now);

        Ok(RaffleStatus {
            raffle_id: raffle.id,
            name: raffle.name,
            start_date: raffle.start_date,
            end_date: raffle.end_date,
            is_open,
            total_tickets,
            price_per_entry: raffle.price_per_entry,
            bundle_price: raffle.bundle_price,
            bundle_size: raffle.bundle_size,
            has_winner,
        })
    }

    /// Distribution stats over the active raffle's pool
    pub async fn ticket_stats(&self) -> AppResult<TicketStats> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let tickets = self
            .store
            .tickets_ordered(raffle.id)
            .await
            .map_err(AppError::from)?;

        let entries: std::collections::HashSet<_> = tickets.iter().map(|t| t.entry_id).collect();
        let participants: std::collections::HashSet<_> =
            tickets.iter().map(|t| t.email.as_str()).collect();

        Ok(TicketStats {
            raffle_id: raffle.id,
            total_tickets: tickets.len() as i64,
            entry_count: entries.len() as i64,
            participant_count: participants.len() as i64,
        })
    }
}
