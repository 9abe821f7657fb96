use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// RaffleConfig model: the single active raffle's parameters.
///
/// "At most one active raffle" is enforced by the store (a partial unique
/// index on is_active in Postgres), not by a process-level singleton.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RaffleConfig {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    /// Cached ticket count; also the allocation high-water mark
    pub total_entries: i64,
    pub price_per_entry: i64, // cents
    pub bundle_price: i64,    // cents
    pub bundle_size: i32,
    pub winner_count: i32,
    pub product_name: String,
    pub product_description: Option<String>,
    pub created_at: NaiveDateTime,
}

impl RaffleConfig {
    /// Check whether the sale/draw window is still open at the given instant
    pub fn is_open_at(&self, now: NaiveDateTime) -> bool {
        now < self.end_date
    }

    /// Check whether the raffle window has closed at the given instant
    pub fn has_ended_at(&self, now: NaiveDateTime) -> bool {
        now >= self.end_date
    }
}

/// Parameters for creating a raffle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRaffleConfig {
    pub name: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub price_per_entry: i64,
    pub bundle_price: i64,
    pub bundle_size: i32,
    #[serde(default = "default_winner_count")]
    pub winner_count: i32,
    pub product_name: String,
    pub product_description: Option<String>,
}

fn default_winner_count() -> i32 {
    1
}

impl NewRaffleConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.end_date <= self.start_date {
            return Err("Raffle end date must be after its start date".to_string());
        }
        if self.price_per_entry <= 0 || self.bundle_price <= 0 {
            return Err("Raffle pricing must be positive".to_string());
        }
        if self.bundle_size < 1 {
            return Err("Bundle size must be at least 1".to_string());
        }
        if self.winner_count < 1 {
            return Err("Winner count must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Fields an administrator may change on the active raffle before a draw.
/// Pricing and dates never retroactively alter already-issued tickets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaffleConfigUpdate {
    pub name: Option<String>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub price_per_entry: Option<i64>,
    pub bundle_price: Option<i64>,
    pub bundle_size: Option<i32>,
    pub product_name: Option<String>,
    pub product_description: Option<String>,
}

impl RaffleConfigUpdate {
    pub fn is_noop(&self) -> bool {
        self.name.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.price_per_entry.is_none()
            && self.bundle_price.is_none()
            && self.bundle_size.is_none()
            && self.product_name.is_none()
            && self.product_description.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(price) = self.price_per_entry {
            if price <= 0 {
                return Err("price_per_entry must be positive".to_string());
            }
        }
        if let Some(price) = self.bundle_price {
            if price <= 0 {
                return Err("bundle_price must be positive".to_string());
            }
        }
        if let Some(size) = self.bundle_size {
            if size < 1 {
                return Err("bundle_size must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

/// Storefront-facing status snapshot of the active raffle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaffleStatus {
    pub raffle_id: Uuid,
    pub name: String,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    pub is_open: bool,
    pub total_tickets: i64,
    pub price_per_entry: i64,
    pub bundle_price: i64,
    pub bundle_size: i32,
    pub has_winner: bool,
}
