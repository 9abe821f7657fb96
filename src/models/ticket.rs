use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ticket model: one numbered, indivisible unit of chance belonging to
/// exactly one entry. Numbers are unique per raffle and issued without gaps.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub raffle_id: Uuid,
    pub entry_id: Uuid,
    pub email: String, // denormalized owner contact at issuance time
    pub ticket_number: i64,
    pub created_at: NaiveDateTime,
}

/// Contiguous block of ticket numbers issued to a single entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRange {
    pub start_number: i64,
    pub end_number: i64,
}

impl TicketRange {
    pub fn new(start_number: i64, end_number: i64) -> Self {
        Self {
            start_number,
            end_number,
        }
    }

    /// Number of tickets in the range
    pub fn len(&self) -> i64 {
        self.end_number - self.start_number + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end_number < self.start_number
    }

    pub fn contains(&self, ticket_number: i64) -> bool {
        ticket_number >= self.start_number && ticket_number <= self.end_number
    }

    /// Reconstruct the range from an entry's tickets, which are issued as
    /// one contiguous block.
    pub fn from_tickets(tickets: &[Ticket]) -> Option<Self> {
        let start = tickets.iter().map(|t| t.ticket_number).min()?;
        let end = tickets.iter().map(|t| t.ticket_number).max()?;
        Some(Self::new(start, end))
    }
}

/// Result of an allocation call: the issued range plus whether this call
/// created the tickets or observed an earlier allocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AllocatedBlock {
    pub range: TicketRange,
    pub freshly_allocated: bool,
}

/// Aggregate distribution of a raffle's ticket pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStats {
    pub raffle_id: Uuid,
    pub total_tickets: i64,
    /// Entries holding at least one ticket
    pub entry_count: i64,
    /// Distinct participant emails across the pool
    pub participant_count: i64,
}
