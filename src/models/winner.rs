use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Derivation tag recorded with every winner so the draw can be recomputed
/// from the stored seed and frozen pool size.
pub const DRAW_DERIVATION: &str = "sha256-u64-rejection-v1";

/// Winner model: the immutable result of one draw slot.
///
/// Never updated or deleted once written; the (raffle_id, slot) pair is
/// unique so concurrent draw callers converge on a single record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Winner {
    pub id: Uuid,
    pub raffle_id: Uuid,
    /// 0-based winner slot; single-winner raffles only ever use slot 0
    pub slot: i32,
    pub winning_ticket_number: i64,
    pub winner_entry_id: Uuid,
    pub winner_email: String,
    /// Pool size at the moment of the draw, frozen for auditability
    pub total_tickets_in_pool: i64,
    /// Hex-encoded 32-byte CSPRNG seed the winning index derives from
    pub seed: String,
    /// Algorithm tag, currently always DRAW_DERIVATION
    pub derivation: String,
    pub selected_at: NaiveDateTime,
}

/// Parameters for recording a winner
#[derive(Debug, Clone)]
pub struct NewWinner {
    pub raffle_id: Uuid,
    pub slot: i32,
    pub winning_ticket_number: i64,
    pub winner_entry_id: Uuid,
    pub winner_email: String,
    pub total_tickets_in_pool: i64,
    pub seed: String,
    pub derivation: String,
}

/// Outcome of a draw call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawResult {
    pub winners: Vec<Winner>,
    /// True when every returned winner predates this call (idempotent read)
    pub already_selected: bool,
}
