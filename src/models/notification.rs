use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of admin notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TicketsAllocated,
    WinnerSelected,
    AllocationFailed,
    PaymentFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TicketsAllocated => "tickets_allocated",
            NotificationKind::WinnerSelected => "winner_selected",
            NotificationKind::AllocationFailed => "allocation_failed",
            NotificationKind::PaymentFailed => "payment_failed",
        }
    }
}

/// Admin notification record. Written best-effort by the engine; consumed
/// by an admin surface outside this core.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminNotification {
    pub id: Uuid,
    pub kind: String, // Stored as TEXT, see NotificationKind
    pub title: String,
    pub message: String,
    pub data: Value,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

impl AdminNotification {
    pub fn new(kind: NotificationKind, title: &str, message: &str, data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.as_str().to_string(),
            title: title.to_string(),
            message: message.to_string(),
            data,
            is_read: false,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }
}
