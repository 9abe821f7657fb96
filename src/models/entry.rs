use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Completed and failed are terminal; pending is the only state that
    /// may still transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl From<String> for PaymentStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(PaymentStatus::Pending)
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Entry model representing one purchase of raffle chances
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: Uuid,
    pub raffle_id: Uuid,
    pub email: String,
    pub count: i32,
    pub amount: i64, // minor currency units (cents)
    pub payment_status: String, // Stored as TEXT, use PaymentStatus enum for type safety
    pub payment_ref: Option<String>, // External gateway session id, if any
    pub created_at: NaiveDateTime,
}

impl Entry {
    /// Create a new pending Entry. The contact email is normalized to
    /// lower case so ticket lookups by email are stable.
    pub fn new(
        raffle_id: Uuid,
        email: &str,
        count: i32,
        amount: i64,
        payment_ref: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            raffle_id,
            email: email.trim().to_lowercase(),
            count,
            amount,
            payment_status: PaymentStatus::Pending.as_str().to_string(),
            payment_ref,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Get payment status as an enum
    pub fn payment_status_enum(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.payment_status).unwrap_or(PaymentStatus::Pending)
    }

    /// Check if the payment completed
    pub fn is_completed(&self) -> bool {
        self.payment_status_enum() == PaymentStatus::Completed
    }

    /// Validate invariants on a new entry
    pub fn validate(&self) -> Result<(), String> {
        if self.count < 1 {
            return Err("Entry count must be at least 1".to_string());
        }
        if self.amount < 0 {
            return Err("Entry amount must not be negative".to_string());
        }
        if self.email.is_empty() || !self.email.contains('@') {
            return Err(format!("Invalid contact email: {}", self.email));
        }
        Ok(())
    }
}
