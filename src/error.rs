use crate::database::DatabaseError;
use chrono::NaiveDateTime;
use sqlx::Error as SqlxError;
use thiserror::Error;
use uuid::Uuid;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database errors
    #[error("SQL error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entry does not exist
    #[error("Entry not found: {0}")]
    EntryNotFound(Uuid),

    /// No active raffle configured
    #[error("No active raffle found")]
    RaffleNotFound,

    /// Allocation requested before the payment was finalized
    #[error("Entry {id} payment is {status}, not completed")]
    EntryNotCompleted { id: Uuid, status: String },

    /// Allocation requested after the raffle window closed
    #[error("Raffle closed at {ended_at}; no further ticket allocation")]
    RaffleClosed { ended_at: NaiveDateTime },

    /// Draw requested while the raffle window is still open
    #[error("Raffle has not ended yet (ends at {ends_at})")]
    RaffleNotEnded { ends_at: NaiveDateTime },

    /// Draw or config update requested after the winner was recorded
    #[error("Winner already selected for this raffle")]
    WinnerAlreadySelected,

    /// Draw requested on an empty pool
    #[error("No participants in raffle; nothing to draw")]
    NoParticipants,

    /// Concurrent allocation/draw race. Always transient and retryable.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Pool invariant violation found by the integrity checker
    #[error("Pool integrity violation: {0}")]
    IntegrityViolation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a transient conflict the caller should retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::EntryNotFound(_) | AppError::RaffleNotFound)
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::EntryNotFound(_) | AppError::RaffleNotFound => 404,
            AppError::Validation(_) => 400,
            AppError::EntryNotCompleted { .. }
            | AppError::RaffleClosed { .. }
            | AppError::RaffleNotEnded { .. }
            | AppError::WinnerAlreadySelected
            | AppError::NoParticipants => 409,
            AppError::Conflict(_) => 409,
            AppError::IntegrityViolation(_) => 500,
            AppError::Config(_) => 500,
            AppError::Database(_) | AppError::Sqlx(_) => 500,
            _ => 500,
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Lost a serialization/lock race against a concurrent writer
    #[error("Concurrent write conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::Message(format!("Not found: {}", msg)),
            RepositoryError::Query(e) => AppError::Sqlx(e),
            RepositoryError::Duplicate(msg) => AppError::Conflict(format!("Duplicate: {}", msg)),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::InvalidInput(msg) => AppError::Validation(msg),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // Unique violation
                    Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                    // Foreign key / check constraint violation
                    Some("23503") | Some("23514") => {
                        RepositoryError::ConstraintViolation(db_err.message().to_string())
                    }
                    // Serialization failure / deadlock: safe to retry
                    Some("40001") | Some("40P01") => {
                        RepositoryError::Conflict(db_err.message().to_string())
                    }
                    _ => RepositoryError::Query(err),
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retryable() {
        let err = AppError::Conflict("lost allocation race".to_string());
        assert!(err.is_conflict());
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_not_found_status() {
        assert_eq!(AppError::RaffleNotFound.status_code(), 404);
        assert!(AppError::EntryNotFound(Uuid::new_v4()).is_not_found());
    }

    #[test]
    fn test_repository_error_maps_to_conflict() {
        let err: AppError = RepositoryError::Conflict("could not serialize access".to_string()).into();
        assert!(err.is_conflict());
    }
}
