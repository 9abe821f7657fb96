use crate::error::{AppError, AppResult};
use crate::repositories::RaffleStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// One finding of the pool integrity checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// The ticket at this position does not carry the expected number
    SequenceMismatch {
        position: i64,
        expected: i64,
        found: i64,
    },
    /// The same ticket number was issued more than once
    DuplicateNumbers { total: i64, distinct: i64 },
    /// Pool size does not match the demand of allocated completed entries
    CountMismatch { expected: i64, observed: i64 },
    /// The cached counter and the rows on disk disagree; a range was
    /// reserved but its tickets were never written (or the reverse)
    CounterDrift { counter: i64, observed: i64 },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::SequenceMismatch {
                position,
                expected,
                found,
            } => write!(
                f,
                "sequence mismatch at position {}: expected ticket {}, found {}",
                position, expected, found
            ),
            IntegrityIssue::DuplicateNumbers { total, distinct } => write!(
                f,
                "duplicate ticket numbers: {} tickets but only {} distinct numbers",
                total, distinct
            ),
            IntegrityIssue::CountMismatch { expected, observed } => write!(
                f,
                "ticket count mismatch: allocated entries demand {}, pool holds {}",
                expected, observed
            ),
            IntegrityIssue::CounterDrift { counter, observed } => write!(
                f,
                "counter drift: config counter says {}, pool holds {} (reserved but unwritten range?)",
                counter, observed
            ),
        }
    }
}

/// Result of a pool validation run.
///
/// Completed entries that hold no tickets (issuance pending, or refused
/// after close) are a reconciliation concern, reported in the unallocated
/// fields; they never invalidate the pool itself and never block a draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReport {
    pub raffle_id: uuid::Uuid,
    pub is_valid: bool,
    pub total_tickets: i64,
    pub expected_tickets: i64,
    pub unallocated_entries: i64,
    pub unallocated_demand: i64,
    pub issues: Vec<IntegrityIssue>,
}

impl PoolReport {
    /// Human-readable one-line summary of all findings
    pub fn summary(&self) -> String {
        self.issues
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Pool Integrity Checker: read-only proof that the ticket pool is gap-free,
/// duplicate-free and covers exactly the completed entries.
///
/// Findings are surfaced, never auto-repaired. Runs after every allocation
/// batch (background monitor) and gates every draw.
pub struct IntegrityService {
    store: Arc<dyn RaffleStore>,
}

impl IntegrityService {
    /// Create a new integrity service
    pub fn new(store: Arc<dyn RaffleStore>) -> Self {
        Self { store }
    }

    /// Validate the active raffle's ticket pool
    pub async fn validate_pool(&self) -> AppResult<PoolReport> {
        // One consistent view of config, tickets and demand
        let snapshot = self
            .store
            .active_pool_snapshot()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let raffle = snapshot.raffle;
        let tickets = snapshot.tickets;
        let expected_tickets = snapshot.allocated_demand;
        let total_tickets = tickets.len() as i64;
        let mut issues = Vec::new();

        // 1. Numbering must be exactly 1..T. Report every mismatch while
        //    continuing the scan, so one gap does not mask later ones.
        for (i, ticket) in tickets.iter().enumerate() {
            let expected_number = i as i64 + 1;
            if ticket.ticket_number != expected_number {
                issues.push(IntegrityIssue::SequenceMismatch {
                    position: i as i64,
                    expected: expected_number,
                    found: ticket.ticket_number,
                });
            }
        }

        // 2. Duplicates via set-cardinality comparison
        let distinct: HashSet<i64> = tickets.iter().map(|t| t.ticket_number).collect();
        if distinct.len() != tickets.len() {
            issues.push(IntegrityIssue::DuplicateNumbers {
                total: total_tickets,
                distinct: distinct.len() as i64,
            });
        }

        // 3. Pool size must equal the demand of completed entries that
        //    actually hold tickets; entries awaiting issuance are reported
        //    separately and do not invalidate the pool
        if total_tickets != expected_tickets {
            issues.push(IntegrityIssue::CountMismatch {
                expected: expected_tickets,
                observed: total_tickets,
            });
        }

        // 4. Cached counter vs. rows actually present
        if raffle.total_entries != total_tickets {
            issues.push(IntegrityIssue::CounterDrift {
                counter: raffle.total_entries,
                observed: total_tickets,
            });
        }

        Ok(PoolReport {
            raffle_id: raffle.id,
            is_valid: issues.is_empty(),
            total_tickets,
            expected_tickets,
            unallocated_entries: snapshot.unallocated_entries,
            unallocated_demand: snapshot.unallocated_demand,
            issues,
        })
    }
}
