use crate::error::{AppError, AppResult};
use crate::models::{DrawResult, NewWinner, Ticket, DRAW_DERIVATION};
use crate::repositories::RaffleStore;
use crate::services::{AuditTrailService, IntegrityService, NotificationService};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Derive a uniform index in [0, pool_len) from a seed.
///
/// Rejection sampling over sha256(seed || round) keeps the draw free of
/// modulo bias and makes the winning index recomputable by anyone holding
/// the published seed and the frozen pool size.
pub fn derive_winning_index(seed: &[u8], pool_len: u64) -> u64 {
    debug_assert!(pool_len >= 1);
    if pool_len <= 1 {
        return 0;
    }

    // Accept region is the largest multiple of pool_len representable in
    // u64; anything above is redrawn with the next round counter.
    let overflow = ((u64::MAX % pool_len) + 1) % pool_len;
    let limit = u64::MAX - overflow;

    let mut round: u32 = 0;
    loop {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(round.to_be_bytes());
        let digest = hasher.finalize();

        let mut buf = [0u8; 8];
        buf.copy_from_slice(&digest[..8]);
        let value = u64::from_be_bytes(buf);

        if value <= limit {
            return value % pool_len;
        }
        round += 1;
    }
}

/// Draw Engine: selects winning ticket number(s) once the raffle window
/// closes, with a verifiable uniform procedure.
///
/// State machine: Open (draw rejected), Closed-undrawn (draw permitted),
/// Drawn (existing winners returned, never re-drawn). Concurrent callers
/// converge through the store's unique winner-slot constraint.
pub struct DrawService {
    store: Arc<dyn RaffleStore>,
    integrity: IntegrityService,
    notifier: Arc<NotificationService>,
    audit: Option<Arc<AuditTrailService>>,
}

impl DrawService {
    /// Create a new draw service
    pub fn new(store: Arc<dyn RaffleStore>, notifier: Arc<NotificationService>) -> Self {
        let integrity = IntegrityService::new(store.clone());
        Self {
            store,
            integrity,
            notifier,
            audit: None,
        }
    }

    /// Attach the audit trail
    pub fn with_audit(mut self, audit: Arc<AuditTrailService>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Select winners for every unfilled slot of the closed raffle.
    ///
    /// Idempotent once drawn: repeated calls return the recorded winners.
    /// Policy (fixed): an entry wins at most one slot; later slots draw over
    /// the pool minus every ticket of already-winning entries.
    pub async fn select_winners(&self) -> AppResult<DrawResult> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        let now = chrono::Utc::now().naive_utc();
        if !raffle.has_ended_at(now) {
            return Err(AppError::RaffleNotEnded {
                ends_at: raffle.end_date,
            });
        }

        let mut winners = self
            .store
            .winners_for_raffle(raffle.id)
            .await
            .map_err(AppError::from)?;

        if winners.len() as i32 >= raffle.winner_count {
            return Ok(DrawResult {
                winners,
                already_selected: true,
            });
        }

        let tickets = self
            .store
            .tickets_ordered(raffle.id)
            .await
            .map_err(AppError::from)?;

        if tickets.is_empty() {
            return Err(AppError::NoParticipants);
        }

        // A draw over a corrupt pool is void: validate first.
        let report = self.integrity.validate_pool().await?;
        if !report.is_valid {
            if let Some(audit) = &self.audit {
                if let Err(e) = audit.log_integrity_report(raffle.id, &report).await {
                    warn!("Audit write failed for integrity report: {}", e);
                }
            }
            return Err(AppError::IntegrityViolation(report.summary()));
        }

        let total_tickets_in_pool = tickets.len() as i64;
        let mut drew_any = false;

        while (winners.len() as i32) < raffle.winner_count {
            let slot = winners.len() as i32;

            let winning_entries: HashSet<Uuid> =
                winners.iter().map(|w| w.winner_entry_id).collect();
            let eligible: Vec<&Ticket> = tickets
                .iter()
                .filter(|t| !winning_entries.contains(&t.entry_id))
                .collect();

            if eligible.is_empty() {
                warn!(
                    "Winner pool exhausted after {} of {} slots for raffle {}",
                    winners.len(),
                    raffle.winner_count,
                    raffle.id
                );
                break;
            }

            let mut seed = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut seed);

            let index = derive_winning_index(&seed, eligible.len() as u64);
            let ticket = eligible[index as usize];

            let candidate = NewWinner {
                raffle_id: raffle.id,
                slot,
                winning_ticket_number: ticket.ticket_number,
                winner_entry_id: ticket.entry_id,
                winner_email: ticket.email.clone(),
                total_tickets_in_pool,
                seed: hex::encode(seed),
                derivation: DRAW_DERIVATION.to_string(),
            };

            match self.store.insert_winner(candidate).await {
                Ok(winner) => {
                    info!(
                        "Winner selected for slot {}: {} with ticket #{}/{} (seed {})",
                        winner.slot,
                        winner.winner_email,
                        winner.winning_ticket_number,
                        winner.total_tickets_in_pool,
                        winner.seed
                    );
                    if let Some(audit) = &self.audit {
                        if let Err(e) = audit.log_winner_selected(&winner).await {
                            warn!("Audit write failed for winner {}: {}", winner.id, e);
                        }
                    }
                    self.notifier.winner_selected(&winner).await;
                    winners.push(winner);
                    drew_any = true;
                }
                Err(crate::error::RepositoryError::Duplicate(_)) => {
                    // Lost the slot race to a concurrent caller: adopt the
                    // record that won instead of drawing a second winner.
                    winners = self
                        .store
                        .winners_for_raffle(raffle.id)
                        .await
                        .map_err(AppError::from)?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(DrawResult {
            winners,
            already_selected: !drew_any,
        })
    }

    /// Recorded winners for the active raffle, oldest slot first
    pub async fn winners(&self) -> AppResult<Vec<crate::models::Winner>> {
        let raffle = self
            .store
            .find_active_raffle()
            .await
            .map_err(AppError::from)?
            .ok_or(AppError::RaffleNotFound)?;

        self.store
            .winners_for_raffle(raffle.id)
            .await
            .map_err(AppError::from)
    }
}
