use crate::error::RepositoryError;
use crate::models::{
    AdminNotification, AllocatedBlock, Entry, NewRaffleConfig, NewWinner, PaymentStatus,
    RaffleConfig, RaffleConfigUpdate, Ticket, TicketRange, Winner,
};
use crate::repositories::{PoolSnapshot, RaffleStore};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

const RAFFLE_COLUMNS: &str = "id, name, is_active, start_date, end_date, total_entries, \
     price_per_entry, bundle_price, bundle_size, winner_count, product_name, \
     product_description, created_at";

const ENTRY_COLUMNS: &str =
    "id, raffle_id, email, count, amount, payment_status, payment_ref, created_at";

const TICKET_COLUMNS: &str = "id, raffle_id, entry_id, email, ticket_number, created_at";

const WINNER_COLUMNS: &str = "id, raffle_id, slot, winning_ticket_number, winner_entry_id, \
     winner_email, total_tickets_in_pool, seed, derivation, selected_at";

/// PostgreSQL-backed store.
///
/// Queries are runtime-bound so the crate compiles without a live database;
/// the schema lives in ./migrations and is applied at startup.
pub struct PgRaffleStore {
    pool: PgPool,
}

impl PgRaffleStore {
    /// Create a new PgRaffleStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RaffleStore for PgRaffleStore {
    async fn create_raffle(&self, new: NewRaffleConfig) -> Result<RaffleConfig, RepositoryError> {
        // The partial unique index on is_active turns a second active raffle
        // into a Duplicate error here.
        let raffle = sqlx::query_as::<_, RaffleConfig>(&format!(
            "INSERT INTO raffle_config \
                 (name, is_active, start_date, end_date, total_entries, price_per_entry, \
                  bundle_price, bundle_size, winner_count, product_name, product_description) \
             VALUES ($1, TRUE, $2, $3, 0, $4, $5, $6, $7, $8, $9) \
             RETURNING {}",
            RAFFLE_COLUMNS
        ))
        .bind(&new.name)
        .bind(new.start_date)
        .bind(new.end_date)
        .bind(new.price_per_entry)
        .bind(new.bundle_price)
        .bind(new.bundle_size)
        .bind(new.winner_count)
        .bind(&new.product_name)
        .bind(&new.product_description)
        .fetch_one(&self.pool)
        .await?;

        Ok(raffle)
    }

    async fn find_active_raffle(&self) -> Result<Option<RaffleConfig>, RepositoryError> {
        let raffle = sqlx::query_as::<_, RaffleConfig>(&format!(
            "SELECT {} FROM raffle_config WHERE is_active = TRUE",
            RAFFLE_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(raffle)
    }

    async fn find_raffle(&self, raffle_id: Uuid) -> Result<Option<RaffleConfig>, RepositoryError> {
        let raffle = sqlx::query_as::<_, RaffleConfig>(&format!(
            "SELECT {} FROM raffle_config WHERE id = $1",
            RAFFLE_COLUMNS
        ))
        .bind(raffle_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(raffle)
    }

    async fn update_raffle(
        &self,
        raffle_id: Uuid,
        update: RaffleConfigUpdate,
    ) -> Result<RaffleConfig, RepositoryError> {
        let raffle = sqlx::query_as::<_, RaffleConfig>(&format!(
            "UPDATE raffle_config SET \
                 name = COALESCE($2, name), \
                 start_date = COALESCE($3, start_date), \
                 end_date = COALESCE($4, end_date), \
                 price_per_entry = COALESCE($5, price_per_entry), \
                 bundle_price = COALESCE($6, bundle_price), \
                 bundle_size = COALESCE($7, bundle_size), \
                 product_name = COALESCE($8, product_name), \
                 product_description = COALESCE($9, product_description) \
             WHERE id = $1 \
             RETURNING {}",
            RAFFLE_COLUMNS
        ))
        .bind(raffle_id)
        .bind(update.name)
        .bind(update.start_date)
        .bind(update.end_date)
        .bind(update.price_per_entry)
        .bind(update.bundle_price)
        .bind(update.bundle_size)
        .bind(update.product_name)
        .bind(update.product_description)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("raffle {}", raffle_id)))?;

        Ok(raffle)
    }

    async fn insert_entry(&self, entry: Entry) -> Result<Entry, RepositoryError> {
        let inserted = sqlx::query_as::<_, Entry>(&format!(
            "INSERT INTO entries \
                 (id, raffle_id, email, count, amount, payment_status, payment_ref, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(entry.id)
        .bind(entry.raffle_id)
        .bind(&entry.email)
        .bind(entry.count)
        .bind(entry.amount)
        .bind(&entry.payment_status)
        .bind(&entry.payment_ref)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn find_entry(&self, entry_id: Uuid) -> Result<Option<Entry>, RepositoryError> {
        let entry = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries WHERE id = $1",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn update_payment_status(
        &self,
        entry_id: Uuid,
        status: PaymentStatus,
        payment_ref: Option<String>,
    ) -> Result<Entry, RepositoryError> {
        // Only a pending entry may transition; the guarded UPDATE makes the
        // transition atomic against concurrent webhook deliveries.
        let updated = sqlx::query_as::<_, Entry>(&format!(
            "UPDATE entries \
             SET payment_status = $2, payment_ref = COALESCE($3, payment_ref) \
             WHERE id = $1 AND payment_status = 'pending' \
             RETURNING {}",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .bind(status.as_str())
        .bind(payment_ref)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(entry) = updated {
            return Ok(entry);
        }

        // No pending row matched: either the entry is missing or it already
        // transitioned. Repeating the same outcome is idempotent.
        let current = self
            .find_entry(entry_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("entry {}", entry_id)))?;

        if current.payment_status_enum() == status {
            Ok(current)
        } else {
            Err(RepositoryError::ConstraintViolation(format!(
                "entry {} payment status is terminal ({})",
                entry_id, current.payment_status
            )))
        }
    }

    async fn tickets_for_entry(&self, entry_id: Uuid) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE entry_id = $1 ORDER BY ticket_number",
            TICKET_COLUMNS
        ))
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn tickets_ordered(&self, raffle_id: Uuid) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE raffle_id = $1 ORDER BY ticket_number",
            TICKET_COLUMNS
        ))
        .bind(raffle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn tickets_for_email(
        &self,
        raffle_id: Uuid,
        email: &str,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE raffle_id = $1 AND email = $2 ORDER BY ticket_number",
            TICKET_COLUMNS
        ))
        .bind(raffle_id)
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn find_ticket_by_number(
        &self,
        raffle_id: Uuid,
        ticket_number: i64,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE raffle_id = $1 AND ticket_number = $2",
            TICKET_COLUMNS
        ))
        .bind(raffle_id)
        .bind(ticket_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn ticket_count(&self, raffle_id: Uuid) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tickets WHERE raffle_id = $1",
        )
        .bind(raffle_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn active_pool_snapshot(&self) -> Result<Option<PoolSnapshot>, RepositoryError> {
        // One repeatable-read transaction: config, tickets and demand come
        // from the same database snapshot even while allocators commit.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut tx)
            .await?;

        let raffle = sqlx::query_as::<_, RaffleConfig>(&format!(
            "SELECT {} FROM raffle_config WHERE is_active = TRUE",
            RAFFLE_COLUMNS
        ))
        .fetch_optional(&mut tx)
        .await?;

        let raffle = match raffle {
            Some(raffle) => raffle,
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE raffle_id = $1 ORDER BY ticket_number",
            TICKET_COLUMNS
        ))
        .bind(raffle.id)
        .fetch_all(&mut tx)
        .await?;

        let allocated_demand = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(count), 0)::BIGINT FROM entries e \
             WHERE e.raffle_id = $1 AND e.payment_status = 'completed' \
               AND EXISTS (SELECT 1 FROM tickets t WHERE t.entry_id = e.id)",
        )
        .bind(raffle.id)
        .fetch_one(&mut tx)
        .await?;

        let (unallocated_entries, unallocated_demand) =
            sqlx::query_as::<_, (i64, i64)>(
                "SELECT COUNT(*)::BIGINT, COALESCE(SUM(count), 0)::BIGINT FROM entries e \
                 WHERE e.raffle_id = $1 AND e.payment_status = 'completed' \
                   AND NOT EXISTS (SELECT 1 FROM tickets t WHERE t.entry_id = e.id)",
            )
            .bind(raffle.id)
            .fetch_one(&mut tx)
            .await?;

        tx.rollback().await?;

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
        let mut tx = self.pool.begin().await?;

        // Row lock on the raffle config serializes allocators per raffle:
        // no two transactions can read the same high-water mark.
        let _config = sqlx::query_as::<_, RaffleConfig>(&format!(
            "SELECT {} FROM raffle_config WHERE id = $1 FOR UPDATE",
            RAFFLE_COLUMNS
        ))
        .bind(raffle_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("raffle {}", raffle_id)))?;

        let entry = sqlx::query_as::<_, Entry>(&format!(
            "SELECT {} FROM entries WHERE id = $1 AND raffle_id = $2",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .bind(raffle_id)
        .fetch_optional(&mut tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("entry {}", entry_id)))?;

        // Idempotency re-check under the lock: a concurrent call for the
        // same entry that won the lock first has already written the block.
        let existing = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {} FROM tickets WHERE entry_id = $1 ORDER BY ticket_number",
            TICKET_COLUMNS
        ))
        .bind(entry_id)
        .fetch_all(&mut tx)
        .await?;

        if let Some(range) = TicketRange::from_tickets(&existing) {
            tx.rollback().await?;
            return Ok(AllocatedBlock {
                range,
                freshly_allocated: false,
            });
        }

        let current_max = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(ticket_number), 0) FROM tickets WHERE raffle_id = $1",
        )
        .bind(raffle_id)
        .fetch_one(&mut tx)
        .await?;

        let start_number = current_max + 1;
        let end_number = current_max + i64::from(entry.count);

        sqlx::query(
            "INSERT INTO tickets (id, raffle_id, entry_id, email, ticket_number) \
             SELECT gen_random_uuid(), $1, $2, $3, gs \
             FROM generate_series($4::BIGINT, $5::BIGINT) AS gs",
        )
        .bind(raffle_id)
        .bind(entry_id)
        .bind(&entry.email)
        .bind(start_number)
        .bind(end_number)
        .execute(&mut tx)
        .await?;

        sqlx::query("UPDATE raffle_config SET total_entries = total_entries + $2 WHERE id = $1")
            .bind(raffle_id)
            .bind(i64::from(entry.count))
            .execute(&mut tx)
            .await?;

        tx.commit().await?;

        Ok(AllocatedBlock {
            range: TicketRange::new(start_number, end_number),
            freshly_allocated: true,
        })
    }

    async fn winners_for_raffle(&self, raffle_id: Uuid) -> Result<Vec<Winner>, RepositoryError> {
        let winners = sqlx::query_as::<_, Winner>(&format!(
            "SELECT {} FROM winners WHERE raffle_id = $1 ORDER BY slot",
            WINNER_COLUMNS
        ))
        .bind(raffle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(winners)
    }

    async fn insert_winner(&self, new: NewWinner) -> Result<Winner, RepositoryError> {
        // The unique (raffle_id, slot) index resolves the draw race: the
        // second writer gets a Duplicate and re-reads the first one's row.
        let winner = sqlx::query_as::<_, Winner>(&format!(
            "INSERT INTO winners \
                 (raffle_id, slot, winning_ticket_number, winner_entry_id, winner_email, \
                  total_tickets_in_pool, seed, derivation) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            WINNER_COLUMNS
        ))
        .bind(new.raffle_id)
        .bind(new.slot)
        .bind(new.winning_ticket_number)
        .bind(new.winner_entry_id)
        .bind(&new.winner_email)
        .bind(new.total_tickets_in_pool)
        .bind(&new.seed)
        .bind(&new.derivation)
        .fetch_one(&self.pool)
        .await?;

        Ok(winner)
    }

    async fn has_winner(&self, raffle_id: Uuid) -> Result<bool, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM winners WHERE raffle_id = $1",
        )
        .bind(raffle_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn insert_notification(
        &self,
        notification: AdminNotification,
    ) -> Result<AdminNotification, RepositoryError> {
        let inserted = sqlx::query_as::<_, AdminNotification>(
            "INSERT INTO admin_notifications (id, kind, title, message, data, is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, kind, title, message, data, is_read, created_at",
        )
        .bind(notification.id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .bind(notification.is_read)
        .bind(notification.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    async fn unread_notifications(
        &self,
        limit: i64,
    ) -> Result<Vec<AdminNotification>, RepositoryError> {
        let notifications = sqlx::query_as::<_, AdminNotification>(
            "SELECT id, kind, title, message, data, is_read, created_at \
             FROM admin_notifications WHERE is_read = FALSE \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }
}
