use crate::error::AppError;
use crate::models::{
    AdminNotification, AllocatedBlock, DrawResult, Entry, NewRaffleConfig, PaymentStatus,
    RaffleConfig, RaffleConfigUpdate, RaffleStatus, Ticket, TicketStats, Winner,
};
use crate::services::PoolReport;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// JSON error body returned for every failed request
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CreateEntryRequest {
    email: String,
    count: i32,
    amount: i64,
    payment_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentOutcomeRequest {
    status: PaymentStatus,
    payment_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct PaymentOutcomeResponse {
    entry: Entry,
    block: Option<AllocatedBlock>,
}

#[derive(Debug, Serialize)]
struct TicketsResponse {
    entry_id: Uuid,
    tickets: Vec<Ticket>,
}

#[derive(Debug, Deserialize)]
struct TicketLookupQuery {
    email: String,
}

#[derive(Debug, Serialize)]
struct EmailTicketsResponse {
    email: String,
    ticket_count: usize,
    tickets: Vec<Ticket>,
}

#[derive(Debug, Deserialize)]
struct NotificationsQuery {
    #[serde(default = "default_notification_limit")]
    limit: i64,
}

fn default_notification_limit() -> i64 {
    50
}

/// Build the HTTP API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/raffle", post(create_raffle))
        .route("/api/raffle/active", get(get_active_raffle).patch(update_raffle))
        .route("/api/raffle/status", get(raffle_status))
        .route("/api/raffle/draw", post(draw_winners))
        .route("/api/raffle/winners", get(list_winners))
        .route("/api/raffle/tickets", get(lookup_tickets_by_email))
        .route("/api/entries", post(create_entry))
        .route("/api/entries/:id/payment", post(record_payment))
        .route(
            "/api/entries/:id/tickets",
            post(allocate_tickets).get(list_tickets),
        )
        .route("/api/pool/validate", get(validate_pool))
        .route("/api/pool/stats", get(pool_stats))
        .route("/api/notifications", get(list_notifications))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_raffle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewRaffleConfig>,
) -> Result<(StatusCode, Json<RaffleConfig>), AppError> {
    let raffle = state.raffles.create(req).await?;
    Ok((StatusCode::CREATED, Json(raffle)))
}

async fn get_active_raffle(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RaffleConfig>, AppError> {
    let raffle = state
        .raffles
        .get_active()
        .await?
        .ok_or(AppError::RaffleNotFound)?;
    Ok(Json(raffle))
}

async fn update_raffle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RaffleConfigUpdate>,
) -> Result<Json<RaffleConfig>, AppError> {
    let raffle = state.raffles.update(req).await?;
    Ok(Json(raffle))
}

async fn raffle_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RaffleStatus>, AppError> {
    let status = state.raffles.status().await?;
    Ok(Json(status))
}

async fn create_entry(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<Entry>), AppError> {
    let entry = state
        .entries
        .create_entry(&req.email, req.count, req.amount, req.payment_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<PaymentOutcomeRequest>,
) -> Result<Json<PaymentOutcomeResponse>, AppError> {
    let (entry, block) = state
        .entries
        .record_payment(entry_id, req.status, req.payment_ref)
        .await?;
    Ok(Json(PaymentOutcomeResponse { entry, block }))
}

async fn allocate_tickets(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<AllocatedBlock>, AppError> {
    let block = state.allocator.allocate_tickets(entry_id).await?;
    Ok(Json(block))
}

async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<TicketsResponse>, AppError> {
    let tickets = state.entries.tickets(entry_id).await?;
    Ok(Json(TicketsResponse { entry_id, tickets }))
}

async fn lookup_tickets_by_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TicketLookupQuery>,
) -> Result<Json<EmailTicketsResponse>, AppError> {
    let tickets = state.entries.tickets_by_email(&query.email).await?;
    Ok(Json(EmailTicketsResponse {
        email: query.email.trim().to_lowercase(),
        ticket_count: tickets.len(),
        tickets,
    }))
}

async fn pool_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TicketStats>, AppError> {
    let stats = state.raffles.ticket_stats().await?;
    Ok(Json(stats))
}

async fn validate_pool(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PoolReport>, AppError> {
    let report = state.integrity.validate_pool().await?;
    Ok(Json(report))
}

async fn draw_winners(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DrawResult>, AppError> {
    let result = state.draw.select_winners().await?;
    Ok(Json(result))
}

async fn list_winners(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Winner>>, AppError> {
    let winners = state.draw.winners().await?;
    Ok(Json(winners))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<AdminNotification>>, AppError> {
    let notifications = state
        .store
        .unread_notifications(query.limit)
        .await
        .map_err(AppError::from)?;
    Ok(Json(notifications))
}
