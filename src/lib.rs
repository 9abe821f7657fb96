//! Raffle Backend Library
//!
//! Ticket allocation and draw engine for a single-raffle storefront:
//! completed payments become contiguous blocks of globally unique ticket
//! numbers exactly once, the pool stays gap-free and duplicate-free, and
//! winners are drawn uniformly with a recomputable seeded procedure.

pub mod config;
pub mod database;
pub mod error;
pub mod http_service;
pub mod models;
pub mod monitor;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repositories::RaffleStore;
use services::{
    AllocationService, AuditTrailService, DrawService, EntryService, IntegrityService,
    NotificationService, RaffleService,
};
use std::sync::Arc;
use std::time::Duration;

/// Application state containing the store and all services
pub struct AppState {
    pub store: Arc<dyn RaffleStore>,
    pub raffles: RaffleService,
    pub entries: EntryService,
    pub allocator: Arc<AllocationService>,
    pub draw: DrawService,
    pub integrity: IntegrityService,
    pub notifier: Arc<NotificationService>,
}

impl AppState {
    /// Wire up all services over a store
    pub fn new(
        store: Arc<dyn RaffleStore>,
        audit: Option<Arc<AuditTrailService>>,
        allocation_max_retries: u32,
        allocation_backoff: Duration,
    ) -> Self {
        let notifier = Arc::new(NotificationService::new(store.clone()));

        let mut allocator = AllocationService::new(
            store.clone(),
            notifier.clone(),
            allocation_max_retries,
            allocation_backoff,
        );
        if let Some(audit) = &audit {
            allocator = allocator.with_audit(audit.clone());
        }
        let allocator = Arc::new(allocator);

        let mut draw = DrawService::new(store.clone(), notifier.clone());
        if let Some(audit) = &audit {
            draw = draw.with_audit(audit.clone());
        }

        Self {
            store: store.clone(),
            raffles: RaffleService::new(store.clone()),
            entries: EntryService::new(store.clone(), allocator.clone(), notifier.clone()),
            allocator,
            draw,
            integrity: IntegrityService::new(store),
            notifier,
        }
    }

    /// Convenience constructor from application config
    pub fn from_config(
        store: Arc<dyn RaffleStore>,
        audit: Option<Arc<AuditTrailService>>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            store,
            audit,
            config.allocation_max_retries,
            config.allocation_backoff(),
        )
    }
}
