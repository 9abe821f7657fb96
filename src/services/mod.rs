pub mod allocation;
pub mod audit;
pub mod draw;
pub mod entry_service;
pub mod integrity;
pub mod notify;
pub mod raffle_service;

// Re-export all services for convenient access
pub use allocation::AllocationService;
pub use audit::{AuditLogEntry, AuditTrailService};
pub use draw::DrawService;
pub use entry_service::EntryService;
pub use integrity::{IntegrityIssue, IntegrityService, PoolReport};
pub use notify::NotificationService;
pub use raffle_service::RaffleService;
