pub mod entry;
pub mod notification;
pub mod raffle;
pub mod ticket;
pub mod winner;

// Re-export all models for convenient access
pub use entry::{Entry, PaymentStatus};
pub use notification::{AdminNotification, NotificationKind};
pub use raffle::{NewRaffleConfig, RaffleConfig, RaffleConfigUpdate, RaffleStatus};
pub use ticket::{AllocatedBlock, Ticket, TicketRange, TicketStats};
pub use winner::{DrawResult, NewWinner, Winner, DRAW_DERIVATION};
