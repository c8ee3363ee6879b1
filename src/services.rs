//! Per-resource services built on the shared runtime.

pub mod messages;
pub mod money_balances;

// Re-export for convenience
pub use messages::MessagesService;
pub use money_balances::MoneyBalancesService;
