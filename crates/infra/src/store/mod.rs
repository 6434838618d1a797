//! Record stores for the movement ledger, balances and count sessions.

pub mod in_memory;
pub mod postgres;
pub mod schema;
pub mod r#trait;

pub use in_memory::{InMemoryCountStore, InMemoryLedgerStore};
pub use postgres::{PostgresCountStore, PostgresLedgerStore};
pub use r#trait::{CountStore, LedgerReceipt, LedgerStore, StockStore};
