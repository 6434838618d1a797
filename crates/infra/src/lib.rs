//! Infrastructure layer: record stores, catalog boundary, ledger and count
//! services, configuration.

pub mod catalog;
pub mod config;
pub mod count_service;
pub mod error;
pub mod ledger_service;
pub mod store;

pub use catalog::{ArticleCatalog, InMemoryCatalog, PostgresCatalog};
pub use config::{ConfigError, InventoryConfig};
pub use count_service::CountSessions;
pub use error::{ErrorKind, LedgerError, StoreError};
pub use ledger_service::InventoryLedger;
pub use store::{
    CountStore, InMemoryCountStore, InMemoryLedgerStore, LedgerReceipt, LedgerStore,
    PostgresCountStore, PostgresLedgerStore, StockStore,
};
