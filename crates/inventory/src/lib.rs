//! Inventory stock ledger domain.
//!
//! This crate contains the business rules for stock movements, per-article
//! balances and physical count sessions, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod balance;
pub mod catalog;
pub mod count;
pub mod ledger;
pub mod movement;
pub mod payload;

pub use balance::StockBalance;
pub use catalog::CatalogArticle;
pub use count::{
    CountDetail, CountEntry, CountSession, CountState, CountSummary, NewCountSession, Operator,
    RecordCounts, SessionWorksheet, SnapshotLine, snapshot_lines,
};
pub use ledger::{LedgerPlan, MovementChange, plan_delete, plan_edit, plan_record, plan_seed};
pub use movement::{
    EditMovement, Movement, MovementKind, NewMovement, Quantity, RecordMovement, SeedStock,
    SignRule,
};
pub use payload::{CountsPayload, EditMovementPayload, MovementPayload, OpenSessionPayload};
