//! Process wiring for the inventory ledger.

pub mod services;

pub use services::{AppServices, build_services};
