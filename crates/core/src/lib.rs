//! `medstock-core`: foundation building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod concurrency;
pub mod error;
pub mod id;

pub use concurrency::ExpectedVersion;
pub use error::{DomainError, DomainResult};
pub use id::{ArticleId, CategoryId, DetailId, MovementId, SessionId};
