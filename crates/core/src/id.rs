//! Strongly-typed identifiers used across the domain.
//!
//! Records are keyed by database-assigned integer sequences, so every id is a
//! positive `i64` wrapped in its own newtype.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an article in the external catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(i64);

/// Identifier of an article category in the external catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(i64);

/// Identifier of a ledger movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(i64);

/// Identifier of a physical count session (`toma física`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

/// Identifier of one count detail row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetailId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Validate and wrap a raw identifier; ids must be positive.
            pub fn new(raw: i64) -> Result<Self, DomainError> {
                if raw <= 0 {
                    return Err(DomainError::validation(format!(
                        "{} must be positive (got {raw})",
                        $name
                    )));
                }
                Ok(Self(raw))
            }

            /// Wrap a raw identifier read back from storage without validation.
            pub fn from_raw(raw: i64) -> Self {
                Self(raw)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::validation(format!("{}: {}", $name, e)))?;
                Self::new(raw)
            }
        }
    };
}

impl_i64_newtype!(ArticleId, "articulo_id");
impl_i64_newtype!(CategoryId, "categoria_id");
impl_i64_newtype!(MovementId, "movement id");
impl_i64_newtype!(SessionId, "toma_id");
impl_i64_newtype!(DetailId, "detalle_id");
