use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{ArticleId, ExpectedVersion};

use crate::movement::Quantity;

/// Current on-hand quantity for one article.
///
/// The quantity may go negative; that signals an oversold or miscounted
/// article and is never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    #[serde(rename = "articulo_id")]
    pub article_id: ArticleId,
    #[serde(rename = "cantidad_actual")]
    pub quantity: Quantity,
    #[serde(rename = "ultima_actualizacion")]
    pub updated_at: DateTime<Utc>,
    /// Number of committed ledger writes for this article (`0` = no row).
    pub version: u64,
}

impl StockBalance {
    /// Quantity on hand, treating a missing balance as zero.
    pub fn quantity_of(current: Option<&StockBalance>) -> Quantity {
        current.map(|b| b.quantity).unwrap_or(Decimal::ZERO)
    }

    /// Version a writer must observe to replace `current`.
    pub fn expected_version_of(current: Option<&StockBalance>) -> ExpectedVersion {
        ExpectedVersion::Exact(current.map(|b| b.version).unwrap_or(0))
    }

    /// Upsert semantics: the record that replaces `current` (or creates the
    /// first one) with `quantity` at `at`.
    pub fn set(
        current: Option<&StockBalance>,
        article_id: ArticleId,
        quantity: Quantity,
        at: DateTime<Utc>,
    ) -> StockBalance {
        StockBalance {
            article_id,
            quantity,
            updated_at: at,
            version: current.map(|b| b.version).unwrap_or(0) + 1,
        }
    }
}
