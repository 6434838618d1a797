//! Physical count sessions (`toma física`).
//!
//! A session freezes the ledger-derived balance of every qualifying article
//! at open time (`cantidad_teorica`) and collects operator recounts
//! (`cantidad_real`). Nothing here writes back to the ledger.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{
    ArticleId, CategoryId, DetailId, DomainError, DomainResult, SessionId,
};

use crate::balance::StockBalance;
use crate::catalog::CatalogArticle;
use crate::movement::Quantity;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountState {
    Abierta,
    Cerrada,
}

impl CountState {
    pub fn as_str(self) -> &'static str {
        match self {
            CountState::Abierta => "abierta",
            CountState::Cerrada => "cerrada",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "abierta" => Ok(CountState::Abierta),
            "cerrada" => Ok(CountState::Cerrada),
            other => Err(DomainError::validation(format!("unknown session state '{other}'"))),
        }
    }
}

/// Identity of the operator who opened a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    #[serde(rename = "usuario_auth0_sub")]
    pub subject: String,
    #[serde(rename = "usuario_correo")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountSession {
    pub id: SessionId,
    /// Human-facing sequence number.
    pub folio: i64,
    #[serde(rename = "fecha_inicio")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "fecha_fin")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "estado")]
    pub state: CountState,
    #[serde(rename = "categoria_id")]
    pub category_id: Option<CategoryId>,
    #[serde(flatten)]
    pub operator: Operator,
}

impl CountSession {
    pub fn ensure_open(&self) -> DomainResult<()> {
        if self.state != CountState::Abierta {
            return Err(DomainError::validation(format!(
                "count session {} is {}",
                self.id,
                self.state.as_str()
            )));
        }
        Ok(())
    }
}

/// Command: OpenSession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCountSession {
    pub category_id: Option<CategoryId>,
    pub operator: Operator,
    pub started_at: DateTime<Utc>,
}

impl NewCountSession {
    pub fn new(
        category_id: Option<i64>,
        operator: Operator,
        started_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if operator.subject.trim().is_empty() {
            return Err(DomainError::validation("operator identity cannot be empty"));
        }
        Ok(Self {
            category_id: category_id.map(CategoryId::new).transpose()?,
            operator,
            started_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDetail {
    pub id: DetailId,
    #[serde(rename = "toma_id")]
    pub session_id: SessionId,
    #[serde(rename = "articulo_id")]
    pub article_id: ArticleId,
    /// Balance snapshot taken when the session was opened.
    #[serde(rename = "cantidad_teorica")]
    pub expected: Quantity,
    #[serde(rename = "cantidad_real")]
    pub counted: Quantity,
}

impl CountDetail {
    /// Recount minus snapshot; positive means more stock on the shelf than
    /// the ledger says.
    pub fn variance(&self) -> Quantity {
        self.counted - self.expected
    }
}

/// One detail row to be created by OpenSession.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SnapshotLine {
    pub article_id: ArticleId,
    pub expected: Quantity,
}

/// Join catalog articles with current balances; articles without a balance
/// snapshot as zero.
pub fn snapshot_lines(articles: &[CatalogArticle], balances: &[StockBalance]) -> Vec<SnapshotLine> {
    let by_article: HashMap<ArticleId, Quantity> =
        balances.iter().map(|b| (b.article_id, b.quantity)).collect();

    articles
        .iter()
        .map(|a| SnapshotLine {
            article_id: a.article_id,
            expected: by_article.get(&a.article_id).copied().unwrap_or(Decimal::ZERO),
        })
        .collect()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CountEntry {
    pub detail_id: DetailId,
    pub counted: Quantity,
}

/// Command: RecordCounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCounts {
    pub session_id: SessionId,
    pub entries: Vec<CountEntry>,
}

impl RecordCounts {
    pub fn new(session_id: i64, entries: Vec<(i64, Quantity)>) -> DomainResult<Self> {
        let session_id = SessionId::new(session_id)?;
        let entries = entries
            .into_iter()
            .map(|(detail, counted)| {
                if counted < Decimal::ZERO {
                    return Err(DomainError::validation(format!(
                        "cantidad_real for detail {detail} cannot be negative"
                    )));
                }
                // Non-positive ids cannot match any row; keep them so they
                // are reported as skipped.
                Ok(CountEntry {
                    detail_id: DetailId::from_raw(detail),
                    counted,
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Self { session_id, entries })
    }
}

/// Outcome of RecordCounts: unmatched details are skipped, not fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountSummary {
    pub updated: Vec<DetailId>,
    pub skipped: Vec<DetailId>,
}

/// A session with its detail rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionWorksheet {
    #[serde(flatten)]
    pub session: CountSession,
    #[serde(rename = "detalles")]
    pub details: Vec<CountDetail>,
}

impl SessionWorksheet {
    pub fn total_variance(&self) -> Quantity {
        self.details.iter().map(CountDetail::variance).sum()
    }
}
