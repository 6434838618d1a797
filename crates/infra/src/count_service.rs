//! Physical count sessions (`toma física`).
//!
//! Opening a session joins the catalog with one read of all balances and
//! stores the result as a fixed baseline. Counting and cancelling never touch
//! the ledger.

use tracing::{info, instrument};

use medstock_core::SessionId;
use medstock_inventory::{
    CountSession, CountSummary, NewCountSession, RecordCounts, SessionWorksheet, snapshot_lines,
};

use crate::catalog::ArticleCatalog;
use crate::error::LedgerError;
use crate::store::{CountStore, StockStore};

#[derive(Debug, Clone)]
pub struct CountSessions<C, S, A> {
    counts: C,
    stock: S,
    catalog: A,
}

impl<C, S, A> CountSessions<C, S, A>
where
    C: CountStore,
    S: StockStore,
    A: ArticleCatalog,
{
    pub fn new(counts: C, stock: S, catalog: A) -> Self {
        Self {
            counts,
            stock,
            catalog,
        }
    }

    #[instrument(
        skip(self, cmd),
        fields(categoria_id = ?cmd.category_id, toma_id, folio),
        err
    )]
    pub async fn open_session(&self, cmd: NewCountSession) -> Result<SessionWorksheet, LedgerError> {
        let articles = self.catalog.list_articles(cmd.category_id).await?;
        let balances = self.stock.list_balances().await?;
        let lines = snapshot_lines(&articles, &balances);

        let worksheet = self.counts.create_session(cmd, lines).await?;

        let span = tracing::Span::current();
        span.record("toma_id", worksheet.session.id.get());
        span.record("folio", worksheet.session.folio);
        info!(details = worksheet.details.len(), "count session opened");
        Ok(worksheet)
    }

    /// Overwrite recounts; unmatched detail ids are skipped and reported.
    #[instrument(skip(self, cmd), fields(toma_id = %cmd.session_id), err)]
    pub async fn record_counts(&self, cmd: &RecordCounts) -> Result<CountSummary, LedgerError> {
        let session = self.session(cmd.session_id).await?;
        session.ensure_open()?;

        let summary = self.counts.record_counts(cmd.session_id, &cmd.entries).await?;
        if !summary.skipped.is_empty() {
            info!(skipped = ?summary.skipped, "count entries skipped");
        }
        Ok(summary)
    }

    /// Hard-delete the session and its details.
    #[instrument(skip(self), fields(toma_id = %id), err)]
    pub async fn cancel_session(&self, id: SessionId) -> Result<(), LedgerError> {
        if !self.counts.delete_session(id).await? {
            return Err(LedgerError::not_found(format!("count session {id}")));
        }
        info!("count session cancelled");
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<CountSession>, LedgerError> {
        Ok(self.counts.list_sessions().await?)
    }

    #[instrument(skip(self), fields(toma_id = %id), err)]
    pub async fn session_detail(&self, id: SessionId) -> Result<SessionWorksheet, LedgerError> {
        let session = self.session(id).await?;
        let details = self.counts.list_details(id).await?;
        Ok(SessionWorksheet { session, details })
    }

    async fn session(&self, id: SessionId) -> Result<CountSession, LedgerError> {
        self.counts
            .get_session(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("count session {id}")))
    }
}
