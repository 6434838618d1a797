use std::sync::Arc;

use medstock_core::{ArticleId, MovementId, SessionId};
use medstock_inventory::{
    CountDetail, CountEntry, CountSession, CountSummary, LedgerPlan, Movement, NewCountSession,
    SessionWorksheet, SnapshotLine, StockBalance,
};

use crate::error::StoreError;

/// Result of a committed ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Inserted, updated or deleted movement.
    pub movement_id: MovementId,
    pub balance: StockBalance,
}

/// Current balance per article (read side of the stock aggregate).
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    /// Point lookup; `None` when the article has no balance row yet.
    async fn get_balance(&self, article_id: ArticleId) -> Result<Option<StockBalance>, StoreError>;

    /// All balances, read as one consistent snapshot.
    async fn list_balances(&self) -> Result<Vec<StockBalance>, StoreError>;
}

/// Append-only movement log plus the balances derived from it.
///
/// `commit` is the only write path for both record sets. Implementations must:
/// - reject the plan with `StoreError::Concurrency` unless the article's
///   balance version equals `plan.expected_version`
/// - apply the movement change and the balance upsert atomically
/// - report a missing movement for update/delete as `StoreError::NotFound`
///   without writing anything
#[async_trait::async_trait]
pub trait LedgerStore: StockStore {
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    /// Movements in descending id order (newest insert first), optionally
    /// for one article. Editing a movement rewrites its `fecha` but does not
    /// move it in this listing.
    async fn list_movements(
        &self,
        article_id: Option<ArticleId>,
    ) -> Result<Vec<Movement>, StoreError>;

    async fn commit(&self, plan: LedgerPlan) -> Result<LedgerReceipt, StoreError>;
}

/// Count sessions and their detail rows.
#[async_trait::async_trait]
pub trait CountStore: Send + Sync {
    /// Insert the session (assigning id + folio) and all detail rows atomically.
    async fn create_session(
        &self,
        session: NewCountSession,
        lines: Vec<SnapshotLine>,
    ) -> Result<SessionWorksheet, StoreError>;

    async fn get_session(&self, id: SessionId) -> Result<Option<CountSession>, StoreError>;

    /// Sessions newest first.
    async fn list_sessions(&self) -> Result<Vec<CountSession>, StoreError>;

    async fn list_details(&self, id: SessionId) -> Result<Vec<CountDetail>, StoreError>;

    /// Overwrite `cantidad_real` for each entry whose detail belongs to the
    /// session; other entries are reported as skipped.
    async fn record_counts(
        &self,
        id: SessionId,
        entries: &[CountEntry],
    ) -> Result<CountSummary, StoreError>;

    /// Delete the session and its details. Returns `false` if it did not exist.
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn get_balance(&self, article_id: ArticleId) -> Result<Option<StockBalance>, StoreError> {
        (**self).get_balance(article_id).await
    }

    async fn list_balances(&self) -> Result<Vec<StockBalance>, StoreError> {
        (**self).list_balances().await
    }
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        (**self).get_movement(id).await
    }

    async fn list_movements(
        &self,
        article_id: Option<ArticleId>,
    ) -> Result<Vec<Movement>, StoreError> {
        (**self).list_movements(article_id).await
    }

    async fn commit(&self, plan: LedgerPlan) -> Result<LedgerReceipt, StoreError> {
        (**self).commit(plan).await
    }
}

#[async_trait::async_trait]
impl<S> CountStore for Arc<S>
where
    S: CountStore + ?Sized,
{
    async fn create_session(
        &self,
        session: NewCountSession,
        lines: Vec<SnapshotLine>,
    ) -> Result<SessionWorksheet, StoreError> {
        (**self).create_session(session, lines).await
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<CountSession>, StoreError> {
        (**self).get_session(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<CountSession>, StoreError> {
        (**self).list_sessions().await
    }

    async fn list_details(&self, id: SessionId) -> Result<Vec<CountDetail>, StoreError> {
        (**self).list_details(id).await
    }

    async fn record_counts(
        &self,
        id: SessionId,
        entries: &[CountEntry],
    ) -> Result<CountSummary, StoreError> {
        (**self).record_counts(id, entries).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        (**self).delete_session(id).await
    }
}
