//! Movement ledger service.
//!
//! Every write follows the same pipeline:
//!
//! ```text
//! read (movement?, balance) -> plan (pure) -> commit (version-checked)
//!                  ^                                   |
//!                  +------- retry on Concurrency ------+
//! ```
//!
//! The store guarantees that the movement change and the balance update land
//! together, so a failed attempt leaves no partial state behind.

use std::future::Future;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use medstock_core::{ArticleId, MovementId};
use medstock_inventory::{
    EditMovement, Movement, RecordMovement, SeedStock, StockBalance, plan_delete, plan_edit,
    plan_record, plan_seed,
};

use crate::config::DEFAULT_LEDGER_MAX_RETRIES;
use crate::error::LedgerError;
use crate::store::{LedgerReceipt, LedgerStore};

/// Append-only movement log with per-article derived balances.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S> {
    store: S,
    max_attempts: u32,
}

impl<S> InventoryLedger<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self::with_max_attempts(store, DEFAULT_LEDGER_MAX_RETRIES)
    }

    pub fn with_max_attempts(store: S, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(
        skip(self, cmd),
        fields(articulo_id = %cmd.article_id, tipo_movimiento = %cmd.kind),
        err
    )]
    pub async fn record_movement(&self, cmd: &RecordMovement) -> Result<LedgerReceipt, LedgerError> {
        self.with_retry("record_movement", move || async move {
            let current = self.store.get_balance(cmd.article_id).await?;
            let plan = plan_record(cmd, current.as_ref())?;
            Ok::<_, LedgerError>(self.store.commit(plan).await?)
        })
        .await
    }

    /// Initial `alta` intake for an article that has no balance yet.
    #[instrument(skip(self, cmd), fields(articulo_id = %cmd.article_id), err)]
    pub async fn seed_article_stock(&self, cmd: &SeedStock) -> Result<LedgerReceipt, LedgerError> {
        self.with_retry("seed_article_stock", move || async move {
            let current = self.store.get_balance(cmd.article_id).await?;
            let plan = plan_seed(cmd, current.as_ref())?;
            Ok::<_, LedgerError>(self.store.commit(plan).await?)
        })
        .await
    }

    #[instrument(skip(self, cmd), fields(movement_id = %cmd.movement_id), err)]
    pub async fn edit_movement(&self, cmd: &EditMovement) -> Result<LedgerReceipt, LedgerError> {
        self.with_retry("edit_movement", move || async move {
            let (original, current) = self.load_for_update(cmd.movement_id).await?;
            let plan = plan_edit(cmd, &original, &current)?;
            Ok::<_, LedgerError>(self.store.commit(plan).await?)
        })
        .await
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    pub async fn delete_movement(&self, id: MovementId) -> Result<LedgerReceipt, LedgerError> {
        self.with_retry("delete_movement", move || async move {
            let (original, current) = self.load_for_update(id).await?;
            let plan = plan_delete(&original, &current, Utc::now())?;
            Ok::<_, LedgerError>(self.store.commit(plan).await?)
        })
        .await
    }

    /// Movements newest first, optionally restricted to one article.
    #[instrument(skip(self), err)]
    pub async fn movement_report(
        &self,
        article_id: Option<ArticleId>,
    ) -> Result<Vec<Movement>, LedgerError> {
        Ok(self.store.list_movements(article_id).await?)
    }

    #[instrument(skip(self), err)]
    pub async fn inventory_report(&self) -> Result<Vec<StockBalance>, LedgerError> {
        Ok(self.store.list_balances().await?)
    }

    /// Current balance; `None` when the article never had a movement.
    pub async fn balance(&self, article_id: ArticleId) -> Result<Option<StockBalance>, LedgerError> {
        Ok(self.store.get_balance(article_id).await?)
    }

    pub async fn movement(&self, id: MovementId) -> Result<Movement, LedgerError> {
        self.store
            .get_movement(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("movement {id}")))
    }

    /// Movement + its article's balance, both required to exist.
    async fn load_for_update(
        &self,
        id: MovementId,
    ) -> Result<(Movement, StockBalance), LedgerError> {
        let located = self.movement(id).await?;
        let current = self
            .store
            .get_balance(located.article_id)
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!("balance for article {}", located.article_id))
            })?;
        // Re-read after the balance: any later change to the movement bumps
        // the balance version and fails the commit.
        let original = self.movement(id).await?;
        Ok((original, current))
    }

    async fn with_retry<F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<LedgerReceipt, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<LedgerReceipt, LedgerError>>,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            match attempt().await {
                Err(err) if err.is_concurrency() => {
                    if tries >= self.max_attempts {
                        warn!(operation, attempts = tries, error = %err, "ledger write contention, giving up");
                        return Err(LedgerError::RetriesExhausted {
                            attempts: tries,
                            message: err.to_string(),
                        });
                    }
                    debug!(operation, attempt = tries, error = %err, "ledger write conflicted, retrying");
                }
                other => return other,
            }
        }
    }
}
