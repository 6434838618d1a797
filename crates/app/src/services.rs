//! Composition root: pick the store backend from configuration and wire the
//! ledger and count-session services onto it.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;

use medstock_core::{ArticleId, MovementId, SessionId};
use medstock_infra::store::schema;
use medstock_infra::{
    ArticleCatalog, CountSessions, CountStore, InMemoryCatalog, InMemoryCountStore,
    InMemoryLedgerStore, InventoryConfig, InventoryLedger, LedgerError, LedgerReceipt,
    LedgerStore, PostgresCatalog, PostgresCountStore, PostgresLedgerStore,
};
use medstock_inventory::{
    CountSession, CountSummary, CountsPayload, EditMovementPayload, Movement, MovementPayload,
    OpenSessionPayload, Operator, Quantity, SeedStock, SessionWorksheet, StockBalance,
};

pub type SharedLedgerStore = Arc<dyn LedgerStore>;
pub type SharedCountStore = Arc<dyn CountStore>;
pub type SharedCatalog = Arc<dyn ArticleCatalog>;

/// Backend-agnostic services handed to the transport layer.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<InventoryLedger<SharedLedgerStore>>,
    pub counts: Arc<CountSessions<SharedCountStore, SharedLedgerStore, SharedCatalog>>,
}

pub async fn build_services(config: &InventoryConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        return build_persistent_services(config).await;
    }
    tracing::info!("using in-memory stores");
    Ok(AppServices::in_memory(
        Arc::new(InMemoryCatalog::new()),
        config.ledger_max_retries,
    ))
}

async fn build_persistent_services(config: &InventoryConfig) -> anyhow::Result<AppServices> {
    let database_url = config.require_database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    schema::migrate(&pool)
        .await
        .context("failed to apply inventory schema")?;

    tracing::info!(max_connections = config.max_connections, "using Postgres stores");

    let stock: SharedLedgerStore = Arc::new(PostgresLedgerStore::new(pool.clone()));
    let counts: SharedCountStore = Arc::new(PostgresCountStore::new(pool.clone()));
    let catalog: SharedCatalog = Arc::new(PostgresCatalog::new(pool));

    Ok(AppServices::assemble(stock, counts, catalog, config.ledger_max_retries))
}

impl AppServices {
    /// Dev/test wiring over in-memory stores and the given catalog fixture.
    pub fn in_memory(catalog: Arc<InMemoryCatalog>, ledger_max_retries: u32) -> Self {
        Self::assemble(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryCountStore::new()),
            catalog,
            ledger_max_retries,
        )
    }

    fn assemble(
        stock: SharedLedgerStore,
        counts: SharedCountStore,
        catalog: SharedCatalog,
        ledger_max_retries: u32,
    ) -> Self {
        Self {
            ledger: Arc::new(InventoryLedger::with_max_attempts(
                Arc::clone(&stock),
                ledger_max_retries,
            )),
            counts: Arc::new(CountSessions::new(counts, stock, catalog)),
        }
    }

    // Boundary entry points: untyped payloads are validated once here and
    // timestamped with the server clock.

    pub async fn record_movement(
        &self,
        payload: MovementPayload,
        usuario: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        let cmd = payload.into_command(usuario, Utc::now())?;
        self.ledger.record_movement(&cmd).await
    }

    pub async fn seed_article_stock(
        &self,
        articulo_id: i64,
        cantidad_inicial: Quantity,
        usuario: &str,
    ) -> Result<LedgerReceipt, LedgerError> {
        let cmd = SeedStock::new(articulo_id, cantidad_inicial, usuario, Utc::now())?;
        self.ledger.seed_article_stock(&cmd).await
    }

    pub async fn edit_movement(
        &self,
        payload: EditMovementPayload,
    ) -> Result<LedgerReceipt, LedgerError> {
        let cmd = payload.into_command(Utc::now())?;
        self.ledger.edit_movement(&cmd).await
    }

    pub async fn delete_movement(&self, id: i64) -> Result<LedgerReceipt, LedgerError> {
        self.ledger.delete_movement(MovementId::new(id)?).await
    }

    pub async fn movement_report(
        &self,
        articulo_id: Option<i64>,
    ) -> Result<Vec<Movement>, LedgerError> {
        let article = articulo_id.map(ArticleId::new).transpose()?;
        self.ledger.movement_report(article).await
    }

    pub async fn inventory_report(&self) -> Result<Vec<StockBalance>, LedgerError> {
        self.ledger.inventory_report().await
    }

    pub async fn open_session(
        &self,
        payload: OpenSessionPayload,
        operator: Operator,
    ) -> Result<SessionWorksheet, LedgerError> {
        let cmd = payload.into_command(operator, Utc::now())?;
        self.counts.open_session(cmd).await
    }

    pub async fn record_counts(&self, payload: CountsPayload) -> Result<CountSummary, LedgerError> {
        let cmd = payload.into_command()?;
        self.counts.record_counts(&cmd).await
    }

    pub async fn cancel_session(&self, toma_id: i64) -> Result<(), LedgerError> {
        self.counts.cancel_session(SessionId::new(toma_id)?).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<CountSession>, LedgerError> {
        self.counts.list_sessions().await
    }

    pub async fn session_detail(&self, toma_id: i64) -> Result<SessionWorksheet, LedgerError> {
        self.counts.session_detail(SessionId::new(toma_id)?).await
    }
}
