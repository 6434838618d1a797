use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use medstock_infra::InventoryConfig;
use medstock_infra::store::schema;

/// Apply the inventory schema to `DATABASE_URL`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    medstock_observability::init();

    let config = InventoryConfig::from_env();
    let database_url = config.require_database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    schema::migrate(&pool)
        .await
        .context("failed to apply inventory schema")?;

    tracing::info!("inventory schema is up to date");
    pool.close().await;
    Ok(())
}
