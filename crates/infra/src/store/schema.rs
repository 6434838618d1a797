//! Idempotent DDL for the ledger and count-session tables.
//!
//! `articulos` belongs to the catalog and is only read here; it is created
//! when missing so a fresh database is usable for development.

use sqlx::PgPool;
use tracing::{info, instrument};

use crate::error::{StoreError, map_sqlx_error};

const STATEMENTS: &[(&str, &str)] = &[
    (
        "articulos",
        r#"
        CREATE TABLE IF NOT EXISTS articulos (
            id           BIGSERIAL PRIMARY KEY,
            categoria_id BIGINT NULL
        )
        "#,
    ),
    (
        "inventarios",
        r#"
        CREATE TABLE IF NOT EXISTS inventarios (
            articulo_id          BIGINT PRIMARY KEY,
            cantidad_actual      NUMERIC NOT NULL DEFAULT 0,
            ultima_actualizacion TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            version              BIGINT NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "movimientos_inventario",
        r#"
        CREATE TABLE IF NOT EXISTS movimientos_inventario (
            id              BIGSERIAL PRIMARY KEY,
            articulo_id     BIGINT NOT NULL,
            tipo_movimiento TEXT NOT NULL CHECK (tipo_movimiento IN (
                'alta', 'compra', 'venta', 'baja', 'robo',
                'transferencia_entrada', 'transferencia_salida', 'ajuste_inventario'
            )),
            cantidad        NUMERIC NOT NULL,
            motivo          TEXT NULL,
            usuario_nombre  TEXT NOT NULL,
            fecha           TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "movimientos_inventario_articulo_idx",
        r#"
        CREATE INDEX IF NOT EXISTS movimientos_inventario_articulo_idx
            ON movimientos_inventario (articulo_id, id DESC)
        "#,
    ),
    (
        "tomafisica",
        r#"
        CREATE TABLE IF NOT EXISTS tomafisica (
            id                BIGSERIAL PRIMARY KEY,
            folio             BIGSERIAL UNIQUE,
            fecha_inicio      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            fecha_fin         TIMESTAMPTZ NULL,
            estado            TEXT NOT NULL DEFAULT 'abierta'
                              CHECK (estado IN ('abierta', 'cerrada')),
            categoria_id      BIGINT NULL,
            usuario_auth0_sub TEXT NOT NULL,
            usuario_correo    TEXT NULL
        )
        "#,
    ),
    (
        "tomafisicadetalle",
        r#"
        CREATE TABLE IF NOT EXISTS tomafisicadetalle (
            id               BIGSERIAL PRIMARY KEY,
            toma_id          BIGINT NOT NULL REFERENCES tomafisica (id) ON DELETE CASCADE,
            articulo_id      BIGINT NOT NULL,
            cantidad_teorica NUMERIC NOT NULL,
            cantidad_real    NUMERIC NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "tomafisicadetalle_toma_idx",
        r#"
        CREATE INDEX IF NOT EXISTS tomafisicadetalle_toma_idx
            ON tomafisicadetalle (toma_id)
        "#,
    ),
];

/// Apply every statement; safe to run repeatedly.
#[instrument(skip(pool), err)]
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for (name, ddl) in STATEMENTS {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error(name, e))?;
        info!(object = name, "schema object ensured");
    }
    Ok(())
}
