//! Postgres-backed ledger and count-session stores.
//!
//! ## Concurrency
//!
//! `commit` runs in one transaction that locks the article's balance row
//! (`SELECT ... FOR UPDATE`), checks its version against the plan, applies the
//! movement change and writes the new balance. Two writers racing to create
//! the first balance row collide on the primary key (`23505`), which maps to
//! `StoreError::Concurrency` like a version mismatch does.
//!
//! ## Error Mapping
//!
//! | Situation | StoreError |
//! |-----------|------------|
//! | version mismatch, unique violation, serialization failure | `Concurrency` |
//! | movement to update/delete is gone | `NotFound` |
//! | anything else (pool, network, decode) | `Backend` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use medstock_core::{ArticleId, CategoryId, DetailId, MovementId, SessionId};
use medstock_inventory::{
    CountDetail, CountEntry, CountSession, CountState, CountSummary, LedgerPlan, Movement,
    MovementChange, MovementKind, NewCountSession, Operator, SessionWorksheet, SnapshotLine,
    StockBalance,
};

use super::r#trait::{CountStore, LedgerReceipt, LedgerStore, StockStore};
use crate::error::{StoreError, map_sqlx_error};

/// Postgres-backed movement log + balances (`movimientos_inventario`,
/// `inventarios`).
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl StockStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(article_id = %article_id), err)]
    async fn get_balance(&self, article_id: ArticleId) -> Result<Option<StockBalance>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT articulo_id, cantidad_actual, ultima_actualizacion, version
            FROM inventarios
            WHERE articulo_id = $1
            "#,
        )
        .bind(article_id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_balance", e))?;

        row.map(|r| decode::<BalanceRow>(&r).map(Into::into))
            .transpose()
    }

    #[instrument(skip(self), fields(balance_count), err)]
    async fn list_balances(&self) -> Result<Vec<StockBalance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT articulo_id, cantidad_actual, ultima_actualizacion, version
            FROM inventarios
            ORDER BY articulo_id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_balances", e))?;

        Span::current().record("balance_count", rows.len());
        rows.iter()
            .map(|r| decode::<BalanceRow>(r).map(Into::into))
            .collect()
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, articulo_id, tipo_movimiento, cantidad, motivo, usuario_nombre, fecha
            FROM movimientos_inventario
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_movement", e))?;

        row.map(|r| decode::<MovementRow>(&r).and_then(Movement::try_from))
            .transpose()
    }

    #[instrument(skip(self), fields(article_id = ?article_id, movement_count), err)]
    async fn list_movements(
        &self,
        article_id: Option<ArticleId>,
    ) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, articulo_id, tipo_movimiento, cantidad, motivo, usuario_nombre, fecha
            FROM movimientos_inventario
            WHERE ($1::bigint IS NULL OR articulo_id = $1)
            ORDER BY id DESC
            "#,
        )
        .bind(article_id.map(ArticleId::get))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        Span::current().record("movement_count", rows.len());
        rows.iter()
            .map(|r| decode::<MovementRow>(r).and_then(Movement::try_from))
            .collect()
    }

    #[instrument(
        skip(self, plan),
        fields(
            article_id = %plan.balance.article_id,
            expected_version = ?plan.expected_version,
            movement_id
        ),
        err
    )]
    async fn commit(&self, plan: LedgerPlan) -> Result<LedgerReceipt, StoreError> {
        let article_id = plan.balance.article_id;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_balance_version(&mut tx, article_id).await?;
        if !plan.expected_version.matches(current) {
            return abort(
                tx,
                StoreError::Concurrency(format!(
                    "article {article_id}: expected {:?}, found version {current}",
                    plan.expected_version
                )),
            )
            .await;
        }

        let movement_id = match &plan.change {
            MovementChange::Insert(new) => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO movimientos_inventario
                        (articulo_id, tipo_movimiento, cantidad, motivo, usuario_nombre, fecha)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id
                    "#,
                )
                .bind(new.article_id.get())
                .bind(new.kind.as_str())
                .bind(new.quantity)
                .bind(&new.reason)
                .bind(&new.user_name)
                .bind(new.recorded_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_movement", e))?;
                let id: i64 = row
                    .try_get("id")
                    .map_err(|e| map_sqlx_error("insert_movement", e))?;
                MovementId::from_raw(id)
            }
            MovementChange::Update(m) => {
                let result = sqlx::query(
                    r#"
                    UPDATE movimientos_inventario
                    SET tipo_movimiento = $3, cantidad = $4, motivo = $5, fecha = $6
                    WHERE id = $1 AND articulo_id = $2
                    "#,
                )
                .bind(m.id.get())
                .bind(m.article_id.get())
                .bind(m.kind.as_str())
                .bind(m.quantity)
                .bind(&m.reason)
                .bind(m.recorded_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_movement", e))?;
                if result.rows_affected() == 0 {
                    return abort(tx, StoreError::NotFound(format!("movement {}", m.id))).await;
                }
                m.id
            }
            MovementChange::Delete(id) => {
                let result = sqlx::query(
                    "DELETE FROM movimientos_inventario WHERE id = $1 AND articulo_id = $2",
                )
                .bind(id.get())
                .bind(article_id.get())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_movement", e))?;
                if result.rows_affected() == 0 {
                    return abort(tx, StoreError::NotFound(format!("movement {id}"))).await;
                }
                *id
            }
        };

        write_balance(&mut tx, &plan.balance, current).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("movement_id", movement_id.get());
        Ok(LedgerReceipt {
            movement_id,
            balance: plan.balance,
        })
    }
}

/// Lock the balance row and return its version (`0` when absent).
async fn lock_balance_version(
    tx: &mut Transaction<'_, Postgres>,
    article_id: ArticleId,
) -> Result<u64, StoreError> {
    let row = sqlx::query("SELECT version FROM inventarios WHERE articulo_id = $1 FOR UPDATE")
        .bind(article_id.get())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_balance", e))?;

    match row {
        Some(row) => {
            let version: i64 = row
                .try_get("version")
                .map_err(|e| map_sqlx_error("lock_balance", e))?;
            Ok(version as u64)
        }
        None => Ok(0),
    }
}

async fn write_balance(
    tx: &mut Transaction<'_, Postgres>,
    balance: &StockBalance,
    current: u64,
) -> Result<(), StoreError> {
    if current == 0 {
        sqlx::query(
            r#"
            INSERT INTO inventarios (articulo_id, cantidad_actual, ultima_actualizacion, version)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(balance.article_id.get())
        .bind(balance.quantity)
        .bind(balance.updated_at)
        .bind(balance.version as i64)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_balance", e))?;
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        UPDATE inventarios
        SET cantidad_actual = $2, ultima_actualizacion = $3, version = $4
        WHERE articulo_id = $1 AND version = $5
        "#,
    )
    .bind(balance.article_id.get())
    .bind(balance.quantity)
    .bind(balance.updated_at)
    .bind(balance.version as i64)
    .bind(current as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_balance", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "balance for article {} moved past version {current}",
            balance.article_id
        )));
    }
    Ok(())
}

async fn abort<T>(tx: Transaction<'_, Postgres>, err: StoreError) -> Result<T, StoreError> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))?;
    Err(err)
}

/// Postgres-backed count sessions (`tomafisica`, `tomafisicadetalle`).
#[derive(Debug, Clone)]
pub struct PostgresCountStore {
    pool: Arc<PgPool>,
}

impl PostgresCountStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl CountStore for PostgresCountStore {
    #[instrument(
        skip(self, session, lines),
        fields(line_count = lines.len(), session_id, folio),
        err
    )]
    async fn create_session(
        &self,
        session: NewCountSession,
        lines: Vec<SnapshotLine>,
    ) -> Result<SessionWorksheet, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO tomafisica
                (fecha_inicio, estado, categoria_id, usuario_auth0_sub, usuario_correo)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, folio, fecha_inicio, fecha_fin, estado, categoria_id,
                      usuario_auth0_sub, usuario_correo
            "#,
        )
        .bind(session.started_at)
        .bind(CountState::Abierta.as_str())
        .bind(session.category_id.map(CategoryId::get))
        .bind(&session.operator.subject)
        .bind(&session.operator.email)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_session", e))?;
        let session = decode::<SessionRow>(&row).and_then(CountSession::try_from)?;

        let mut details = Vec::with_capacity(lines.len());
        for line in lines {
            let row = sqlx::query(
                r#"
                INSERT INTO tomafisicadetalle (toma_id, articulo_id, cantidad_teorica, cantidad_real)
                VALUES ($1, $2, $3, 0)
                RETURNING id, toma_id, articulo_id, cantidad_teorica, cantidad_real
                "#,
            )
            .bind(session.id.get())
            .bind(line.article_id.get())
            .bind(line.expected)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_detail", e))?;
            details.push(decode::<DetailRow>(&row)?.into());
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let span = Span::current();
        span.record("session_id", session.id.get());
        span.record("folio", session.folio);
        Ok(SessionWorksheet { session, details })
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn get_session(&self, id: SessionId) -> Result<Option<CountSession>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, folio, fecha_inicio, fecha_fin, estado, categoria_id,
                   usuario_auth0_sub, usuario_correo
            FROM tomafisica
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?;

        row.map(|r| decode::<SessionRow>(&r).and_then(CountSession::try_from))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self) -> Result<Vec<CountSession>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, folio, fecha_inicio, fecha_fin, estado, categoria_id,
                   usuario_auth0_sub, usuario_correo
            FROM tomafisica
            ORDER BY fecha_inicio DESC, id DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_sessions", e))?;

        rows.iter()
            .map(|r| decode::<SessionRow>(r).and_then(CountSession::try_from))
            .collect()
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn list_details(&self, id: SessionId) -> Result<Vec<CountDetail>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, toma_id, articulo_id, cantidad_teorica, cantidad_real
            FROM tomafisicadetalle
            WHERE toma_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_details", e))?;

        rows.iter()
            .map(|r| decode::<DetailRow>(r).map(Into::into))
            .collect()
    }

    #[instrument(
        skip(self, entries),
        fields(session_id = %id, entry_count = entries.len(), skipped),
        err
    )]
    async fn record_counts(
        &self,
        id: SessionId,
        entries: &[CountEntry],
    ) -> Result<CountSummary, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let exists = sqlx::query("SELECT id FROM tomafisica WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_session", e))?;
        if exists.is_none() {
            return abort(tx, StoreError::NotFound(format!("count session {id}"))).await;
        }

        let mut summary = CountSummary::default();
        for entry in entries {
            let result = sqlx::query(
                "UPDATE tomafisicadetalle SET cantidad_real = $1 WHERE id = $2 AND toma_id = $3",
            )
            .bind(entry.counted)
            .bind(entry.detail_id.get())
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_detail", e))?;

            if result.rows_affected() == 0 {
                summary.skipped.push(entry.detail_id);
            } else {
                summary.updated.push(entry.detail_id);
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Span::current().record("skipped", summary.skipped.len());
        Ok(summary)
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        // Details go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM tomafisica WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn decode<'r, T>(row: &'r PgRow) -> Result<T, StoreError>
where
    T: FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

struct BalanceRow {
    articulo_id: i64,
    cantidad_actual: Decimal,
    ultima_actualizacion: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for BalanceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(BalanceRow {
            articulo_id: row.try_get("articulo_id")?,
            cantidad_actual: row.try_get("cantidad_actual")?,
            ultima_actualizacion: row.try_get("ultima_actualizacion")?,
            version: row.try_get("version")?,
        })
    }
}

impl From<BalanceRow> for StockBalance {
    fn from(row: BalanceRow) -> Self {
        StockBalance {
            article_id: ArticleId::from_raw(row.articulo_id),
            quantity: row.cantidad_actual,
            updated_at: row.ultima_actualizacion,
            version: row.version as u64,
        }
    }
}

struct MovementRow {
    id: i64,
    articulo_id: i64,
    tipo_movimiento: String,
    cantidad: Decimal,
    motivo: Option<String>,
    usuario_nombre: String,
    fecha: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            articulo_id: row.try_get("articulo_id")?,
            tipo_movimiento: row.try_get("tipo_movimiento")?,
            cantidad: row.try_get("cantidad")?,
            motivo: row.try_get("motivo")?,
            usuario_nombre: row.try_get("usuario_nombre")?,
            fecha: row.try_get("fecha")?,
        })
    }
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind: MovementKind = row.tipo_movimiento.parse().map_err(|e| {
            StoreError::Backend(format!("movement {} has bad tipo_movimiento: {e}", row.id))
        })?;
        Ok(Movement {
            id: MovementId::from_raw(row.id),
            article_id: ArticleId::from_raw(row.articulo_id),
            kind,
            quantity: row.cantidad,
            reason: row.motivo.unwrap_or_default(),
            user_name: row.usuario_nombre,
            recorded_at: row.fecha,
        })
    }
}

struct SessionRow {
    id: i64,
    folio: i64,
    fecha_inicio: DateTime<Utc>,
    fecha_fin: Option<DateTime<Utc>>,
    estado: String,
    categoria_id: Option<i64>,
    usuario_auth0_sub: String,
    usuario_correo: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SessionRow {
            id: row.try_get("id")?,
            folio: row.try_get("folio")?,
            fecha_inicio: row.try_get("fecha_inicio")?,
            fecha_fin: row.try_get("fecha_fin")?,
            estado: row.try_get("estado")?,
            categoria_id: row.try_get("categoria_id")?,
            usuario_auth0_sub: row.try_get("usuario_auth0_sub")?,
            usuario_correo: row.try_get("usuario_correo")?,
        })
    }
}

impl TryFrom<SessionRow> for CountSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let state = CountState::parse(&row.estado).map_err(|e| {
            StoreError::Backend(format!("count session {} has bad estado: {e}", row.id))
        })?;
        Ok(CountSession {
            id: SessionId::from_raw(row.id),
            folio: row.folio,
            started_at: row.fecha_inicio,
            finished_at: row.fecha_fin,
            state,
            category_id: row.categoria_id.map(CategoryId::from_raw),
            operator: Operator {
                subject: row.usuario_auth0_sub,
                email: row.usuario_correo,
            },
        })
    }
}

struct DetailRow {
    id: i64,
    toma_id: i64,
    articulo_id: i64,
    cantidad_teorica: Decimal,
    cantidad_real: Decimal,
}

impl<'r> FromRow<'r, PgRow> for DetailRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(DetailRow {
            id: row.try_get("id")?,
            toma_id: row.try_get("toma_id")?,
            articulo_id: row.try_get("articulo_id")?,
            cantidad_teorica: row.try_get("cantidad_teorica")?,
            cantidad_real: row.try_get("cantidad_real")?,
        })
    }
}

impl From<DetailRow> for CountDetail {
    fn from(row: DetailRow) -> Self {
        CountDetail {
            id: DetailId::from_raw(row.id),
            session_id: SessionId::from_raw(row.toma_id),
            article_id: ArticleId::from_raw(row.articulo_id),
            expected: row.cantidad_teorica,
            counted: row.cantidad_real,
        }
    }
}
