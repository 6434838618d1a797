use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use medstock_core::{ArticleId, DetailId, MovementId, SessionId};
use medstock_inventory::{
    CountDetail, CountEntry, CountSession, CountState, CountSummary, LedgerPlan, Movement,
    MovementChange, NewCountSession, SessionWorksheet, SnapshotLine, StockBalance,
};

use super::r#trait::{CountStore, LedgerReceipt, LedgerStore, StockStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct LedgerState {
    movements: BTreeMap<MovementId, Movement>,
    balances: HashMap<ArticleId, StockBalance>,
    last_movement_id: i64,
}

/// In-memory movement log + balances.
///
/// One lock guards both record sets, so a commit's version check and its
/// writes form a single critical section. Intended for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl StockStore for InMemoryLedgerStore {
    async fn get_balance(&self, article_id: ArticleId) -> Result<Option<StockBalance>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.balances.get(&article_id).cloned())
    }

    async fn list_balances(&self) -> Result<Vec<StockBalance>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        let mut balances: Vec<_> = state.balances.values().cloned().collect();
        balances.sort_by_key(|b| b.article_id);
        Ok(balances)
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.movements.get(&id).cloned())
    }

    async fn list_movements(
        &self,
        article_id: Option<ArticleId>,
    ) -> Result<Vec<Movement>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .movements
            .values()
            .rev()
            .filter(|m| article_id.is_none_or(|a| m.article_id == a))
            .cloned()
            .collect())
    }

    async fn commit(&self, plan: LedgerPlan) -> Result<LedgerReceipt, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let article_id = plan.balance.article_id;
        let current = state.balances.get(&article_id).map(|b| b.version).unwrap_or(0);
        if !plan.expected_version.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "article {article_id}: expected {:?}, found version {current}",
                plan.expected_version
            )));
        }

        // Validate the movement side before touching anything.
        match &plan.change {
            MovementChange::Update(m) if !state.movements.contains_key(&m.id) => {
                return Err(StoreError::NotFound(format!("movement {}", m.id)));
            }
            MovementChange::Delete(id) if !state.movements.contains_key(id) => {
                return Err(StoreError::NotFound(format!("movement {id}")));
            }
            _ => {}
        }

        let movement_id = match plan.change {
            MovementChange::Insert(new) => {
                state.last_movement_id += 1;
                let id = MovementId::from_raw(state.last_movement_id);
                state.movements.insert(id, new.into_movement(id));
                id
            }
            MovementChange::Update(m) => {
                let id = m.id;
                state.movements.insert(id, m);
                id
            }
            MovementChange::Delete(id) => {
                state.movements.remove(&id);
                id
            }
        };

        state.balances.insert(article_id, plan.balance.clone());

        Ok(LedgerReceipt {
            movement_id,
            balance: plan.balance,
        })
    }
}

#[derive(Debug, Default)]
struct CountBook {
    sessions: BTreeMap<SessionId, CountSession>,
    details: BTreeMap<DetailId, CountDetail>,
    last_session_id: i64,
    last_folio: i64,
    last_detail_id: i64,
}

/// In-memory count sessions for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCountStore {
    state: RwLock<CountBook>,
}

impl InMemoryCountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CountStore for InMemoryCountStore {
    async fn create_session(
        &self,
        session: NewCountSession,
        lines: Vec<SnapshotLine>,
    ) -> Result<SessionWorksheet, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;

        state.last_session_id += 1;
        state.last_folio += 1;
        let session = CountSession {
            id: SessionId::from_raw(state.last_session_id),
            folio: state.last_folio,
            started_at: session.started_at,
            finished_at: None,
            state: CountState::Abierta,
            category_id: session.category_id,
            operator: session.operator,
        };

        let mut details = Vec::with_capacity(lines.len());
        for line in lines {
            state.last_detail_id += 1;
            let detail = CountDetail {
                id: DetailId::from_raw(state.last_detail_id),
                session_id: session.id,
                article_id: line.article_id,
                expected: line.expected,
                counted: rust_decimal::Decimal::ZERO,
            };
            state.details.insert(detail.id, detail.clone());
            details.push(detail);
        }
        state.sessions.insert(session.id, session.clone());

        Ok(SessionWorksheet { session, details })
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<CountSession>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<CountSession>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.sessions.values().rev().cloned().collect())
    }

    async fn list_details(&self, id: SessionId) -> Result<Vec<CountDetail>, StoreError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .details
            .values()
            .filter(|d| d.session_id == id)
            .cloned()
            .collect())
    }

    async fn record_counts(
        &self,
        id: SessionId,
        entries: &[CountEntry],
    ) -> Result<CountSummary, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if !state.sessions.contains_key(&id) {
            return Err(StoreError::NotFound(format!("count session {id}")));
        }

        let mut summary = CountSummary::default();
        for entry in entries {
            match state.details.get_mut(&entry.detail_id) {
                Some(detail) if detail.session_id == id => {
                    detail.counted = entry.counted;
                    summary.updated.push(entry.detail_id);
                }
                _ => summary.skipped.push(entry.detail_id),
            }
        }
        Ok(summary)
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        if state.sessions.remove(&id).is_none() {
            return Ok(false);
        }
        state.details.retain(|_, d| d.session_id != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medstock_core::ExpectedVersion;
    use medstock_inventory::{EditMovement, Operator, RecordMovement, plan_edit, plan_record};
    use rust_decimal_macros::dec;

    fn record(kind: &str, qty: rust_decimal::Decimal) -> RecordMovement {
        RecordMovement::new(1, kind, qty, "", "tester", Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn commit_rejects_stale_version_without_writing() {
        let store = InMemoryLedgerStore::new();
        let first = plan_record(&record("compra", dec!(5)), None).unwrap();
        store.commit(first).await.unwrap();

        // Planned against the empty state: stale.
        let stale = plan_record(&record("compra", dec!(7)), None).unwrap();
        let err = store.commit(stale).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        let balance = store.get_balance(ArticleId::from_raw(1)).await.unwrap().unwrap();
        assert_eq!(balance.quantity, dec!(5));
        assert_eq!(store.list_movements(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn edited_movement_keeps_its_place_in_listing() {
        let store = InMemoryLedgerStore::new();
        let older = store
            .commit(plan_record(&record("compra", dec!(5)), None).unwrap())
            .await
            .unwrap();
        let newer = store
            .commit(plan_record(&record("venta", dec!(1)), Some(&older.balance)).unwrap())
            .await
            .unwrap();

        let original = store.get_movement(older.movement_id).await.unwrap().unwrap();
        let edit = EditMovement::new(older.movement_id.get(), dec!(9), None, None, Utc::now())
            .unwrap();
        store
            .commit(plan_edit(&edit, &original, &newer.balance).unwrap())
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_movements(Some(ArticleId::from_raw(1)))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![newer.movement_id, older.movement_id]);
    }

    #[tokio::test]
    async fn delete_of_missing_movement_is_not_found() {
        let store = InMemoryLedgerStore::new();
        let receipt = store
            .commit(plan_record(&record("compra", dec!(5)), None).unwrap())
            .await
            .unwrap();

        let mut plan = plan_record(&record("compra", dec!(1)), Some(&receipt.balance)).unwrap();
        plan.change = MovementChange::Delete(MovementId::from_raw(99));
        plan.expected_version = ExpectedVersion::Exact(receipt.balance.version);

        let err = store.commit(plan).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let balance = store.get_balance(ArticleId::from_raw(1)).await.unwrap().unwrap();
        assert_eq!(balance.version, 1);
    }

    #[tokio::test]
    async fn sessions_get_sequential_folios_and_cascade_on_delete() {
        let store = InMemoryCountStore::new();
        let new = NewCountSession::new(
            None,
            Operator {
                subject: "auth0|1".into(),
                email: None,
            },
            Utc::now(),
        )
        .unwrap();
        let lines = vec![SnapshotLine {
            article_id: ArticleId::from_raw(1),
            expected: dec!(3),
        }];

        let a = store.create_session(new.clone(), lines.clone()).await.unwrap();
        let b = store.create_session(new, lines).await.unwrap();
        assert_eq!(a.session.folio + 1, b.session.folio);

        assert!(store.delete_session(a.session.id).await.unwrap());
        assert!(store.list_details(a.session.id).await.unwrap().is_empty());
        assert_eq!(store.list_details(b.session.id).await.unwrap().len(), 1);
        assert!(!store.delete_session(a.session.id).await.unwrap());
    }
}
