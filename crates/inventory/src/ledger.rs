//! Ledger planning: pure decisions for record/edit/delete.
//!
//! Each function reads the state it needs (movement + current balance) and
//! returns a [`LedgerPlan`] describing one atomic write: the movement change,
//! the replacement balance, and the balance version the write was computed
//! against. Storage commits the plan or rejects it on a version mismatch.

use rust_decimal::Decimal;

use medstock_core::{DomainError, DomainResult, ExpectedVersion, MovementId};

use crate::balance::StockBalance;
use crate::movement::{EditMovement, Movement, MovementKind, NewMovement, RecordMovement, SeedStock};

/// Movement-log side of a ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovementChange {
    Insert(NewMovement),
    Update(Movement),
    Delete(MovementId),
}

/// One atomic ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerPlan {
    /// Balance version observed when the plan was computed.
    pub expected_version: ExpectedVersion,
    pub balance: StockBalance,
    pub change: MovementChange,
}

pub fn plan_record(
    cmd: &RecordMovement,
    current: Option<&StockBalance>,
) -> DomainResult<LedgerPlan> {
    let next = add(
        StockBalance::quantity_of(current),
        cmd.kind.contribution(cmd.quantity),
    )?;

    Ok(LedgerPlan {
        expected_version: StockBalance::expected_version_of(current),
        balance: StockBalance::set(current, cmd.article_id, next, cmd.occurred_at),
        change: MovementChange::Insert(cmd.to_new_movement()),
    })
}

pub fn plan_seed(cmd: &SeedStock, current: Option<&StockBalance>) -> DomainResult<LedgerPlan> {
    if current.is_some() {
        return Err(DomainError::conflict(format!(
            "stock for article {} is already initialized",
            cmd.article_id
        )));
    }

    Ok(LedgerPlan {
        expected_version: ExpectedVersion::Exact(0),
        balance: StockBalance::set(None, cmd.article_id, cmd.quantity, cmd.occurred_at),
        change: MovementChange::Insert(NewMovement {
            article_id: cmd.article_id,
            kind: MovementKind::Alta,
            quantity: cmd.quantity,
            reason: SeedStock::REASON.to_string(),
            user_name: cmd.user_name.clone(),
            recorded_at: cmd.occurred_at,
        }),
    })
}

pub fn plan_edit(
    cmd: &EditMovement,
    original: &Movement,
    current: &StockBalance,
) -> DomainResult<LedgerPlan> {
    ensure_same_article(original, current)?;

    let new_kind = cmd.kind.unwrap_or(original.kind);
    if original.kind == MovementKind::Alta && new_kind != MovementKind::Alta {
        return Err(DomainError::validation(format!(
            "movement {} is an 'alta' and cannot change to '{new_kind}'",
            original.id
        )));
    }

    let base = sub(current.quantity, original.contribution())?;

    let (stored, next) = match cmd.kind {
        // Explicit adjustment: quantity is the absolute target balance.
        Some(MovementKind::Adjustment) => {
            let diferencia = sub(cmd.quantity, base)?;
            (diferencia, add(base, diferencia)?)
        }
        _ => {
            match new_kind {
                MovementKind::Adjustment => {
                    if cmd.quantity.is_zero() {
                        return Err(DomainError::validation("adjustment delta cannot be zero"));
                    }
                }
                // Same floor as seeding: an alta may record zero stock.
                MovementKind::Alta => {
                    if cmd.quantity < Decimal::ZERO {
                        return Err(DomainError::validation("cantidad cannot be negative"));
                    }
                }
                _ => {
                    if cmd.quantity <= Decimal::ZERO {
                        return Err(DomainError::validation("cantidad must be positive"));
                    }
                }
            }
            (cmd.quantity, add(base, new_kind.contribution(cmd.quantity))?)
        }
    };

    let updated = Movement {
        kind: new_kind,
        quantity: stored,
        reason: cmd.reason.clone().unwrap_or_else(|| original.reason.clone()),
        recorded_at: cmd.occurred_at,
        ..original.clone()
    };

    Ok(LedgerPlan {
        expected_version: ExpectedVersion::Exact(current.version),
        balance: StockBalance::set(Some(current), current.article_id, next, cmd.occurred_at),
        change: MovementChange::Update(updated),
    })
}

pub fn plan_delete(
    original: &Movement,
    current: &StockBalance,
    at: chrono::DateTime<chrono::Utc>,
) -> DomainResult<LedgerPlan> {
    ensure_same_article(original, current)?;

    let next = sub(current.quantity, original.contribution())?;

    Ok(LedgerPlan {
        expected_version: ExpectedVersion::Exact(current.version),
        balance: StockBalance::set(Some(current), current.article_id, next, at),
        change: MovementChange::Delete(original.id),
    })
}

fn add(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_add(b).ok_or_else(out_of_range)
}

fn sub(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_sub(b).ok_or_else(out_of_range)
}

fn out_of_range() -> DomainError {
    DomainError::validation("quantity out of range")
}

fn ensure_same_article(movement: &Movement, balance: &StockBalance) -> DomainResult<()> {
    if movement.article_id != balance.article_id {
        return Err(DomainError::invariant(format!(
            "movement {} belongs to article {}, balance is for article {}",
            movement.id, movement.article_id, balance.article_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medstock_core::ArticleId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::movement::Quantity;

    fn article() -> ArticleId {
        ArticleId::from_raw(1)
    }

    fn balance(quantity: Quantity, version: u64) -> StockBalance {
        StockBalance {
            article_id: article(),
            quantity,
            updated_at: Utc::now(),
            version,
        }
    }

    fn record(kind: &str, quantity: Quantity) -> RecordMovement {
        RecordMovement::new(1, kind, quantity, "test", "tester", Utc::now()).unwrap()
    }

    /// Commit a plan into a trivial model: movement list + balance.
    fn commit(plan: LedgerPlan, log: &mut Vec<Movement>, next_id: &mut i64) -> StockBalance {
        match plan.change {
            MovementChange::Insert(new) => {
                *next_id += 1;
                log.push(new.into_movement(MovementId::from_raw(*next_id)));
            }
            MovementChange::Update(m) => {
                let slot = log.iter_mut().find(|x| x.id == m.id).unwrap();
                *slot = m;
            }
            MovementChange::Delete(id) => log.retain(|x| x.id != id),
        }
        plan.balance
    }

    fn stored(plan: &LedgerPlan) -> Movement {
        match &plan.change {
            MovementChange::Insert(new) => new.clone().into_movement(MovementId::from_raw(1)),
            MovementChange::Update(m) => m.clone(),
            MovementChange::Delete(_) => panic!("expected a movement"),
        }
    }

    #[test]
    fn purchase_increases_balance() {
        let plan = plan_record(&record("compra", dec!(5)), Some(&balance(dec!(10), 2))).unwrap();
        assert_eq!(plan.balance.quantity, dec!(15));
        assert_eq!(plan.balance.version, 3);
        assert_eq!(plan.expected_version, ExpectedVersion::Exact(2));
    }

    #[test]
    fn sale_may_drive_balance_negative() {
        let plan = plan_record(&record("venta", dec!(100)), Some(&balance(dec!(10), 1))).unwrap();
        assert_eq!(plan.balance.quantity, dec!(-90));
    }

    #[test]
    fn missing_balance_starts_from_zero() {
        let plan = plan_record(&record("compra", dec!(4)), None).unwrap();
        assert_eq!(plan.balance.quantity, dec!(4));
        assert_eq!(plan.expected_version, ExpectedVersion::Exact(0));
    }

    #[test]
    fn edit_is_equivalent_to_recording_the_new_quantity() {
        let start = balance(dec!(10), 1);
        let first = plan_record(&record("compra", dec!(5)), Some(&start)).unwrap();
        let movement = stored(&first);

        let edit = EditMovement::new(1, dec!(8), None, None, Utc::now()).unwrap();
        let edited = plan_edit(&edit, &movement, &first.balance).unwrap();

        let direct = plan_record(&record("compra", dec!(8)), Some(&start)).unwrap();
        assert_eq!(edited.balance.quantity, direct.balance.quantity);
    }

    #[test]
    fn edit_can_flip_direction() {
        let start = balance(dec!(10), 1);
        let first = plan_record(&record("compra", dec!(5)), Some(&start)).unwrap();
        let movement = stored(&first);

        let edit = EditMovement::new(1, dec!(2), Some("robo"), Some("missing".into()), Utc::now())
            .unwrap();
        let plan = plan_edit(&edit, &movement, &first.balance).unwrap();

        assert_eq!(plan.balance.quantity, dec!(8));
        let MovementChange::Update(updated) = plan.change else {
            panic!("expected update");
        };
        assert_eq!(updated.kind, MovementKind::Robo);
        assert_eq!(updated.reason, "missing");
    }

    #[test]
    fn delete_restores_previous_balance() {
        let start = balance(dec!(10), 4);
        let first = plan_record(&record("venta", dec!(5)), Some(&start)).unwrap();
        let movement = stored(&first);

        let plan = plan_delete(&movement, &first.balance, Utc::now()).unwrap();
        assert_eq!(plan.balance.quantity, dec!(10));
        assert_eq!(plan.change, MovementChange::Delete(movement.id));
    }

    #[test]
    fn adjustment_delta_and_absolute_target() {
        let start = balance(dec!(10), 1);
        let first = plan_record(&record("ajuste_inventario", dec!(-3)), Some(&start)).unwrap();
        assert_eq!(first.balance.quantity, dec!(7));

        let movement = stored(&first);
        let edit = EditMovement::new(1, dec!(20), Some("ajuste_inventario"), None, Utc::now())
            .unwrap();
        let plan = plan_edit(&edit, &movement, &first.balance).unwrap();

        // base = 7 - (-3) = 10, diferencia = 20 - 10
        assert_eq!(plan.balance.quantity, dec!(20));
        let MovementChange::Update(updated) = plan.change else {
            panic!("expected update");
        };
        assert_eq!(updated.quantity, dec!(10));
        assert_eq!(updated.kind, MovementKind::Adjustment);
    }

    #[test]
    fn alta_cannot_change_kind() {
        let seed = SeedStock::new(1, dec!(10), "ana", Utc::now()).unwrap();
        let first = plan_seed(&seed, None).unwrap();
        let movement = stored(&first);

        let edit = EditMovement::new(1, dec!(3), Some("venta"), None, Utc::now()).unwrap();
        let err = plan_edit(&edit, &movement, &first.balance).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // quantity edits on an alta are fine
        let edit = EditMovement::new(1, dec!(12), Some("alta"), None, Utc::now()).unwrap();
        let plan = plan_edit(&edit, &movement, &first.balance).unwrap();
        assert_eq!(plan.balance.quantity, dec!(12));
    }

    #[test]
    fn seed_rejects_existing_balance() {
        let seed = SeedStock::new(1, dec!(0), "ana", Utc::now()).unwrap();
        let err = plan_seed(&seed, Some(&balance(dec!(0), 1))).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn kindless_edit_of_adjustment_replaces_delta() {
        let start = balance(dec!(10), 1);
        let first = plan_record(&record("ajuste_inventario", dec!(-3)), Some(&start)).unwrap();
        let movement = stored(&first);

        let edit = EditMovement::new(1, dec!(-5), None, None, Utc::now()).unwrap();
        let plan = plan_edit(&edit, &movement, &first.balance).unwrap();
        assert_eq!(plan.balance.quantity, dec!(5));

        let zero = EditMovement::new(1, dec!(0), None, None, Utc::now()).unwrap();
        assert!(plan_edit(&zero, &movement, &first.balance).is_err());
    }

    #[test]
    fn record_past_decimal_max_is_rejected() {
        let err = plan_record(&record("compra", Decimal::MAX), Some(&balance(Decimal::MAX, 1)))
            .unwrap_err();
        assert_eq!(err, DomainError::validation("quantity out of range"));

        let err = plan_record(&record("venta", Decimal::MAX), Some(&balance(Decimal::MIN, 1)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn edit_and_delete_out_of_range_are_rejected() {
        // Undoing a sale of MAX from a MAX balance overflows.
        let sale = Movement {
            kind: MovementKind::Venta,
            quantity: Decimal::MAX,
            ..stored(&plan_record(&record("venta", dec!(1)), None).unwrap())
        };
        let current = balance(Decimal::MAX, 3);

        let err = plan_delete(&sale, &current, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let edit = EditMovement::new(1, dec!(1), None, None, Utc::now()).unwrap();
        let err = plan_edit(&edit, &sale, &current).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let purchase = stored(&plan_record(&record("compra", dec!(1)), None).unwrap());
        let edit = EditMovement::new(1, Decimal::MAX, None, None, Utc::now()).unwrap();
        let err = plan_edit(&edit, &purchase, &balance(Decimal::MAX, 2)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let target = EditMovement::new(1, Decimal::MAX, Some("ajuste_inventario"), None, Utc::now())
            .unwrap();
        let err = plan_edit(&target, &purchase, &balance(Decimal::MIN + dec!(1), 2)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn alta_seeded_at_zero_can_return_to_zero() {
        let seed = SeedStock::new(1, dec!(0), "ana", Utc::now()).unwrap();
        let first = plan_seed(&seed, None).unwrap();
        let movement = stored(&first);

        let up = EditMovement::new(1, dec!(5), None, None, Utc::now()).unwrap();
        let raised = plan_edit(&up, &movement, &first.balance).unwrap();
        assert_eq!(raised.balance.quantity, dec!(5));

        let back = EditMovement::new(1, dec!(0), None, None, Utc::now()).unwrap();
        let plan = plan_edit(&back, &stored(&raised), &raised.balance).unwrap();
        assert_eq!(plan.balance.quantity, dec!(0));
        let MovementChange::Update(updated) = plan.change else {
            panic!("expected update");
        };
        assert_eq!(updated.kind, MovementKind::Alta);
        assert_eq!(updated.quantity, dec!(0));

        let negative = EditMovement::new(1, dec!(-1), None, None, Utc::now()).unwrap();
        assert!(plan_edit(&negative, &movement, &first.balance).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Record(usize, i64),
        Edit(usize, i64, Option<usize>),
        Delete(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..8, 1i64..500).prop_map(|(k, q)| Op::Record(k, q)),
            (0usize..16, 1i64..500, proptest::option::of(1usize..8))
                .prop_map(|(i, q, k)| Op::Edit(i, q, k)),
            (0usize..16).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of record/edit/delete plans, the balance
        /// equals the sum of contributions of the movements still in the log.
        #[test]
        fn balance_matches_sum_of_live_movements(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut log: Vec<Movement> = Vec::new();
            let mut next_id = 0i64;
            let mut current = commit(
                plan_seed(&SeedStock::new(1, dec!(10), "t", Utc::now()).unwrap(), None).unwrap(),
                &mut log,
                &mut next_id,
            );

            for op in ops {
                let plan = match op {
                    Op::Record(k, q) => {
                        let kind = MovementKind::ALL[k];
                        let qty = match (kind.is_adjustment(), q - 250) {
                            (true, 0) => dec!(1),
                            (true, delta) => Decimal::from(delta),
                            (false, _) => Decimal::from(q),
                        };
                        plan_record(&record(kind.as_str(), qty), Some(&current)).ok()
                    }
                    Op::Edit(i, q, k) if !log.is_empty() => {
                        let original = log[i % log.len()].clone();
                        let kind = k.map(|k| MovementKind::ALL[k].as_str());
                        EditMovement::new(original.id.get(), Decimal::from(q), kind, None, Utc::now())
                            .ok()
                            .and_then(|cmd| plan_edit(&cmd, &original, &current).ok())
                    }
                    Op::Delete(i) if !log.is_empty() => {
                        let original = log[i % log.len()].clone();
                        plan_delete(&original, &current, Utc::now()).ok()
                    }
                    _ => None,
                };

                if let Some(plan) = plan {
                    prop_assert_eq!(plan.expected_version, ExpectedVersion::Exact(current.version));
                    current = commit(plan, &mut log, &mut next_id);
                }

                let expected: Decimal = log.iter().map(Movement::contribution).sum();
                prop_assert_eq!(current.quantity, expected);
            }
        }
    }
}
