use std::sync::Arc;

use rust_decimal_macros::dec;
use serde_json::json;

use medstock_app::{AppServices, build_services};
use medstock_infra::{ErrorKind, InMemoryCatalog, InventoryConfig};
use medstock_inventory::{
    CountsPayload, EditMovementPayload, MovementPayload, OpenSessionPayload, Operator,
};

fn services() -> AppServices {
    medstock_observability::init_for_tests();

    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.register(1, Some(1)).unwrap();
    catalog.register(2, Some(1)).unwrap();
    catalog.register(3, Some(2)).unwrap();
    AppServices::in_memory(catalog, 5)
}

fn movement(body: serde_json::Value) -> MovementPayload {
    serde_json::from_value(body).unwrap()
}

fn operator() -> Operator {
    Operator {
        subject: "auth0|warehouse".into(),
        email: Some("almacen@example.com".into()),
    }
}

async fn balance_of(app: &AppServices, article: i64) -> rust_decimal::Decimal {
    app.inventory_report()
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.article_id.get() == article)
        .map(|b| b.quantity)
        .unwrap_or_default()
}

#[tokio::test]
async fn default_config_builds_in_memory_services() {
    let app = build_services(&InventoryConfig::default()).await.unwrap();
    assert!(app.inventory_report().await.unwrap().is_empty());
    assert!(app.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn sales_and_purchases_flow_through_the_ledger() {
    let app = services();

    app.seed_article_stock(1, dec!(10), "ana").await.unwrap();
    app.record_movement(
        movement(json!({"articulo_id": 1, "tipo_movimiento": "compra", "cantidad": 5, "motivo": "proveedor"})),
        "ana",
    )
    .await
    .unwrap();
    let sale = app
        .record_movement(
            movement(json!({"articulo_id": 1, "tipo_movimiento": "venta", "cantidad": 100})),
            "luis",
        )
        .await
        .unwrap();

    assert_eq!(sale.balance.quantity, dec!(-85));
    assert_eq!(balance_of(&app, 1).await, dec!(-85));

    app.delete_movement(sale.movement_id.get()).await.unwrap();
    assert_eq!(balance_of(&app, 1).await, dec!(15));

    let report = app.movement_report(Some(1)).await.unwrap();
    assert_eq!(report.len(), 2);
    assert!(report.iter().all(|m| m.article_id.get() == 1));
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_write() {
    let app = services();

    let err = app
        .record_movement(
            movement(json!({"articulo_id": 1, "tipo_movimiento": "teletransporte", "cantidad": 5})),
            "ana",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = app
        .record_movement(
            movement(json!({"articulo_id": 0, "tipo_movimiento": "compra", "cantidad": 5})),
            "ana",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = app
        .record_movement(
            movement(json!({"articulo_id": 1, "tipo_movimiento": "compra", "cantidad": 0})),
            "ana",
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert!(app.movement_report(None).await.unwrap().is_empty());
    assert!(app.inventory_report().await.unwrap().is_empty());
}

#[tokio::test]
async fn editing_into_an_adjustment_sets_the_balance() {
    let app = services();
    app.record_movement(
        movement(json!({"articulo_id": 2, "tipo_movimiento": "compra", "cantidad": 10})),
        "ana",
    )
    .await
    .unwrap();
    let theft = app
        .record_movement(
            movement(json!({"articulo_id": 2, "tipo_movimiento": "robo", "cantidad": 3})),
            "ana",
        )
        .await
        .unwrap();
    assert_eq!(theft.balance.quantity, dec!(7));

    let edit: EditMovementPayload = serde_json::from_value(json!({
        "id": theft.movement_id.get(),
        "cantidad": 20,
        "tipo_movimiento": "ajuste_inventario",
        "motivo": "conteo"
    }))
    .unwrap();
    let receipt = app.edit_movement(edit).await.unwrap();
    assert_eq!(receipt.balance.quantity, dec!(20));

    let stored = app
        .movement_report(Some(2))
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.id == theft.movement_id)
        .unwrap();
    assert_eq!(stored.quantity, dec!(10));
    assert_eq!(stored.reason, "conteo");
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let app = services();
    assert_eq!(app.delete_movement(404).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(app.cancel_session(404).await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(app.session_detail(404).await.unwrap_err().kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn count_session_lifecycle() {
    let app = services();
    app.seed_article_stock(1, dec!(12), "ana").await.unwrap();
    app.seed_article_stock(3, dec!(4), "ana").await.unwrap();

    let sheet = app
        .open_session(
            serde_json::from_value::<OpenSessionPayload>(json!({"categoria_id": 1})).unwrap(),
            operator(),
        )
        .await
        .unwrap();
    assert_eq!(sheet.details.len(), 2);
    assert_eq!(sheet.details[0].expected, dec!(12));
    assert_eq!(sheet.details[1].expected, dec!(0));

    // Stock moves after the snapshot; the worksheet baseline does not.
    app.record_movement(
        movement(json!({"articulo_id": 1, "tipo_movimiento": "venta", "cantidad": 2})),
        "luis",
    )
    .await
    .unwrap();

    let counts: CountsPayload = serde_json::from_value(json!({
        "toma_id": sheet.session.id.get(),
        "detalles": [
            {"detalle_id": sheet.details[0].id.get(), "cantidad_real": 9},
            {"detalle_id": 9999, "cantidad_real": 1}
        ]
    }))
    .unwrap();
    let summary = app.record_counts(counts).await.unwrap();
    assert_eq!(summary.updated.len(), 1);
    assert_eq!(summary.skipped.len(), 1);

    let detail = app.session_detail(sheet.session.id.get()).await.unwrap();
    assert_eq!(detail.details[0].expected, dec!(12));
    assert_eq!(detail.details[0].counted, dec!(9));
    assert_eq!(detail.total_variance(), dec!(-3));

    let json = serde_json::to_value(&detail).unwrap();
    assert_eq!(json["estado"], "abierta");
    assert_eq!(json["detalles"].as_array().unwrap().len(), 2);

    let negative: CountsPayload = serde_json::from_value(json!({
        "toma_id": sheet.session.id.get(),
        "detalles": [{"detalle_id": sheet.details[0].id.get(), "cantidad_real": -1}]
    }))
    .unwrap();
    assert_eq!(
        app.record_counts(negative).await.unwrap_err().kind(),
        ErrorKind::Validation
    );

    app.cancel_session(sheet.session.id.get()).await.unwrap();
    assert!(app.list_sessions().await.unwrap().is_empty());
    assert_eq!(balance_of(&app, 1).await, dec!(10));
    assert_eq!(app.movement_report(None).await.unwrap().len(), 3);
}
