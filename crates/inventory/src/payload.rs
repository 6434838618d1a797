//! Untyped request payloads and their one-time validation into commands.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use medstock_core::DomainResult;

use crate::count::{NewCountSession, Operator, RecordCounts};
use crate::movement::{EditMovement, Quantity, RecordMovement};

#[derive(Debug, Clone, Deserialize)]
pub struct MovementPayload {
    pub articulo_id: i64,
    pub tipo_movimiento: String,
    pub cantidad: Quantity,
    #[serde(default)]
    pub motivo: String,
}

impl MovementPayload {
    pub fn into_command(self, usuario: &str, at: DateTime<Utc>) -> DomainResult<RecordMovement> {
        RecordMovement::new(
            self.articulo_id,
            &self.tipo_movimiento,
            self.cantidad,
            self.motivo,
            usuario,
            at,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditMovementPayload {
    pub id: i64,
    pub cantidad: Quantity,
    #[serde(default)]
    pub tipo_movimiento: Option<String>,
    #[serde(default)]
    pub motivo: Option<String>,
}

impl EditMovementPayload {
    pub fn into_command(self, at: DateTime<Utc>) -> DomainResult<EditMovement> {
        EditMovement::new(
            self.id,
            self.cantidad,
            self.tipo_movimiento.as_deref(),
            self.motivo,
            at,
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenSessionPayload {
    #[serde(default)]
    pub categoria_id: Option<i64>,
}

impl OpenSessionPayload {
    pub fn into_command(self, operator: Operator, at: DateTime<Utc>) -> DomainResult<NewCountSession> {
        NewCountSession::new(self.categoria_id, operator, at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountLinePayload {
    pub detalle_id: i64,
    pub cantidad_real: Quantity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountsPayload {
    pub toma_id: i64,
    pub detalles: Vec<CountLinePayload>,
}

impl CountsPayload {
    pub fn into_command(self) -> DomainResult<RecordCounts> {
        RecordCounts::new(
            self.toma_id,
            self.detalles
                .into_iter()
                .map(|d| (d.detalle_id, d.cantidad_real))
                .collect(),
        )
    }
}
