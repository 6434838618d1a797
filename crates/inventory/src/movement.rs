use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use medstock_core::{ArticleId, DomainError, DomainResult, MovementId};

/// Stock quantity. Fractional quantities are allowed; arithmetic is exact.
pub type Quantity = Decimal;

/// Closed set of stock movement types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Initial stock intake for a newly registered article.
    #[serde(rename = "alta")]
    Alta,
    #[serde(rename = "compra")]
    Compra,
    #[serde(rename = "venta")]
    Venta,
    #[serde(rename = "baja")]
    Baja,
    #[serde(rename = "robo")]
    Robo,
    #[serde(rename = "transferencia_entrada")]
    TransferIn,
    #[serde(rename = "transferencia_salida")]
    TransferOut,
    /// The stored quantity is already a signed delta.
    #[serde(rename = "ajuste_inventario")]
    Adjustment,
}

/// How a movement's stored quantity contributes to the article balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignRule {
    Increase,
    Decrease,
    RawDelta,
}

impl MovementKind {
    pub const ALL: [MovementKind; 8] = [
        MovementKind::Alta,
        MovementKind::Compra,
        MovementKind::Venta,
        MovementKind::Baja,
        MovementKind::Robo,
        MovementKind::TransferIn,
        MovementKind::TransferOut,
        MovementKind::Adjustment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Alta => "alta",
            MovementKind::Compra => "compra",
            MovementKind::Venta => "venta",
            MovementKind::Baja => "baja",
            MovementKind::Robo => "robo",
            MovementKind::TransferIn => "transferencia_entrada",
            MovementKind::TransferOut => "transferencia_salida",
            MovementKind::Adjustment => "ajuste_inventario",
        }
    }

    pub fn sign_rule(self) -> SignRule {
        match self {
            MovementKind::Alta | MovementKind::Compra | MovementKind::TransferIn => SignRule::Increase,
            MovementKind::Venta
            | MovementKind::Baja
            | MovementKind::Robo
            | MovementKind::TransferOut => SignRule::Decrease,
            MovementKind::Adjustment => SignRule::RawDelta,
        }
    }

    /// Signed effect of a stored quantity of this kind on the balance.
    pub fn contribution(self, quantity: Quantity) -> Quantity {
        match self.sign_rule() {
            SignRule::Increase => quantity,
            SignRule::Decrease => -quantity,
            SignRule::RawDelta => quantity,
        }
    }

    pub fn is_adjustment(self) -> bool {
        self == MovementKind::Adjustment
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomainError::validation("tipo_movimiento cannot be empty"));
        }
        MovementKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// One ledger entry as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    #[serde(rename = "articulo_id")]
    pub article_id: ArticleId,
    #[serde(rename = "tipo_movimiento")]
    pub kind: MovementKind,
    #[serde(rename = "cantidad")]
    pub quantity: Quantity,
    #[serde(rename = "motivo")]
    pub reason: String,
    #[serde(rename = "usuario_nombre")]
    pub user_name: String,
    #[serde(rename = "fecha")]
    pub recorded_at: DateTime<Utc>,
}

impl Movement {
    pub fn contribution(&self) -> Quantity {
        self.kind.contribution(self.quantity)
    }
}

/// A movement about to be appended (id not yet assigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub article_id: ArticleId,
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub reason: String,
    pub user_name: String,
    pub recorded_at: DateTime<Utc>,
}

impl NewMovement {
    pub fn into_movement(self, id: MovementId) -> Movement {
        Movement {
            id,
            article_id: self.article_id,
            kind: self.kind,
            quantity: self.quantity,
            reason: self.reason,
            user_name: self.user_name,
            recorded_at: self.recorded_at,
        }
    }
}

/// Command: RecordMovement.
///
/// For `ajuste_inventario` the quantity is the already-signed delta; for every
/// other kind it is a strictly positive magnitude.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMovement {
    pub article_id: ArticleId,
    pub kind: MovementKind,
    pub quantity: Quantity,
    pub reason: String,
    pub user_name: String,
    pub occurred_at: DateTime<Utc>,
}

impl RecordMovement {
    pub fn new(
        article_id: i64,
        kind: &str,
        quantity: Quantity,
        reason: impl Into<String>,
        user_name: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let article_id = ArticleId::new(article_id)?;
        let kind: MovementKind = kind.parse()?;

        if kind.is_adjustment() {
            if quantity.is_zero() {
                return Err(DomainError::validation("adjustment delta cannot be zero"));
            }
        } else if quantity <= Decimal::ZERO {
            return Err(DomainError::validation("cantidad must be positive"));
        }

        Ok(Self {
            article_id,
            kind,
            quantity,
            reason: reason.into(),
            user_name: user_name.into(),
            occurred_at,
        })
    }

    pub fn to_new_movement(&self) -> NewMovement {
        NewMovement {
            article_id: self.article_id,
            kind: self.kind,
            quantity: self.quantity,
            reason: self.reason.clone(),
            user_name: self.user_name.clone(),
            recorded_at: self.occurred_at,
        }
    }
}

/// Command: SeedStock (initial `alta` intake when an article is registered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedStock {
    pub article_id: ArticleId,
    pub quantity: Quantity,
    pub user_name: String,
    pub occurred_at: DateTime<Utc>,
}

impl SeedStock {
    pub const REASON: &'static str = "Inventario inicial";

    pub fn new(
        article_id: i64,
        quantity: Quantity,
        user_name: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let article_id = ArticleId::new(article_id)?;
        if quantity < Decimal::ZERO {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        Ok(Self {
            article_id,
            quantity,
            user_name: user_name.into(),
            occurred_at,
        })
    }
}

/// Command: EditMovement.
///
/// When `kind` is `Some(Adjustment)` the quantity is an absolute target
/// balance; otherwise it replaces the stored quantity under the new kind's
/// sign rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditMovement {
    pub movement_id: MovementId,
    pub quantity: Quantity,
    pub kind: Option<MovementKind>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl EditMovement {
    pub fn new(
        movement_id: i64,
        quantity: Quantity,
        kind: Option<&str>,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let movement_id = MovementId::new(movement_id)?;
        let kind = kind.map(str::parse::<MovementKind>).transpose()?;

        match kind {
            Some(MovementKind::Adjustment) if quantity < Decimal::ZERO => {
                return Err(DomainError::validation("adjustment target cannot be negative"));
            }
            Some(MovementKind::Alta) if quantity < Decimal::ZERO => {
                return Err(DomainError::validation("cantidad cannot be negative"));
            }
            Some(MovementKind::Alta) => {}
            Some(k) if !k.is_adjustment() && quantity <= Decimal::ZERO => {
                return Err(DomainError::validation("cantidad must be positive"));
            }
            _ => {}
        }

        Ok(Self {
            movement_id,
            quantity,
            kind,
            reason,
            occurred_at,
        })
    }
}
