//! Technician stock balances

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AdjustmentDirection, MovementEntry, MovementType};
use crate::error::{DomainError, DomainResult};
use crate::validation::MAX_QUANTITY;

/// Mutual-exclusion unit for stock balances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub technician_id: Uuid,
    pub material_id: Uuid,
}

impl StockKey {
    pub fn new(technician_id: Uuid, material_id: Uuid) -> Self {
        Self {
            technician_id,
            material_id,
        }
    }
}

/// How one ledger entry moves the two stored quantities of a stock line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceEffect {
    pub actual: Decimal,
    pub apartada: Decimal,
}

impl BalanceEffect {
    /// Type-to-sign mapping of the ledger fold
    ///
    /// `apartado` reserves (available goes down), `salida` takes material out
    /// of carried stock and, for entries written on behalf of a control, turns
    /// the reservation into in-use material.
    pub fn of(entry: &MovementEntry) -> Self {
        let q = entry.cantidad;
        match entry.tipo {
            MovementType::Entrada | MovementType::Devolucion => Self {
                actual: q,
                apartada: Decimal::ZERO,
            },
            MovementType::Apartado => Self {
                actual: Decimal::ZERO,
                apartada: q,
            },
            MovementType::Salida => Self {
                actual: -q,
                apartada: if entry.control_id.is_some() {
                    -q
                } else {
                    Decimal::ZERO
                },
            },
            MovementType::Ajuste => Self {
                actual: match entry.direccion {
                    Some(AdjustmentDirection::Decremento) => -q,
                    _ => q,
                },
                apartada: Decimal::ZERO,
            },
        }
    }

    /// Net change of the available balance
    pub fn disponible(&self) -> Decimal {
        self.actual - self.apartada
    }
}

/// Per-technician, per-material running balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TechnicianStockLine {
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub cantidad_actual: Decimal,
    pub cantidad_apartada: Decimal,
    /// Always `cantidad_actual - cantidad_apartada`
    pub cantidad_disponible: Decimal,
    pub ultimo_movimiento: Option<DateTime<Utc>>,
}

impl TechnicianStockLine {
    /// Zero-balance default for a key with no history
    pub fn empty(key: StockKey) -> Self {
        Self {
            technician_id: key.technician_id,
            material_id: key.material_id,
            cantidad_actual: Decimal::ZERO,
            cantidad_apartada: Decimal::ZERO,
            cantidad_disponible: Decimal::ZERO,
            ultimo_movimiento: None,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.technician_id, self.material_id)
    }

    /// Fold one ledger entry into this balance
    ///
    /// Leaves the line untouched and fails with `NegativeStock` if any
    /// quantity would drop below zero, or `InvalidQuantity` if it would
    /// leave the storable range.
    pub fn apply(&mut self, entry: &MovementEntry) -> DomainResult<()> {
        if entry.technician_id != self.technician_id || entry.material_id != self.material_id {
            return Err(DomainError::InvalidQuantity(format!(
                "entry {} does not belong to this stock line",
                entry.id
            )));
        }

        let effect = BalanceEffect::of(entry);
        let out_of_range = || {
            DomainError::InvalidQuantity(format!(
                "balance of material {} for technician {} would exceed the storable range",
                self.material_id, self.technician_id
            ))
        };
        let actual = self
            .cantidad_actual
            .checked_add(effect.actual)
            .filter(|q| *q < MAX_QUANTITY)
            .ok_or_else(out_of_range)?;
        let apartada = self
            .cantidad_apartada
            .checked_add(effect.apartada)
            .filter(|q| *q < MAX_QUANTITY)
            .ok_or_else(out_of_range)?;
        let disponible = actual.checked_sub(apartada).ok_or_else(out_of_range)?;

        if actual < Decimal::ZERO || apartada < Decimal::ZERO || disponible < Decimal::ZERO {
            return Err(DomainError::NegativeStock {
                technician_id: self.technician_id,
                material_id: self.material_id,
            });
        }

        self.cantidad_actual = actual;
        self.cantidad_apartada = apartada;
        self.cantidad_disponible = disponible;
        self.ultimo_movimiento = Some(entry.fecha);
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        self.cantidad_actual.checked_sub(self.cantidad_apartada) == Some(self.cantidad_disponible)
            && self.cantidad_actual >= Decimal::ZERO
            && self.cantidad_apartada >= Decimal::ZERO
            && self.cantidad_disponible >= Decimal::ZERO
    }
}

/// A balance line plus the version used for compare-and-swap writes
///
/// Version 0 means the line has never been written.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedBalance {
    pub line: TechnicianStockLine,
    pub version: i64,
}

impl VersionedBalance {
    pub fn empty(key: StockKey) -> Self {
        Self {
            line: TechnicianStockLine::empty(key),
            version: 0,
        }
    }
}

/// Where assignments draw their material from (deployment policy)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// Reserve from the technician's own carried stock
    #[default]
    TechnicianStock,
    /// Draw from the shared warehouse pool and hand over in the same unit
    CentralPool,
}

impl StockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockPolicy::TechnicianStock => "technician_stock",
            StockPolicy::CentralPool => "central_pool",
        }
    }
}

impl FromStr for StockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [StockPolicy::TechnicianStock, StockPolicy::CentralPool]
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown stock policy '{}'", s))
    }
}
