//! Movement ledger entries

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of quantity change recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Material received into the technician's carried stock
    Entrada,
    /// Material leaves the technician's carried stock (into a job, or consumed)
    Salida,
    /// Reservation of carried stock for a material control
    Apartado,
    /// Leftover material returned from a job into carried stock
    Devolucion,
    /// Signed correction; direction is carried on the entry
    Ajuste,
}

impl MovementType {
    pub const ALL: [MovementType; 5] = [
        MovementType::Entrada,
        MovementType::Salida,
        MovementType::Apartado,
        MovementType::Devolucion,
        MovementType::Ajuste,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Entrada => "entrada",
            MovementType::Salida => "salida",
            MovementType::Apartado => "apartado",
            MovementType::Devolucion => "devolucion",
            MovementType::Ajuste => "ajuste",
        }
    }
}

impl FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown movement type '{}'", s))
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an `ajuste` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentDirection {
    Incremento,
    Decremento,
}

impl AdjustmentDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentDirection::Incremento => "incremento",
            AdjustmentDirection::Decremento => "decremento",
        }
    }
}

impl FromStr for AdjustmentDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremento" => Ok(AdjustmentDirection::Incremento),
            "decremento" => Ok(AdjustmentDirection::Decremento),
            other => Err(format!("unknown adjustment direction '{}'", other)),
        }
    }
}

/// Where a movement originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    /// Tied to a work order (OT)
    Order,
    Manual,
}

impl OriginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginKind::Order => "order",
            OriginKind::Manual => "manual",
        }
    }
}

impl FromStr for OriginKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(OriginKind::Order),
            "manual" => Ok(OriginKind::Manual),
            other => Err(format!("unknown origin kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOrigin {
    pub kind: OriginKind,
    pub reference_id: Option<Uuid>,
}

impl MovementOrigin {
    pub fn order(order_id: Uuid) -> Self {
        Self {
            kind: OriginKind::Order,
            reference_id: Some(order_id),
        }
    }

    pub fn manual() -> Self {
        Self {
            kind: OriginKind::Manual,
            reference_id: None,
        }
    }

    /// Origin for entries written on behalf of a control: the work order when
    /// there is one, otherwise a manual movement
    pub fn for_order(order_id: Option<Uuid>) -> Self {
        order_id.map(Self::order).unwrap_or_else(Self::manual)
    }
}

/// One immutable ledger fact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementEntry {
    pub id: Uuid,
    /// Position in the ledger, assigned on append (0 while still planned)
    pub secuencia: i64,
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub tipo: MovementType,
    /// Always strictly positive; the sign comes from `tipo` (and `direccion`)
    pub cantidad: Decimal,
    /// Required for `ajuste`, absent otherwise
    pub direccion: Option<AdjustmentDirection>,
    pub motivo: String,
    pub responsable_id: Uuid,
    pub origen: MovementOrigin,
    /// Material control this entry was written for, if any
    pub control_id: Option<Uuid>,
    pub visible_para_analistas: bool,
    pub fecha: DateTime<Utc>,
}

impl MovementEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        technician_id: Uuid,
        material_id: Uuid,
        tipo: MovementType,
        cantidad: Decimal,
        motivo: impl Into<String>,
        responsable_id: Uuid,
        origen: MovementOrigin,
        fecha: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            secuencia: 0,
            technician_id,
            material_id,
            tipo,
            cantidad,
            direccion: None,
            motivo: motivo.into(),
            responsable_id,
            origen,
            control_id: None,
            visible_para_analistas: true,
            fecha,
        }
    }

    pub fn for_control(mut self, control_id: Uuid) -> Self {
        self.control_id = Some(control_id);
        self
    }

    pub fn with_direction(mut self, direccion: AdjustmentDirection) -> Self {
        self.direccion = Some(direccion);
        self
    }

    pub fn with_visibility(mut self, visible_para_analistas: bool) -> Self {
        self.visible_para_analistas = visible_para_analistas;
        self
    }
}
