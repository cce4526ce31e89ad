//! Events handed to the external alert emitter

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tipo", rename_all = "snake_case")]
pub enum AlertKind {
    /// A control finished its return with a non-zero discrepancy
    DiscrepancyDetected {
        control_id: Uuid,
        technician_id: Uuid,
        valor_descuadre: Decimal,
    },
    /// A write left the available balance below the configured threshold
    LowBalance {
        technician_id: Uuid,
        material_id: Uuid,
        cantidad_disponible: Decimal,
        umbral: Decimal,
    },
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::DiscrepancyDetected { .. } => "discrepancy_detected",
            AlertKind::LowBalance { .. } => "low_balance",
        }
    }

    pub fn technician_id(&self) -> Uuid {
        match self {
            AlertKind::DiscrepancyDetected { technician_id, .. }
            | AlertKind::LowBalance { technician_id, .. } => *technician_id,
        }
    }
}

/// Outbox record; `secuencia` is strictly increasing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertEvent {
    pub secuencia: i64,
    #[serde(flatten)]
    pub evento: AlertKind,
    pub fecha: DateTime<Utc>,
}
