//! Database models for the field materials service
//!
//! Re-exports models from the shared crate and adds the row types that map
//! them to PostgreSQL. Enum columns are stored as VARCHAR and parsed back
//! through the shared `FromStr` impls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

pub use shared::models::*;

use crate::error::AppError;

#[derive(Debug, FromRow)]
pub struct MaterialRow {
    pub id: Uuid,
    pub codigo: String,
    pub nombre: String,
    pub unidad: String,
    pub costo_unitario: Decimal,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            codigo: row.codigo,
            nombre: row.nombre,
            unidad: row.unidad,
            costo_unitario: row.costo_unitario,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct LedgerRow {
    pub secuencia: i64,
    pub id: Uuid,
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub tipo: String,
    pub cantidad: Decimal,
    pub direccion: Option<String>,
    pub motivo: String,
    pub responsable_id: Uuid,
    pub origen_tipo: String,
    pub origen_referencia: Option<Uuid>,
    pub control_id: Option<Uuid>,
    pub visible_para_analistas: bool,
    pub fecha: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for MovementEntry {
    type Error = AppError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let tipo = row
            .tipo
            .parse::<MovementType>()
            .map_err(|e| AppError::corrupt("movement type", e))?;
        let direccion = row
            .direccion
            .as_deref()
            .map(str::parse::<AdjustmentDirection>)
            .transpose()
            .map_err(|e| AppError::corrupt("adjustment direction", e))?;
        let kind = row
            .origen_tipo
            .parse::<OriginKind>()
            .map_err(|e| AppError::corrupt("origin kind", e))?;

        Ok(MovementEntry {
            id: row.id,
            secuencia: row.secuencia,
            technician_id: row.technician_id,
            material_id: row.material_id,
            tipo,
            cantidad: row.cantidad,
            direccion,
            motivo: row.motivo,
            responsable_id: row.responsable_id,
            origen: MovementOrigin {
                kind,
                reference_id: row.origen_referencia,
            },
            control_id: row.control_id,
            visible_para_analistas: row.visible_para_analistas,
            fecha: row.fecha,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct StockRow {
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub cantidad_actual: Decimal,
    pub cantidad_apartada: Decimal,
    pub cantidad_disponible: Decimal,
    pub ultimo_movimiento: Option<DateTime<Utc>>,
    pub version: i64,
}

impl From<StockRow> for VersionedBalance {
    fn from(row: StockRow) -> Self {
        VersionedBalance {
            line: TechnicianStockLine {
                technician_id: row.technician_id,
                material_id: row.material_id,
                cantidad_actual: row.cantidad_actual,
                cantidad_apartada: row.cantidad_apartada,
                cantidad_disponible: row.cantidad_disponible,
                ultimo_movimiento: row.ultimo_movimiento,
            },
            version: row.version,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ControlRow {
    pub id: Uuid,
    pub technician_id: Uuid,
    pub order_id: Option<Uuid>,
    pub bodeguero_id: Uuid,
    pub analista_id: Option<Uuid>,
    pub estado_general: String,
    pub fecha_asignacion: DateTime<Utc>,
    pub fecha_inicio_trabajo: Option<DateTime<Utc>>,
    pub fecha_fin_trabajo: Option<DateTime<Utc>>,
    pub fecha_devolucion: Option<DateTime<Utc>>,
    pub fecha_resolucion_descuadre: Option<DateTime<Utc>>,
    pub fecha_cierre: Option<DateTime<Utc>>,
    pub descuadre_resuelto: bool,
    pub motivo_descuadre: Option<String>,
    pub observaciones_bodeguero: Option<String>,
    pub observaciones_tecnico: Option<String>,
    pub observaciones_analista: Option<String>,
    pub version: i64,
}

#[derive(Debug, FromRow)]
pub struct LineRow {
    pub control_id: Uuid,
    pub material_id: Uuid,
    /// Index of the line in the original assignment
    pub posicion: i32,
    pub cantidad_asignada: Decimal,
    pub cantidad_utilizada: Decimal,
    pub cantidad_devuelta: Decimal,
    pub cantidad_perdida: Decimal,
    pub motivo_perdida: Option<String>,
    pub valor_perdida: Decimal,
    pub estado: String,
}

impl TryFrom<LineRow> for AssignmentLine {
    type Error = AppError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        Ok(AssignmentLine {
            control_id: row.control_id,
            material_id: row.material_id,
            cantidad_asignada: row.cantidad_asignada,
            cantidad_utilizada: row.cantidad_utilizada,
            cantidad_devuelta: row.cantidad_devuelta,
            cantidad_perdida: row.cantidad_perdida,
            motivo_perdida: row.motivo_perdida,
            valor_perdida: row.valor_perdida,
            estado: row
                .estado
                .parse::<LineState>()
                .map_err(|e| AppError::corrupt("line state", e))?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct HistoryRow {
    pub control_id: Uuid,
    pub estado: String,
    pub fecha: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StateChange {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(StateChange {
            estado: row
                .estado
                .parse::<ControlState>()
                .map_err(|e| AppError::corrupt("control state", e))?,
            fecha: row.fecha,
        })
    }
}

impl ControlRow {
    /// Assemble the aggregate from its header row plus child rows
    pub fn into_control(
        self,
        lines: Vec<LineRow>,
        history: Vec<HistoryRow>,
    ) -> Result<MaterialControl, AppError> {
        let estado_general = self
            .estado_general
            .parse::<ControlState>()
            .map_err(|e| AppError::corrupt("control state", e))?;
        let mut lines = lines;
        lines.sort_by_key(|l| l.posicion);
        let lines = lines
            .into_iter()
            .map(AssignmentLine::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut historial = history
            .into_iter()
            .map(StateChange::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        historial.sort_by_key(|c| c.estado.rank());

        Ok(MaterialControl {
            id: self.id,
            technician_id: self.technician_id,
            order_id: self.order_id,
            bodeguero_id: self.bodeguero_id,
            analista_id: self.analista_id,
            lines,
            estado_general,
            historial,
            fecha_asignacion: self.fecha_asignacion,
            fecha_inicio_trabajo: self.fecha_inicio_trabajo,
            fecha_fin_trabajo: self.fecha_fin_trabajo,
            fecha_devolucion: self.fecha_devolucion,
            fecha_resolucion_descuadre: self.fecha_resolucion_descuadre,
            fecha_cierre: self.fecha_cierre,
            descuadre_resuelto: self.descuadre_resuelto,
            motivo_descuadre: self.motivo_descuadre,
            observaciones_bodeguero: self.observaciones_bodeguero,
            observaciones_tecnico: self.observaciones_tecnico,
            observaciones_analista: self.observaciones_analista,
            version: self.version,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AlertRow {
    pub secuencia: i64,
    pub payload: serde_json::Value,
    pub fecha: DateTime<Utc>,
}

impl TryFrom<AlertRow> for AlertEvent {
    type Error = AppError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let evento: AlertKind = serde_json::from_value(row.payload)
            .map_err(|e| AppError::corrupt("alert payload", e))?;
        Ok(AlertEvent {
            secuencia: row.secuencia,
            evento,
            fecha: row.fecha,
        })
    }
}
