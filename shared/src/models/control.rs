//! Material control: one allocation of materials to a technician

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Lifecycle state of a material control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Asignado,
    EnTrabajo,
    TrabajoCompletado,
    DevolucionPendiente,
    DevolucionCompletada,
    Cerrado,
}

impl ControlState {
    pub const ALL: [ControlState; 6] = [
        ControlState::Asignado,
        ControlState::EnTrabajo,
        ControlState::TrabajoCompletado,
        ControlState::DevolucionPendiente,
        ControlState::DevolucionCompletada,
        ControlState::Cerrado,
    ];

    /// Transition table. Every edge moves strictly forward.
    pub fn next_states(&self) -> &'static [ControlState] {
        match self {
            ControlState::Asignado => &[ControlState::EnTrabajo],
            ControlState::EnTrabajo => &[ControlState::TrabajoCompletado],
            ControlState::TrabajoCompletado => &[
                ControlState::DevolucionPendiente,
                ControlState::DevolucionCompletada,
            ],
            ControlState::DevolucionPendiente => &[ControlState::DevolucionCompletada],
            ControlState::DevolucionCompletada => &[ControlState::Cerrado],
            ControlState::Cerrado => &[],
        }
    }

    pub fn can_transition_to(&self, next: ControlState) -> bool {
        self.next_states().contains(&next)
    }

    /// Position along the lifecycle
    pub fn rank(&self) -> u8 {
        match self {
            ControlState::Asignado => 0,
            ControlState::EnTrabajo => 1,
            ControlState::TrabajoCompletado => 2,
            ControlState::DevolucionPendiente => 3,
            ControlState::DevolucionCompletada => 4,
            ControlState::Cerrado => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControlState::Cerrado)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Asignado => "asignado",
            ControlState::EnTrabajo => "en_trabajo",
            ControlState::TrabajoCompletado => "trabajo_completado",
            ControlState::DevolucionPendiente => "devolucion_pendiente",
            ControlState::DevolucionCompletada => "devolucion_completada",
            ControlState::Cerrado => "cerrado",
        }
    }
}

impl FromStr for ControlState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown control state '{}'", s))
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single assignment line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineState {
    Pendiente,
    EnUso,
    DevueltoParcial,
    DevueltoTotal,
    Completado,
}

impl LineState {
    pub const ALL: [LineState; 5] = [
        LineState::Pendiente,
        LineState::EnUso,
        LineState::DevueltoParcial,
        LineState::DevueltoTotal,
        LineState::Completado,
    ];

    /// Reconciled lines never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LineState::DevueltoParcial | LineState::DevueltoTotal | LineState::Completado
        )
    }

    /// Terminal state for a reconciled line, decided by how much came back
    pub fn after_return(asignada: Decimal, devuelta: Decimal) -> Self {
        if devuelta.is_zero() {
            LineState::Completado
        } else if devuelta == asignada {
            LineState::DevueltoTotal
        } else {
            LineState::DevueltoParcial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LineState::Pendiente => "pendiente",
            LineState::EnUso => "en_uso",
            LineState::DevueltoParcial => "devuelto_parcial",
            LineState::DevueltoTotal => "devuelto_total",
            LineState::Completado => "completado",
        }
    }
}

impl FromStr for LineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LineState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown line state '{}'", s))
    }
}

/// One material inside a control, keyed by `(control_id, material_id)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentLine {
    pub control_id: Uuid,
    pub material_id: Uuid,
    pub cantidad_asignada: Decimal,
    pub cantidad_utilizada: Decimal,
    pub cantidad_devuelta: Decimal,
    pub cantidad_perdida: Decimal,
    pub motivo_perdida: Option<String>,
    /// `cantidad_perdida * costo_unitario`, priced when the line is reconciled
    pub valor_perdida: Decimal,
    pub estado: LineState,
}

impl AssignmentLine {
    pub fn new(control_id: Uuid, material_id: Uuid, cantidad_asignada: Decimal) -> Self {
        Self {
            control_id,
            material_id,
            cantidad_asignada,
            cantidad_utilizada: Decimal::ZERO,
            cantidad_devuelta: Decimal::ZERO,
            cantidad_perdida: Decimal::ZERO,
            motivo_perdida: None,
            valor_perdida: Decimal::ZERO,
            estado: LineState::Pendiente,
        }
    }

    /// used + returned + lost; `None` if the sum overflows
    pub fn accounted(&self) -> Option<Decimal> {
        self.cantidad_utilizada
            .checked_add(self.cantidad_devuelta)?
            .checked_add(self.cantidad_perdida)
    }

    pub fn is_balanced(&self) -> bool {
        self.accounted() == Some(self.cantidad_asignada)
    }
}

/// One entry of a control's state history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateChange {
    pub estado: ControlState,
    pub fecha: DateTime<Utc>,
}

/// Assignment record for one allocation event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialControl {
    pub id: Uuid,
    pub technician_id: Uuid,
    /// Opaque work-order (OT) reference
    pub order_id: Option<Uuid>,
    pub bodeguero_id: Uuid,
    pub analista_id: Option<Uuid>,
    pub lines: Vec<AssignmentLine>,
    pub estado_general: ControlState,
    pub historial: Vec<StateChange>,
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
    /// Optimistic concurrency version; bumped on every committed write
    pub version: i64,
}

impl MaterialControl {
    pub fn new(
        technician_id: Uuid,
        bodeguero_id: Uuid,
        order_id: Option<Uuid>,
        fecha_asignacion: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            technician_id,
            order_id,
            bodeguero_id,
            analista_id: None,
            lines: Vec::new(),
            estado_general: ControlState::Asignado,
            historial: vec![StateChange {
                estado: ControlState::Asignado,
                fecha: fecha_asignacion,
            }],
            fecha_asignacion,
            fecha_inicio_trabajo: None,
            fecha_fin_trabajo: None,
            fecha_devolucion: None,
            fecha_resolucion_descuadre: None,
            fecha_cierre: None,
            descuadre_resuelto: false,
            motivo_descuadre: None,
            observaciones_bodeguero: None,
            observaciones_tecnico: None,
            observaciones_analista: None,
            version: 0,
        }
    }

    /// Total priced loss over all lines
    pub fn valor_descuadre(&self) -> Decimal {
        self.lines
            .iter()
            .fold(Decimal::ZERO, |total, l| total.saturating_add(l.valor_perdida))
    }

    pub fn tiene_descuadre(&self) -> bool {
        self.valor_descuadre() > Decimal::ZERO
    }

    pub fn line(&self, material_id: Uuid) -> Option<&AssignmentLine> {
        self.lines.iter().find(|l| l.material_id == material_id)
    }

    pub fn line_mut(&mut self, material_id: Uuid) -> Option<&mut AssignmentLine> {
        self.lines.iter_mut().find(|l| l.material_id == material_id)
    }

    /// Whether every line has been reconciled
    pub fn all_lines_reconciled(&self) -> bool {
        self.lines.iter().all(|l| l.estado.is_terminal())
    }

    pub fn is_open(&self) -> bool {
        !self.estado_general.is_terminal()
    }

    pub fn can_close(&self) -> bool {
        self.estado_general == ControlState::DevolucionCompletada
            && (!self.tiene_descuadre() || self.descuadre_resuelto)
    }

    /// Move to `next` if the transition table allows it
    pub fn transition(
        &mut self,
        next: ControlState,
        operation: &'static str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.estado_general.can_transition_to(next) {
            return Err(DomainError::StateTransition {
                from: self.estado_general,
                operation,
            });
        }
        self.estado_general = next;
        self.historial.push(StateChange { estado: next, fecha: at });
        Ok(())
    }

    /// Fail unless the control is in one of `allowed`
    pub fn require_state(
        &self,
        allowed: &[ControlState],
        operation: &'static str,
    ) -> DomainResult<()> {
        if allowed.contains(&self.estado_general) {
            Ok(())
        } else {
            Err(DomainError::StateTransition {
                from: self.estado_general,
                operation,
            })
        }
    }
}

/// Query over controls; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFilter {
    pub technician_id: Option<Uuid>,
    pub estado: Option<ControlState>,
    pub tiene_descuadre: Option<bool>,
    pub descuadre_resuelto: Option<bool>,
    pub solo_abiertos: bool,
}

impl ControlFilter {
    pub fn matches(&self, control: &MaterialControl) -> bool {
        self.technician_id.map_or(true, |t| control.technician_id == t)
            && self.estado.map_or(true, |e| control.estado_general == e)
            && self
                .tiene_descuadre
                .map_or(true, |d| control.tiene_descuadre() == d)
            && self
                .descuadre_resuelto
                .map_or(true, |r| control.descuadre_resuelto == r)
            && (!self.solo_abiertos || control.is_open())
    }
}

/// A control together with its computed discrepancy aggregates
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    #[serde(flatten)]
    pub control: MaterialControl,
    pub valor_descuadre: Decimal,
    pub tiene_descuadre: bool,
}

impl From<MaterialControl> for ControlResponse {
    fn from(control: MaterialControl) -> Self {
        Self {
            valor_descuadre: control.valor_descuadre(),
            tiene_descuadre: control.tiene_descuadre(),
            control,
        }
    }
}
