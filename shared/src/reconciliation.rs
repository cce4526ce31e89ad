//! Material control lifecycle and reconciliation planning
//!
//! Every operation is split in two halves. The planners in this module read a
//! consistent snapshot (a [`StockView`] plus the current control), run all
//! validation, and produce a [`Plan`]: the ledger entries to append, the
//! balance writes with their expected versions, pool changes and the new
//! control record. Nothing is written here. A store then commits the plan as
//! one atomic unit, rejecting it with `ConcurrencyConflict` if any version
//! moved in between.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::ledger::validate_entry;
use crate::models::{
    AdjustmentDirection, AlertKind, AssignmentLine, ControlState, LineState, MaterialCatalog,
    MaterialControl, MovementEntry, MovementOrigin, MovementType, StockKey, StockPolicy,
};
use crate::stock::{BalanceWrite, PoolWrite, StockView};
use crate::validation::{
    is_low_balance, loss_value, validate_line_conservation, validate_loss_reason,
    validate_positive_quantity, validate_reason,
};

// ============================================================================
// Requests
// ============================================================================

/// One material to hand over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentLineInput {
    pub material_id: Uuid,
    pub cantidad: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub technician_id: Uuid,
    pub bodeguero_id: Uuid,
    pub order_id: Option<Uuid>,
    pub lines: Vec<AssignmentLineInput>,
    pub observaciones: Option<String>,
}

/// Technician's account of one line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnLineUpdate {
    pub material_id: Uuid,
    pub cantidad_utilizada: Decimal,
    pub cantidad_devuelta: Decimal,
    pub cantidad_perdida: Decimal,
    pub motivo_perdida: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub lines: Vec<ReturnLineUpdate>,
    pub observaciones: Option<String>,
}

/// Manual `entrada` into a technician's carried stock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveRequest {
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub cantidad: Decimal,
    pub motivo: String,
    pub responsable_id: Uuid,
    pub order_id: Option<Uuid>,
    pub visible_para_analistas: bool,
}

/// Signed correction, optionally referencing a (usually closed) control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub technician_id: Uuid,
    pub material_id: Uuid,
    pub direccion: AdjustmentDirection,
    pub cantidad: Decimal,
    pub motivo: String,
    pub responsable_id: Uuid,
    pub control_id: Option<Uuid>,
}

// ============================================================================
// Plans
// ============================================================================

/// Control record to persist; `expected_version` is `None` for a new control
#[derive(Debug, Clone)]
pub struct ControlWrite {
    pub expected_version: Option<i64>,
    pub control: MaterialControl,
}

/// Everything one operation will change, validated and ready to commit
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub entries: Vec<MovementEntry>,
    pub balances: Vec<BalanceWrite>,
    pub pool: Vec<PoolWrite>,
    pub control: Option<ControlWrite>,
    /// Events decided by the planner itself (discrepancies)
    pub events: Vec<AlertKind>,
}

impl Plan {
    /// Planner events plus a `LowBalance` for every written line left under
    /// `threshold`
    pub fn alert_events(&self, threshold: Decimal) -> Vec<AlertKind> {
        let mut events = self.events.clone();
        events.extend(
            self.balances
                .iter()
                .filter(|w| is_low_balance(w.line.cantidad_disponible, threshold))
                .map(|w| AlertKind::LowBalance {
                    technician_id: w.line.technician_id,
                    material_id: w.line.material_id,
                    cantidad_disponible: w.line.cantidad_disponible,
                    umbral: threshold,
                }),
        );
        events
    }
}

/// Accumulates ledger entries and folds each into the balance it touches
struct PlanBuilder<'a, V: StockView> {
    view: &'a V,
    touched: BTreeMap<StockKey, BalanceWrite>,
    entries: Vec<MovementEntry>,
    pool: Vec<PoolWrite>,
}

impl<'a, V: StockView> PlanBuilder<'a, V> {
    fn new(view: &'a V) -> Self {
        Self {
            view,
            touched: BTreeMap::new(),
            entries: Vec::new(),
            pool: Vec::new(),
        }
    }

    /// Balance as it will be once the entries recorded so far are applied
    fn pending_balance(&self, key: StockKey) -> Decimal {
        self.touched.get(&key).map_or_else(
            || self.view.versioned_balance(key).line.cantidad_disponible,
            |w| w.line.cantidad_disponible,
        )
    }

    fn record(&mut self, entry: MovementEntry) -> DomainResult<()> {
        validate_entry(&entry)?;
        let key = StockKey::new(entry.technician_id, entry.material_id);
        let view = self.view;
        let write = self.touched.entry(key).or_insert_with(|| {
            let current = view.versioned_balance(key);
            BalanceWrite {
                expected_version: current.version,
                line: current.line,
            }
        });
        write.line.apply(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    fn finish(self, control: Option<ControlWrite>, events: Vec<AlertKind>) -> Plan {
        Plan {
            entries: self.entries,
            balances: self.touched.into_values().collect(),
            pool: self.pool,
            control,
            events,
        }
    }
}

fn next_version(control: &MaterialControl) -> ControlWrite {
    ControlWrite {
        expected_version: Some(control.version),
        control: control.clone(),
    }
}

// ============================================================================
// Assignment and work lifecycle
// ============================================================================

/// Reserve materials for a technician and open a control in `asignado`
pub fn plan_assignment<V: StockView>(
    view: &V,
    catalog: &MaterialCatalog,
    policy: StockPolicy,
    request: AssignmentRequest,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    if request.lines.is_empty() {
        return Err(DomainError::InvalidQuantity(
            "an assignment needs at least one line".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for line in &request.lines {
        catalog.require(line.material_id)?;
        validate_positive_quantity(line.cantidad).map_err(|msg| {
            DomainError::InvalidQuantity(format!("material {}: {}", line.material_id, msg))
        })?;
        if !seen.insert(line.material_id) {
            return Err(DomainError::mismatch(
                line.material_id,
                "material listed more than once in the same assignment",
            ));
        }
    }

    let mut control = MaterialControl::new(
        request.technician_id,
        request.bodeguero_id,
        request.order_id,
        now,
    );
    control.observaciones_bodeguero = request.observaciones;
    let origin = MovementOrigin::for_order(request.order_id);
    let mut builder = PlanBuilder::new(view);

    for line in &request.lines {
        let key = StockKey::new(request.technician_id, line.material_id);

        match policy {
            StockPolicy::CentralPool => {
                let available = view.central_available(line.material_id);
                if available < line.cantidad {
                    return Err(DomainError::InsufficientStock {
                        material_id: line.material_id,
                        requested: line.cantidad,
                        available,
                    });
                }
                builder.pool.push(PoolWrite {
                    material_id: line.material_id,
                    delta: -line.cantidad,
                });
                builder.record(
                    MovementEntry::new(
                        request.technician_id,
                        line.material_id,
                        MovementType::Entrada,
                        line.cantidad,
                        format!("Entrega de bodega para control {}", control.id),
                        request.bodeguero_id,
                        origin,
                        now,
                    )
                    .for_control(control.id),
                )?;
            }
            StockPolicy::TechnicianStock => {
                let available = builder.pending_balance(key);
                if available < line.cantidad {
                    return Err(DomainError::InsufficientStock {
                        material_id: line.material_id,
                        requested: line.cantidad,
                        available,
                    });
                }
            }
        }

        builder
            .record(
                MovementEntry::new(
                    request.technician_id,
                    line.material_id,
                    MovementType::Apartado,
                    line.cantidad,
                    format!("Apartado para control {}", control.id),
                    request.bodeguero_id,
                    origin,
                    now,
                )
                .for_control(control.id),
            )
            .map_err(|err| match err {
                DomainError::NegativeStock { .. } => DomainError::InsufficientStock {
                    material_id: line.material_id,
                    requested: line.cantidad,
                    available: view.balance(request.technician_id, line.material_id).cantidad_disponible,
                },
                other => other,
            })?;

        control
            .lines
            .push(AssignmentLine::new(control.id, line.material_id, line.cantidad));
    }

    Ok(builder.finish(
        Some(ControlWrite {
            expected_version: None,
            control,
        }),
        Vec::new(),
    ))
}

/// Technician takes the reserved materials into the job
pub fn plan_start_work<V: StockView>(
    view: &V,
    control: &MaterialControl,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    control.require_state(&[ControlState::Asignado], "start work on")?;

    let mut write = next_version(control);
    let next = &mut write.control;
    next.transition(ControlState::EnTrabajo, "start work on", now)?;
    next.fecha_inicio_trabajo = Some(now);

    let origin = MovementOrigin::for_order(control.order_id);
    let mut builder = PlanBuilder::new(view);
    for line in next.lines.iter_mut() {
        builder.record(
            MovementEntry::new(
                control.technician_id,
                line.material_id,
                MovementType::Salida,
                line.cantidad_asignada,
                format!("Salida a trabajo, control {}", control.id),
                actor_id,
                origin,
                now,
            )
            .for_control(control.id),
        )?;
        line.estado = LineState::EnUso;
    }

    Ok(builder.finish(Some(write), Vec::new()))
}

/// Technician declares the job done; returns are processed later
pub fn plan_complete_work(
    control: &MaterialControl,
    observaciones: Option<String>,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    control.require_state(&[ControlState::EnTrabajo], "complete work on")?;

    let mut write = next_version(control);
    write
        .control
        .transition(ControlState::TrabajoCompletado, "complete work on", now)?;
    write.control.fecha_fin_trabajo = Some(now);
    if observaciones.is_some() {
        write.control.observaciones_tecnico = observaciones;
    }

    Ok(Plan {
        control: Some(write),
        ..Plan::default()
    })
}

// ============================================================================
// Returns and discrepancies
// ============================================================================

/// Reconcile some or all lines of a finished job
pub fn plan_return<V: StockView>(
    view: &V,
    catalog: &MaterialCatalog,
    control: &MaterialControl,
    request: &ReturnRequest,
    actor_id: Uuid,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    control.require_state(
        &[
            ControlState::TrabajoCompletado,
            ControlState::DevolucionPendiente,
        ],
        "record a return for",
    )?;
    if request.lines.is_empty() {
        return Err(DomainError::InvalidQuantity(
            "a return needs at least one line".to_string(),
        ));
    }

    // Validate every line before touching anything
    let mut seen = HashSet::new();
    for update in &request.lines {
        let material_id = update.material_id;
        if !seen.insert(material_id) {
            return Err(DomainError::mismatch(
                material_id,
                "material reported more than once in the same return",
            ));
        }
        let line = control.line(material_id).ok_or(DomainError::NotFound {
            resource: "Assignment line",
            id: material_id,
        })?;
        if line.estado.is_terminal() {
            return Err(DomainError::StateTransition {
                from: control.estado_general,
                operation: "report an already reconciled line of",
            });
        }
        validate_line_conservation(
            line.cantidad_asignada,
            update.cantidad_utilizada,
            update.cantidad_devuelta,
            update.cantidad_perdida,
        )
        .map_err(|msg| {
            DomainError::mismatch(
                material_id,
                format!(
                    "{} (asignada {}, utilizada {}, devuelta {}, perdida {})",
                    msg,
                    line.cantidad_asignada,
                    update.cantidad_utilizada,
                    update.cantidad_devuelta,
                    update.cantidad_perdida
                ),
            )
        })?;
        validate_loss_reason(update.cantidad_perdida, update.motivo_perdida.as_deref())
            .map_err(|msg| DomainError::mismatch(material_id, msg))?;
        if update.cantidad_perdida > Decimal::ZERO {
            catalog.require(material_id)?;
        }
    }

    let mut write = next_version(control);
    let origin = MovementOrigin::for_order(control.order_id);
    let mut builder = PlanBuilder::new(view);

    for update in &request.lines {
        let costo = catalog
            .costo_unitario(&update.material_id)
            .unwrap_or_default();
        let line = write
            .control
            .line_mut(update.material_id)
            .ok_or(DomainError::NotFound {
                resource: "Assignment line",
                id: update.material_id,
            })?;

        line.cantidad_utilizada = update.cantidad_utilizada;
        line.cantidad_devuelta = update.cantidad_devuelta;
        line.cantidad_perdida = update.cantidad_perdida;
        line.motivo_perdida = update
            .motivo_perdida
            .clone()
            .filter(|m| !m.trim().is_empty());
        line.valor_perdida = loss_value(update.cantidad_perdida, costo)
            .map_err(|msg| DomainError::mismatch(update.material_id, msg))?;
        line.estado = LineState::after_return(line.cantidad_asignada, update.cantidad_devuelta);

        if update.cantidad_devuelta > Decimal::ZERO {
            builder.record(
                MovementEntry::new(
                    control.technician_id,
                    update.material_id,
                    MovementType::Devolucion,
                    update.cantidad_devuelta,
                    format!("Devolución de sobrante, control {}", control.id),
                    actor_id,
                    origin,
                    now,
                )
                .for_control(control.id),
            )?;
        }
    }

    if request.observaciones.is_some() {
        write.control.observaciones_tecnico = request.observaciones.clone();
    }

    let mut events = Vec::new();
    let next = &mut write.control;
    if next.all_lines_reconciled() {
        next.transition(ControlState::DevolucionCompletada, "record a return for", now)?;
        next.fecha_devolucion = Some(now);
        next.motivo_descuadre = discrepancy_summary(next, catalog);
        if next.tiene_descuadre() {
            events.push(AlertKind::DiscrepancyDetected {
                control_id: next.id,
                technician_id: next.technician_id,
                valor_descuadre: next.valor_descuadre(),
            });
        }
    } else if next.estado_general == ControlState::TrabajoCompletado {
        next.transition(ControlState::DevolucionPendiente, "record a return for", now)?;
    }

    Ok(builder.finish(Some(write), events))
}

/// Human-readable account of which materials were lost and what they cost
pub fn discrepancy_summary(control: &MaterialControl, catalog: &MaterialCatalog) -> Option<String> {
    let parts: Vec<String> = control
        .lines
        .iter()
        .filter(|l| l.valor_perdida > Decimal::ZERO)
        .map(|l| {
            let (nombre, costo) = catalog
                .get(&l.material_id)
                .map(|m| (format!("{} ({})", m.nombre, m.codigo), m.costo_unitario))
                .unwrap_or_else(|| (l.material_id.to_string(), Decimal::ZERO));
            let mut part = format!(
                "{}: {} perdida(s) x {} = {}",
                nombre, l.cantidad_perdida, costo, l.valor_perdida
            );
            if let Some(motivo) = &l.motivo_perdida {
                part.push_str(&format!(" [{}]", motivo));
            }
            part
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

/// Result of evaluating a return without committing it
#[derive(Debug, Clone, Serialize)]
pub struct ReturnPreview {
    pub lines: Vec<AssignmentLine>,
    pub estado_resultante: ControlState,
    pub valor_descuadre: Decimal,
    pub tiene_descuadre: bool,
    pub motivo_descuadre: Option<String>,
}

/// Evaluate a return against a control: same validation and pricing as the
/// real operation, no balances involved
pub fn preview_return(
    control: &MaterialControl,
    request: &ReturnRequest,
    catalog: &MaterialCatalog,
) -> DomainResult<ReturnPreview> {
    let plan = plan_return(
        &crate::stock::StockSnapshot::default(),
        catalog,
        control,
        request,
        control.technician_id,
        Utc::now(),
    )?;
    let next = plan
        .control
        .map(|w| w.control)
        .unwrap_or_else(|| control.clone());

    Ok(ReturnPreview {
        valor_descuadre: next.valor_descuadre(),
        tiene_descuadre: next.tiene_descuadre(),
        motivo_descuadre: discrepancy_summary(&next, catalog),
        estado_resultante: next.estado_general,
        lines: next.lines,
    })
}

/// Analyst explains a discrepancy; the recorded loss value is kept
pub fn plan_resolve(
    control: &MaterialControl,
    analista_id: Uuid,
    observaciones: String,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    control.require_state(
        &[ControlState::DevolucionCompletada],
        "resolve the discrepancy of",
    )?;
    if !control.tiene_descuadre() {
        return Err(DomainError::StateTransition {
            from: control.estado_general,
            operation: "resolve a discrepancy on (none recorded)",
        });
    }
    if control.descuadre_resuelto {
        return Err(DomainError::StateTransition {
            from: control.estado_general,
            operation: "resolve again",
        });
    }

    let mut write = next_version(control);
    write.control.descuadre_resuelto = true;
    write.control.analista_id = Some(analista_id);
    write.control.fecha_resolucion_descuadre = Some(now);
    write.control.observaciones_analista = Some(observaciones);

    Ok(Plan {
        control: Some(write),
        ..Plan::default()
    })
}

/// Final review; afterwards the control is read-only
pub fn plan_close(
    control: &MaterialControl,
    analista_id: Uuid,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    control.require_state(&[ControlState::DevolucionCompletada], "close")?;
    if !control.can_close() {
        return Err(DomainError::StateTransition {
            from: control.estado_general,
            operation: "close (unresolved discrepancy)",
        });
    }

    let mut write = next_version(control);
    write.control.transition(ControlState::Cerrado, "close", now)?;
    write.control.fecha_cierre = Some(now);
    write.control.analista_id.get_or_insert(analista_id);

    Ok(Plan {
        control: Some(write),
        ..Plan::default()
    })
}

// ============================================================================
// Manual ledger operations
// ============================================================================

/// Load stock into a technician's van outside any control
pub fn plan_receive<V: StockView>(
    view: &V,
    catalog: &MaterialCatalog,
    request: ReceiveRequest,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    catalog.require(request.material_id)?;

    let mut builder = PlanBuilder::new(view);
    builder.record(
        MovementEntry::new(
            request.technician_id,
            request.material_id,
            MovementType::Entrada,
            request.cantidad,
            request.motivo,
            request.responsable_id,
            MovementOrigin::for_order(request.order_id),
            now,
        )
        .with_visibility(request.visible_para_analistas),
    )?;

    Ok(builder.finish(None, Vec::new()))
}

/// Signed correction. When it references a control, that control must exist
/// and belong to the same technician; the control itself is never edited.
pub fn plan_adjustment<V: StockView>(
    view: &V,
    catalog: &MaterialCatalog,
    request: AdjustmentRequest,
    referenced: Option<&MaterialControl>,
    now: DateTime<Utc>,
) -> DomainResult<Plan> {
    catalog.require(request.material_id)?;
    validate_reason(&request.motivo)
        .map_err(|msg| DomainError::InvalidQuantity(msg.to_string()))?;

    let mut entry = MovementEntry::new(
        request.technician_id,
        request.material_id,
        MovementType::Ajuste,
        request.cantidad,
        request.motivo,
        request.responsable_id,
        MovementOrigin::manual(),
        now,
    )
    .with_direction(request.direccion);

    if let Some(control_id) = request.control_id {
        let control = referenced
            .filter(|c| c.id == control_id)
            .ok_or(DomainError::NotFound {
                resource: "Material control",
                id: control_id,
            })?;
        if control.technician_id != request.technician_id {
            return Err(DomainError::NotFound {
                resource: "Material control for technician",
                id: control_id,
            });
        }
        entry = entry.for_control(control_id);
    }

    let mut builder = PlanBuilder::new(view);
    builder.record(entry)?;
    Ok(builder.finish(None, Vec::new()))
}

/// Replenish the shared warehouse pool
pub fn plan_restock_central(
    catalog: &MaterialCatalog,
    material_id: Uuid,
    cantidad: Decimal,
) -> DomainResult<Plan> {
    catalog.require(material_id)?;
    validate_positive_quantity(cantidad)
        .map_err(|msg| DomainError::InvalidQuantity(msg.to_string()))?;

    Ok(Plan {
        pool: vec![PoolWrite {
            material_id,
            delta: cantidad,
        }],
        ..Plan::default()
    })
}
