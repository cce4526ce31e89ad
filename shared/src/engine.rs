//! In-process material engine
//!
//! Holds the ledger, the stock arena, the controls and the alert outbox
//! behind one lock. Operations plan under a read lock and commit under a
//! write lock; the commit re-checks every version the plan was built on, so
//! two writers racing on the same balance or control cannot both land.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::ledger::{validate_entry, LedgerFilter, MovementLedger};
use crate::models::{
    AlertEvent, ControlFilter, ControlState, MaterialCatalog, MaterialControl, MovementEntry,
    StockPolicy, TechnicianStockLine,
};
use crate::reconciliation::{
    self, AdjustmentRequest, AssignmentRequest, Plan, ReceiveRequest, ReturnRequest,
};
use crate::stock::{StockArena, StockView};

/// Deployment knobs
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub policy: StockPolicy,
    pub low_stock_threshold: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: StockPolicy::TechnicianStock,
            low_stock_threshold: Decimal::from(5),
        }
    }
}

/// What a committed plan produced
#[derive(Debug, Clone)]
pub struct Committed {
    pub entries: Vec<MovementEntry>,
    pub control: Option<MaterialControl>,
    pub alerts: Vec<AlertEvent>,
}

#[derive(Debug, Default)]
struct EngineState {
    ledger: MovementLedger,
    arena: StockArena,
    controls: HashMap<Uuid, MaterialControl>,
    alerts: Vec<AlertEvent>,
}

pub struct MaterialEngine {
    catalog: MaterialCatalog,
    config: EngineConfig,
    state: RwLock<EngineState>,
}

impl MaterialEngine {
    pub fn new(catalog: MaterialCatalog, config: EngineConfig) -> Self {
        Self {
            catalog,
            config,
            state: RwLock::new(EngineState::default()),
        }
    }

    pub fn catalog(&self) -> &MaterialCatalog {
        &self.catalog
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    // A panic inside a commit happens before any field is touched, so the
    // state behind a poisoned lock is still consistent.
    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_control(state: &EngineState, control_id: Uuid) -> DomainResult<MaterialControl> {
        state
            .controls
            .get(&control_id)
            .cloned()
            .ok_or(DomainError::NotFound {
                resource: "Material control",
                id: control_id,
            })
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Apply a plan atomically: every version check passes and everything is
    /// written, or nothing is
    pub fn commit(&self, plan: Plan) -> DomainResult<Committed> {
        let now = Utc::now();
        let alert_kinds = plan.alert_events(self.config.low_stock_threshold);
        let mut state = self.write_state();

        if let Some(write) = &plan.control {
            let stored = state.controls.get(&write.control.id).map(|c| c.version);
            if stored != write.expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    resource: format!("control {}", write.control.id),
                });
            }
        }
        for entry in &plan.entries {
            validate_entry(entry)?;
        }

        state.arena.compare_and_swap(&plan.balances, &plan.pool)?;

        let mut entries = Vec::with_capacity(plan.entries.len());
        for entry in plan.entries {
            entries.push(state.ledger.append(entry)?.clone());
        }

        let control = plan.control.map(|write| {
            let mut control = write.control;
            control.version = write.expected_version.map_or(0, |v| v + 1);
            state.controls.insert(control.id, control.clone());
            control
        });

        let mut alerts = Vec::with_capacity(alert_kinds.len());
        for evento in alert_kinds {
            let secuencia = state.alerts.last().map_or(1, |a| a.secuencia + 1);
            let event = AlertEvent {
                secuencia,
                evento,
                fecha: now,
            };
            state.alerts.push(event.clone());
            alerts.push(event);
        }

        Ok(Committed {
            entries,
            control,
            alerts,
        })
    }

    fn committed_control(committed: Committed) -> DomainResult<MaterialControl> {
        committed.control.ok_or(DomainError::InvalidQuantity(
            "operation committed without a control".to_string(),
        ))
    }

    fn committed_entry(committed: Committed) -> DomainResult<MovementEntry> {
        committed.entries.into_iter().next().ok_or(DomainError::InvalidQuantity(
            "operation committed without a ledger entry".to_string(),
        ))
    }

    // ========================================================================
    // Material control lifecycle
    // ========================================================================

    pub fn assign(&self, request: AssignmentRequest) -> DomainResult<MaterialControl> {
        self.assign_at(request, Utc::now())
    }

    pub fn assign_at(
        &self,
        request: AssignmentRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<MaterialControl> {
        let plan = {
            let state = self.read_state();
            reconciliation::plan_assignment(
                &state.arena,
                &self.catalog,
                self.config.policy,
                request,
                now,
            )?
        };
        Self::committed_control(self.commit(plan)?)
    }

    pub fn start_work(&self, control_id: Uuid, actor_id: Uuid) -> DomainResult<MaterialControl> {
        let plan = {
            let state = self.read_state();
            let control = Self::load_control(&state, control_id)?;
            reconciliation::plan_start_work(&state.arena, &control, actor_id, Utc::now())?
        };
        Self::committed_control(self.commit(plan)?)
    }

    pub fn complete_work(
        &self,
        control_id: Uuid,
        observaciones: Option<String>,
    ) -> DomainResult<MaterialControl> {
        let plan = {
            let state = self.read_state();
            let control = Self::load_control(&state, control_id)?;
            reconciliation::plan_complete_work(&control, observaciones, Utc::now())?
        };
        Self::committed_control(self.commit(plan)?)
    }

    pub fn record_return(
        &self,
        control_id: Uuid,
        request: &ReturnRequest,
        actor_id: Uuid,
    ) -> DomainResult<MaterialControl> {
        let plan = {
            let state = self.read_state();
            let control = Self::load_control(&state, control_id)?;
            reconciliation::plan_return(
                &state.arena,
                &self.catalog,
                &control,
                request,
                actor_id,
                Utc::now(),
            )?
        };
        Self::committed_control(self.commit(plan)?)
    }

    pub fn resolve_discrepancy(
        &self,
        control_id: Uuid,
        analista_id: Uuid,
        observaciones: String,
    ) -> DomainResult<MaterialControl> {
        let plan = {
            let state = self.read_state();
            let control = Self::load_control(&state, control_id)?;
            reconciliation::plan_resolve(&control, analista_id, observaciones, Utc::now())?
        };
        Self::committed_control(self.commit(plan)?)
    }

    pub fn close(&self, control_id: Uuid, analista_id: Uuid) -> DomainResult<MaterialControl> {
        let plan = {
            let state = self.read_state();
            let control = Self::load_control(&state, control_id)?;
            reconciliation::plan_close(&control, analista_id, Utc::now())?
        };
        Self::committed_control(self.commit(plan)?)
    }

    // ========================================================================
    // Manual ledger operations
    // ========================================================================

    pub fn receive(&self, request: ReceiveRequest) -> DomainResult<MovementEntry> {
        let plan = {
            let state = self.read_state();
            reconciliation::plan_receive(&state.arena, &self.catalog, request, Utc::now())?
        };
        Self::committed_entry(self.commit(plan)?)
    }

    pub fn adjust(&self, request: AdjustmentRequest) -> DomainResult<MovementEntry> {
        let plan = {
            let state = self.read_state();
            let referenced = request
                .control_id
                .and_then(|id| state.controls.get(&id));
            reconciliation::plan_adjustment(
                &state.arena,
                &self.catalog,
                request,
                referenced,
                Utc::now(),
            )?
        };
        Self::committed_entry(self.commit(plan)?)
    }

    /// Pool changes carry no version, so this never conflicts
    pub fn restock_central(&self, material_id: Uuid, cantidad: Decimal) -> DomainResult<Decimal> {
        let plan = reconciliation::plan_restock_central(&self.catalog, material_id, cantidad)?;
        self.commit(plan)?;
        Ok(self.read_state().arena.central_available(material_id))
    }

    /// Refold the whole ledger into the arena; returns the number of lines
    pub fn rebuild_balances(&self) -> DomainResult<usize> {
        let mut state = self.write_state();
        let lines = StockArena::rebuild(&state.ledger)?;
        let count = lines.len();
        state.arena.reset_balances(lines);
        Ok(count)
    }

    /// Whether the stored balances equal a fresh fold of the ledger
    pub fn ledger_is_consistent(&self) -> bool {
        let state = self.read_state();
        state.arena.matches_ledger(&state.ledger)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn balance(&self, technician_id: Uuid, material_id: Uuid) -> TechnicianStockLine {
        self.read_state().arena.balance(technician_id, material_id)
    }

    pub fn balances_for(&self, technician_id: Uuid) -> Vec<TechnicianStockLine> {
        self.read_state().arena.balances_for(technician_id)
    }

    pub fn central_available(&self, material_id: Uuid) -> Decimal {
        self.read_state().arena.central_available(material_id)
    }

    pub fn ledger_for_technician(
        &self,
        technician_id: Uuid,
        filter: &LedgerFilter,
    ) -> Vec<MovementEntry> {
        self.read_state()
            .ledger
            .query_by_technician(technician_id, filter)
            .cloned()
            .collect()
    }

    pub fn ledger_for_material(&self, material_id: Uuid) -> Vec<MovementEntry> {
        self.read_state()
            .ledger
            .query_by_material(material_id)
            .cloned()
            .collect()
    }

    pub fn ledger_for_control(&self, control_id: Uuid) -> Vec<MovementEntry> {
        self.read_state()
            .ledger
            .query_by_control(control_id)
            .cloned()
            .collect()
    }

    pub fn ledger_len(&self) -> usize {
        self.read_state().ledger.len()
    }

    pub fn control(&self, control_id: Uuid) -> DomainResult<MaterialControl> {
        Self::load_control(&self.read_state(), control_id)
    }

    /// Controls matching `filter`, oldest assignment first
    pub fn controls(&self, filter: &ControlFilter) -> Vec<MaterialControl> {
        let mut controls: Vec<_> = self
            .read_state()
            .controls
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        controls.sort_by_key(|c| (c.fecha_asignacion, c.id));
        controls
    }

    pub fn open_controls_for(&self, technician_id: Uuid) -> Vec<MaterialControl> {
        self.controls(&ControlFilter {
            technician_id: Some(technician_id),
            solo_abiertos: true,
            ..ControlFilter::default()
        })
    }

    /// "My assignments", optionally in one state
    pub fn controls_for(
        &self,
        technician_id: Uuid,
        estado: Option<ControlState>,
    ) -> Vec<MaterialControl> {
        self.controls(&ControlFilter {
            technician_id: Some(technician_id),
            estado,
            ..ControlFilter::default()
        })
    }

    /// Analyst review queue
    pub fn controls_by_discrepancy(
        &self,
        tiene_descuadre: Option<bool>,
        descuadre_resuelto: Option<bool>,
    ) -> Vec<MaterialControl> {
        self.controls(&ControlFilter {
            tiene_descuadre,
            descuadre_resuelto,
            ..ControlFilter::default()
        })
    }

    /// Outbox events with a sequence number greater than `after`
    pub fn alerts_after(&self, after: i64) -> Vec<AlertEvent> {
        let state = self.read_state();
        let start = state.alerts.partition_point(|a| a.secuencia <= after);
        state.alerts[start..].to_vec()
    }
}
