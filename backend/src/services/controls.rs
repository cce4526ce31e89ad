//! Material control service: assignment, work lifecycle, returns, review
//!
//! Each write loads the records it depends on, runs the shared planner and
//! commits the resulting plan through [`PgStore`].

use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    plan_assignment, plan_close, plan_complete_work, plan_resolve, plan_return, plan_start_work,
    preview_return, AssignmentLineInput, AssignmentRequest, ControlResponse, ControlState,
    EngineConfig, Plan, ReturnPreview, ReturnRequest,
};

use crate::error::AppResult;
use crate::middleware::AuthUser;
use crate::models::MaterialControl;
use crate::services::store::PgStore;

/// Input for assigning materials to a technician
#[derive(Debug, Deserialize, Validate)]
pub struct AssignMaterialsInput {
    pub technician_id: Uuid,
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, message = "At least one material line is required"))]
    pub lines: Vec<AssignmentLineInput>,
    #[validate(length(max = 2000))]
    pub observaciones: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CompleteWorkInput {
    #[validate(length(max = 2000))]
    pub observaciones: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveDiscrepancyInput {
    #[validate(length(min = 1, max = 2000, message = "An explanation is required"))]
    pub observaciones: String,
}

/// Filters for the analyst review list
#[derive(Debug, Default, Deserialize)]
pub struct ControlQuery {
    pub estado: Option<ControlState>,
    pub tiene_descuadre: Option<bool>,
    pub descuadre_resuelto: Option<bool>,
}

#[derive(Clone)]
pub struct ControlService {
    store: PgStore,
    config: EngineConfig,
}

impl ControlService {
    pub fn new(db: PgPool, config: EngineConfig) -> Self {
        Self {
            store: PgStore::new(db),
            config,
        }
    }

    async fn commit_control(&self, plan: Plan) -> AppResult<MaterialControl> {
        let outcome = self
            .store
            .commit(plan, self.config.low_stock_threshold)
            .await?;
        for alert in &outcome.alerts {
            tracing::info!(secuencia = alert.secuencia, tipo = alert.evento.as_str(), "Alert queued");
        }
        outcome.into_control()
    }

    /// Reserve materials and open a control
    pub async fn assign(
        &self,
        bodeguero_id: Uuid,
        input: AssignMaterialsInput,
    ) -> AppResult<ControlResponse> {
        input.validate()?;

        let material_ids: Vec<Uuid> = input.lines.iter().map(|l| l.material_id).collect();
        let catalog = self.store.load_catalog(&material_ids).await?;
        let snapshot = self
            .store
            .load_snapshot(input.technician_id, &material_ids)
            .await?;

        let request = AssignmentRequest {
            technician_id: input.technician_id,
            bodeguero_id,
            order_id: input.order_id,
            lines: input.lines,
            observaciones: input.observaciones,
        };
        let plan = plan_assignment(&snapshot, &catalog, self.config.policy, request, Utc::now())?;
        let control = self.commit_control(plan).await?;

        tracing::info!(
            control_id = %control.id,
            technician_id = %control.technician_id,
            lines = control.lines.len(),
            "Materials assigned"
        );
        Ok(control.into())
    }

    pub async fn start_work(&self, actor: &AuthUser, control_id: Uuid) -> AppResult<ControlResponse> {
        let control = self.store.load_control(control_id).await?;
        actor.require_technician(control.technician_id)?;

        let material_ids: Vec<Uuid> = control.lines.iter().map(|l| l.material_id).collect();
        let snapshot = self
            .store
            .load_snapshot(control.technician_id, &material_ids)
            .await?;
        let plan = plan_start_work(&snapshot, &control, actor.user_id, Utc::now())?;
        let control = self.commit_control(plan).await?;

        tracing::info!(control_id = %control.id, "Work started");
        Ok(control.into())
    }

    pub async fn complete_work(
        &self,
        actor: &AuthUser,
        control_id: Uuid,
        input: CompleteWorkInput,
    ) -> AppResult<ControlResponse> {
        input.validate()?;
        let control = self.store.load_control(control_id).await?;
        actor.require_technician(control.technician_id)?;

        let plan = plan_complete_work(&control, input.observaciones, Utc::now())?;
        let control = self.commit_control(plan).await?;

        tracing::info!(control_id = %control.id, "Work completed");
        Ok(control.into())
    }

    /// Reconcile reported lines; completes the return once every line is in
    pub async fn record_return(
        &self,
        actor: &AuthUser,
        control_id: Uuid,
        input: ReturnRequest,
    ) -> AppResult<ControlResponse> {
        let control = self.store.load_control(control_id).await?;
        actor.require_technician(control.technician_id)?;

        let material_ids: Vec<Uuid> = control.lines.iter().map(|l| l.material_id).collect();
        let catalog = self.store.load_catalog(&material_ids).await?;
        let snapshot = self
            .store
            .load_snapshot(control.technician_id, &material_ids)
            .await?;
        let plan = plan_return(
            &snapshot,
            &catalog,
            &control,
            &input,
            actor.user_id,
            Utc::now(),
        )?;
        let control = self.commit_control(plan).await?;

        if control.tiene_descuadre() {
            tracing::warn!(
                control_id = %control.id,
                valor_descuadre = %control.valor_descuadre(),
                "Return completed with discrepancy"
            );
        } else {
            tracing::info!(control_id = %control.id, estado = %control.estado_general, "Return recorded");
        }
        Ok(control.into())
    }

    /// Evaluate a return without writing anything
    pub async fn preview_return(
        &self,
        actor: &AuthUser,
        control_id: Uuid,
        input: ReturnRequest,
    ) -> AppResult<ReturnPreview> {
        let control = self.store.load_control(control_id).await?;
        actor.require_technician(control.technician_id)?;

        let material_ids: Vec<Uuid> = control.lines.iter().map(|l| l.material_id).collect();
        let catalog = self.store.load_catalog(&material_ids).await?;
        Ok(preview_return(&control, &input, &catalog)?)
    }

    pub async fn resolve_discrepancy(
        &self,
        analista_id: Uuid,
        control_id: Uuid,
        input: ResolveDiscrepancyInput,
    ) -> AppResult<ControlResponse> {
        input.validate()?;
        let control = self.store.load_control(control_id).await?;

        let plan = plan_resolve(&control, analista_id, input.observaciones, Utc::now())?;
        let control = self.commit_control(plan).await?;

        tracing::info!(control_id = %control.id, analista_id = %analista_id, "Discrepancy resolved");
        Ok(control.into())
    }

    pub async fn close(&self, analista_id: Uuid, control_id: Uuid) -> AppResult<ControlResponse> {
        let control = self.store.load_control(control_id).await?;

        let plan = plan_close(&control, analista_id, Utc::now())?;
        let control = self.commit_control(plan).await?;

        tracing::info!(control_id = %control.id, "Control closed");
        Ok(control.into())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, control_id: Uuid) -> AppResult<ControlResponse> {
        Ok(self.store.load_control(control_id).await?.into())
    }

    pub async fn open_for(&self, technician_id: Uuid) -> AppResult<Vec<ControlResponse>> {
        let controls = self
            .store
            .query_controls(Some(technician_id), None, None, None, true)
            .await?;
        Ok(controls.into_iter().map(Into::into).collect())
    }

    /// A technician's assignments, optionally in one state
    pub async fn for_technician(
        &self,
        technician_id: Uuid,
        estado: Option<ControlState>,
    ) -> AppResult<Vec<ControlResponse>> {
        let controls = self
            .store
            .query_controls(
                Some(technician_id),
                estado.map(|e| e.as_str()),
                None,
                None,
                false,
            )
            .await?;
        Ok(controls.into_iter().map(Into::into).collect())
    }

    /// Analyst review queue
    pub async fn list(&self, query: ControlQuery) -> AppResult<Vec<ControlResponse>> {
        let controls = self
            .store
            .query_controls(
                None,
                query.estado.map(|e| e.as_str()),
                query.tiene_descuadre,
                query.descuadre_resuelto,
                false,
            )
            .await?;
        Ok(controls.into_iter().map(Into::into).collect())
    }
}
