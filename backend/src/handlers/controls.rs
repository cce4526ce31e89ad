//! HTTP handlers for material control endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{ControlResponse, ReturnPreview, ReturnRequest};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{CurrentUser, Role};
use crate::models::MovementEntry;
use crate::services::controls::{
    AssignMaterialsInput, CompleteWorkInput, ControlQuery, ResolveDiscrepancyInput,
};
use crate::services::{ControlService, LedgerService};
use crate::AppState;

const STAFF: &[Role] = &[Role::Bodeguero, Role::Analista];

fn control_service(state: &AppState) -> ControlService {
    ControlService::new(state.db.clone(), state.config.stock.engine_config())
}

/// Assign materials to a technician
pub async fn assign_materials(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<AssignMaterialsInput>,
) -> AppResult<(StatusCode, Json<ControlResponse>)> {
    current_user.0.require_role(&[Role::Bodeguero])?;
    let control = control_service(&state)
        .assign(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(control)))
}

/// Get a control with its computed discrepancy
pub async fn get_control(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
) -> AppResult<Json<ControlResponse>> {
    let control = control_service(&state).get(control_id).await?;
    current_user
        .0
        .require_self_or_role(control.control.technician_id, STAFF)?;
    Ok(Json(control))
}

/// Ledger entries written for a control
pub async fn get_control_ledger(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
) -> AppResult<Json<Vec<MovementEntry>>> {
    let control = control_service(&state).get(control_id).await?;
    current_user
        .0
        .require_self_or_role(control.control.technician_id, STAFF)?;
    let entries = LedgerService::new(state.db, state.config.stock.engine_config())
        .for_control(control_id)
        .await?;
    Ok(Json(entries))
}

/// Open controls of one technician
pub async fn list_open_for_technician(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(technician_id): Path<Uuid>,
) -> AppResult<Json<Vec<ControlResponse>>> {
    current_user.0.require_self_or_role(technician_id, STAFF)?;
    let controls = control_service(&state).open_for(technician_id).await?;
    Ok(Json(controls))
}

/// The caller's own assignments
pub async fn my_controls(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ControlQuery>,
) -> AppResult<Json<Vec<ControlResponse>>> {
    let controls = control_service(&state)
        .for_technician(current_user.0.user_id, query.estado)
        .await?;
    Ok(Json(controls))
}

/// Analyst review list
pub async fn list_controls(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ControlQuery>,
) -> AppResult<Json<Vec<ControlResponse>>> {
    current_user.0.require_role(STAFF)?;
    let controls = control_service(&state).list(query).await?;
    Ok(Json(controls))
}

pub async fn start_work(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
) -> AppResult<Json<ControlResponse>> {
    let control = control_service(&state)
        .start_work(&current_user.0, control_id)
        .await?;
    Ok(Json(control))
}

pub async fn complete_work(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
    input: Option<Json<CompleteWorkInput>>,
) -> AppResult<Json<ControlResponse>> {
    let input = input.map(|Json(i)| i).unwrap_or_default();
    let control = control_service(&state)
        .complete_work(&current_user.0, control_id, input)
        .await?;
    Ok(Json(control))
}

/// Report used/returned/lost quantities for some or all lines
pub async fn record_return(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
    Json(input): Json<ReturnRequest>,
) -> AppResult<Json<ControlResponse>> {
    let control = control_service(&state)
        .record_return(&current_user.0, control_id, input)
        .await?;
    Ok(Json(control))
}

/// Dry run of a return: line states and discrepancy, nothing written
pub async fn preview_return(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
    Json(input): Json<ReturnRequest>,
) -> AppResult<Json<ReturnPreview>> {
    let preview = control_service(&state)
        .preview_return(&current_user.0, control_id, input)
        .await?;
    Ok(Json(preview))
}

pub async fn resolve_discrepancy(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
    Json(input): Json<ResolveDiscrepancyInput>,
) -> AppResult<Json<ControlResponse>> {
    current_user.0.require_role(&[Role::Analista])?;
    let control = control_service(&state)
        .resolve_discrepancy(current_user.0.user_id, control_id, input)
        .await?;
    Ok(Json(control))
}

pub async fn close_control(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(control_id): Path<Uuid>,
) -> AppResult<Json<ControlResponse>> {
    current_user.0.require_role(&[Role::Analista])?;
    let control = control_service(&state)
        .close(current_user.0.user_id, control_id)
        .await?;
    Ok(Json(control))
}
